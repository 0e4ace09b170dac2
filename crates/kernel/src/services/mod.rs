//! Default implementations of the shared services.
//!
//! The bootstrapper uses these unless the site supplies its own.

pub mod cms;
pub mod locale;
pub mod mail;
pub mod pages;
pub mod schemas;
pub mod storage;

pub use cms::BasicCore;
pub use locale::LocaleService;
pub use mail::MailService;
pub use pages::BasicPages;
pub use schemas::BasicSchemas;
pub use storage::LocalFileStorage;
