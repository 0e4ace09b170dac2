//! Keystone Module SDK
//!
//! Types and traits shared by the Keystone kernel and the modules it
//! composes. A module crate exports a [`Factory`]; the kernel hands that
//! factory a [`ModuleOptions`] carrying the site's shared services and the
//! module's declared options, and registers the [`SiteModule`] it gets back.

pub mod asset;
pub mod factory;
pub mod module;
pub mod page;
pub mod services;

pub use asset::{AssetDeclaration, AssetKind};
pub use factory::{BrowserNaming, Construction, Factory, ModuleOptions, TemplateSource};
pub use module::{Bridge, BridgeReceiver, ModuleHandle, SiteModule};
pub use page::{Middleware, NotFoundHandler, Page, PageLoad, PageLoader, PageRequest, middleware};
pub use services::{
    AppHandle, CoreInit, CoreService, FileStorage, Localizer, MailMessage, Mailer, PageService,
    PagesInit, SchemaInit, SchemaService, ServeOptions, ServiceOverrides, Services,
};

pub mod prelude {
    pub use crate::asset::*;
    pub use crate::factory::*;
    pub use crate::module::*;
    pub use crate::page::*;
    pub use crate::services::*;
}
