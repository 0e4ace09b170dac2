//! Keystone kernel library.
//!
//! Resolves a site's configuration, locates and constructs its modules,
//! and runs the bootstrap sequence that ends in a listening server, a
//! completed task, or a new asset generation. The `keystone` binary is a
//! thin wrapper around [`bootstrap::Bootstrap`].

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod middleware;
pub mod module;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod task;

pub use bootstrap::{Bootstrap, Invocation, Outcome, Phase, Site};
pub use config::{OverrideSource, SiteConfig};
pub use error::{BootstrapError, ConfigError};
