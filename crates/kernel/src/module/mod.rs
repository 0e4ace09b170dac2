//! Module resolution, construction and registration.
//!
//! A declared module is first located (package, local folder, or a local
//! folder layered over a package), then constructed through its factory,
//! then registered. Modules are handled one at a time, in declaration order.

mod catalog;
mod declaration;
mod factory;
mod locator;
pub mod naming;
mod registry;

pub use catalog::{LocalIndex, PackageCatalog, PackageLoadError, PackageSource};
pub use declaration::ModuleDeclaration;
pub use factory::{construct, subclass_factory};
pub use locator::{ModuleLocator, ResolutionKind, ResolvedSource};
pub use registry::{ModuleRegistry, RegisteredModule};
