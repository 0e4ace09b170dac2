//! Shared services injected into every module.
//!
//! The kernel ships default implementations of each trait; sites may swap
//! any of them. Services are initialized once, in a fixed order, before the
//! first module is constructed.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::response::Response;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::asset::AssetDeclaration;
use crate::factory::TemplateSource;
use crate::page::{NotFoundHandler, Page, PageLoad, PageRequest};

/// File storage backend.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Bring the backend up (create directories, check credentials).
    async fn init(&self) -> anyhow::Result<()>;

    /// Write data to storage at the given URI.
    async fn write(&self, uri: &str, data: &[u8]) -> anyhow::Result<()>;

    /// Read data from storage at the given URI.
    async fn read(&self, uri: &str) -> anyhow::Result<Vec<u8>>;

    /// Delete a file from storage.
    async fn delete(&self, uri: &str) -> anyhow::Result<()>;

    /// Check if a file exists.
    async fn exists(&self, uri: &str) -> anyhow::Result<bool>;

    /// Get the public URL for a file.
    fn public_url(&self, uri: &str) -> String;

    /// Get the storage scheme (e.g., "local").
    fn scheme(&self) -> &'static str;
}

/// An outgoing plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()>;

    /// Mailer settings beyond the transport itself (e.g. `from`).
    fn extra(&self) -> &Map<String, Value>;
}

/// Interface string translation.
pub trait Localizer: Send + Sync {
    /// Translate `source` into `locale`, falling back to `source`.
    fn translate(&self, source: &str, locale: &str) -> String;

    fn default_locale(&self) -> &str;

    fn locales(&self) -> &[String];
}

/// Everything the CMS core receives when it is brought up.
#[derive(Clone)]
pub struct CoreInit {
    pub root_dir: PathBuf,
    pub prefix: String,
    pub base_url: Option<String>,
    pub absolute_urls: bool,
    pub generation: Option<String>,
    pub locals: Map<String, Value>,
    /// Extra template directories for shared layouts.
    pub partial_paths: Vec<PathBuf>,
    pub minify: bool,
    /// Pass-through `[core]` settings.
    pub options: Map<String, Value>,
    pub storage: Arc<dyn FileStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub locale: Arc<dyn Localizer>,
    pub app: AppHandle,
    pub db: Option<PgPool>,
}

/// The CMS core service.
#[async_trait]
pub trait CoreService: Send + Sync {
    async fn init(&self, init: CoreInit) -> anyhow::Result<()>;

    /// Template locals visible to every page.
    fn locals(&self) -> Map<String, Value>;

    /// Register a stylesheet or script for the site bundle.
    fn push_asset(&self, asset: AssetDeclaration);

    /// Finalize the asset bundle, returning the files written.
    async fn end_assets(&self) -> anyhow::Result<Vec<PathBuf>>;
}

/// Inputs to the schema subsystem.
#[derive(Clone)]
pub struct SchemaInit {
    pub core: Arc<dyn CoreService>,
    pub app: AppHandle,
    pub template_sources: Vec<TemplateSource>,
    pub options: Map<String, Value>,
}

/// The schema / field-definition service.
#[async_trait]
pub trait SchemaService: Send + Sync {
    async fn init(&self, init: SchemaInit) -> anyhow::Result<()>;

    /// Link the page subsystem so page-reference fields can resolve pages.
    fn set_pages(&self, pages: Arc<dyn PageService>);

    /// Whether a field type is known.
    fn has_field_type(&self, name: &str) -> bool;
}

/// Inputs to the page subsystem.
#[derive(Clone)]
pub struct PagesInit {
    pub core: Arc<dyn CoreService>,
    pub schemas: Arc<dyn SchemaService>,
    pub app: AppHandle,
    /// Directory holding one template per page type.
    pub template_path: PathBuf,
    /// Shared layout directories, searched after `template_path`.
    pub partial_paths: Vec<PathBuf>,
    /// Override directories, searched last so they win.
    pub template_sources: Vec<TemplateSource>,
    /// Page records file, if the site keeps one.
    pub store: Option<PathBuf>,
    pub options: Map<String, Value>,
}

/// How the page wildcard handler is assembled.
#[derive(Clone)]
pub struct ServeOptions {
    /// Ordered page-load hooks.
    pub loaders: Vec<PageLoad>,
    /// Combined not-found pipeline.
    pub not_found: Arc<dyn NotFoundHandler>,
    /// Remember the last page seen so login can return to it.
    pub update_after_login: bool,
    /// Site prefix, prepended to site-relative redirect targets.
    pub prefix: String,
    pub options: Map<String, Value>,
}

/// The page-serving service.
#[async_trait]
pub trait PageService: Send + Sync {
    async fn init(&self, init: PagesInit) -> anyhow::Result<()>;

    async fn find(&self, slug: &str) -> anyhow::Result<Option<Page>>;

    /// Add or replace a page record.
    fn insert(&self, page: Page);

    /// Resolve and render one page request.
    async fn serve(&self, request: PageRequest, options: &ServeOptions)
    -> anyhow::Result<Response>;
}

/// Handle to the HTTP application, used to register routes during bootstrap.
///
/// Routes registered here always take precedence over the page wildcard.
#[derive(Clone, Default)]
pub struct AppHandle {
    routes: Arc<Mutex<Router>>,
}

impl AppHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `router` into the application's routes.
    pub fn add_routes(&self, router: Router) {
        let mut routes = self.routes.lock();
        let current = std::mem::take(&mut *routes);
        *routes = current.merge(router);
    }

    /// Take every route registered so far, leaving the handle empty.
    pub fn take_routes(&self) -> Router {
        std::mem::take(&mut *self.routes.lock())
    }
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle").finish_non_exhaustive()
    }
}

/// Shared dependencies every module factory receives.
#[derive(Clone)]
pub struct Services {
    pub core: Arc<dyn CoreService>,
    pub pages: Arc<dyn PageService>,
    pub schemas: Arc<dyn SchemaService>,
    pub mailer: Arc<dyn Mailer>,
    pub storage: Arc<dyn FileStorage>,
    pub locale: Arc<dyn Localizer>,
    pub app: AppHandle,
    pub db: Option<PgPool>,
}

/// Per-module replacements for shared dependencies.
///
/// Anything set here wins over the site-wide [`Services`].
#[derive(Clone, Default)]
pub struct ServiceOverrides {
    pub core: Option<Arc<dyn CoreService>>,
    pub pages: Option<Arc<dyn PageService>>,
    pub schemas: Option<Arc<dyn SchemaService>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub storage: Option<Arc<dyn FileStorage>>,
    pub locale: Option<Arc<dyn Localizer>>,
    pub app: Option<AppHandle>,
    pub db: Option<PgPool>,
}

impl ServiceOverrides {
    /// Fill every unset slot from `defaults`.
    pub fn merged_over(self, defaults: &Services) -> Services {
        Services {
            core: self.core.unwrap_or_else(|| Arc::clone(&defaults.core)),
            pages: self.pages.unwrap_or_else(|| Arc::clone(&defaults.pages)),
            schemas: self.schemas.unwrap_or_else(|| Arc::clone(&defaults.schemas)),
            mailer: self.mailer.unwrap_or_else(|| Arc::clone(&defaults.mailer)),
            storage: self.storage.unwrap_or_else(|| Arc::clone(&defaults.storage)),
            locale: self.locale.unwrap_or_else(|| Arc::clone(&defaults.locale)),
            app: self.app.unwrap_or_else(|| defaults.app.clone()),
            db: self.db.or_else(|| defaults.db.clone()),
        }
    }
}
