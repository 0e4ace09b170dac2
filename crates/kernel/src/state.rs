//! Application state shared by the kernel's own handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::SiteConfig;
use crate::db;
use crate::module::ModuleRegistry;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<SiteConfig>,
    modules: Arc<ModuleRegistry>,
    db: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Arc<SiteConfig>, modules: Arc<ModuleRegistry>, db: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                modules,
                db,
            }),
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.inner.modules
    }

    /// Whether a module with this name was constructed.
    pub fn has_module(&self, name: &str) -> bool {
        self.inner.modules.get(name).is_some()
    }

    /// `None` when the site has no database configured.
    pub async fn postgres_healthy(&self) -> Option<bool> {
        match &self.inner.db {
            Some(pool) => Some(db::check_health(pool).await),
            None => None,
        }
    }
}
