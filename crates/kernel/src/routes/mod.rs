//! HTTP route handlers and application assembly.

pub mod auth;
pub mod health;
pub mod pages;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use keystone_sdk::{Middleware, PageService, ServeOptions};
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::SiteConfig;
use crate::middleware::{LocaleResolver, apply_chain, resolve_locale};
use crate::module::ModuleRegistry;
use crate::session;
use crate::state::AppState;

/// Everything needed to build the application router.
pub struct RouterParts {
    pub config: Arc<SiteConfig>,
    pub modules: Arc<ModuleRegistry>,
    /// Routes registered through the app handle during bootstrap.
    pub app_routes: Router,
    pub pages: Arc<dyn PageService>,
    pub serve: ServeOptions,
    pub db: Option<PgPool>,
    /// Site middleware, run ahead of module middleware.
    pub middleware: Vec<Middleware>,
    /// Site page middleware, run ahead of module page middleware.
    pub page_middleware: Vec<Middleware>,
}

/// Build the application router.
///
/// Explicit routes win over static files under `<root>/public`, which win
/// over the page wildcard. The whole application is nested under the site
/// prefix when one is set.
pub async fn assemble(parts: RouterParts) -> anyhow::Result<Router> {
    let RouterParts {
        config,
        modules,
        app_routes,
        pages: page_service,
        serve,
        db,
        middleware,
        page_middleware,
    } = parts;

    let state = AppState::new(Arc::clone(&config), Arc::clone(&modules), db);

    let page_chain: Vec<Middleware> = page_middleware
        .into_iter()
        .chain(modules.iter().flat_map(|(_, m)| m.instance.page_middleware()))
        .collect();
    let page_router = apply_chain(pages::router(page_service, serve), &page_chain);
    let fallback = ServeDir::new(config.public_dir()).fallback(page_router);

    let module_chain: Vec<Middleware> = modules
        .iter()
        .flat_map(|(_, m)| m.instance.middleware())
        .collect();
    debug!(
        site = middleware.len(),
        modules = module_chain.len(),
        pages = page_chain.len(),
        "mounting middleware"
    );

    let app = app_routes
        .merge(auth::router().with_state(state.clone()))
        .merge(health::router().with_state(state))
        .fallback_service(fallback);
    let app = apply_chain(app, &module_chain);
    let app = apply_chain(app, &middleware);

    let resolver = Arc::new(LocaleResolver::new(&config.i18n));
    let app = app.layer(from_fn_with_state(resolver, resolve_locale));
    let mut app =
        session::apply_session_layer(app, &config.session, &config.session_secret).await?;

    if config.compress {
        app = app.layer(CompressionLayer::new());
    }

    let app = if config.prefix.is_empty() {
        app
    } else {
        Router::new().nest(&config.prefix, app)
    };

    Ok(app.layer(TraceLayer::new_for_http()))
}
