//! The page wildcard handler.
//!
//! Anything not matched by an explicit route or a static file ends up here
//! and is resolved through the page service.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use keystone_sdk::{PageRequest, PageService, ServeOptions};
use tower_sessions::Session;
use tracing::warn;

use crate::error::AppResult;
use crate::middleware::ResolvedLocale;
use crate::session::{SESSION_AFTER_LOGIN, SESSION_USER};

#[derive(Clone)]
struct PageHandlerState {
    pages: Arc<dyn PageService>,
    options: Arc<ServeOptions>,
}

async fn serve_page(
    State(state): State<PageHandlerState>,
    session: Session,
    request: Request,
) -> AppResult<Response> {
    let uri = request.uri();
    let mut page_request = PageRequest::new(uri.path());
    page_request.query = uri.query().map(str::to_string);
    page_request.locale = request
        .extensions()
        .get::<ResolvedLocale>()
        .map(|locale| locale.0.clone());
    page_request.user = session.get::<String>(SESSION_USER).await.ok().flatten();

    if state.options.update_after_login && page_request.user.is_none() {
        let target = match &page_request.query {
            Some(query) => format!("{}?{query}", page_request.path),
            None => page_request.path.clone(),
        };
        if let Err(e) = session.insert(SESSION_AFTER_LOGIN, target).await {
            warn!(error = %e, "failed to remember page for login");
        }
    }

    Ok(state.pages.serve(page_request, &state.options).await?)
}

/// Router answering every path through `pages`.
pub fn router(pages: Arc<dyn PageService>, options: ServeOptions) -> Router {
    Router::new()
        .fallback(serve_page)
        .with_state(PageHandlerState {
            pages,
            options: Arc::new(options),
        })
}
