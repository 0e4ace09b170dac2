//! Page request types and the hooks modules use to take part in page serving.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use futures_core::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page record as known to the page subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Path-like identifier, e.g. `/about` or `global`.
    pub slug: String,
    #[serde(default)]
    pub title: String,
    /// Page type; selects the template used to render it.
    #[serde(rename = "type", default = "default_page_type")]
    pub page_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn default_page_type() -> String {
    "default".to_string()
}

impl Page {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            page_type: default_page_type(),
            data: Map::new(),
        }
    }
}

/// Per-request state threaded through page loaders and not-found handlers.
///
/// A not-found handler claims the request by setting [`redirect`](Self::redirect)
/// or by clearing [`not_found`](Self::not_found).
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Request path relative to the site prefix.
    pub path: String,
    pub query: Option<String>,
    /// Logged-in user, if any.
    pub user: Option<String>,
    pub locale: Option<String>,
    /// The page matched for `path`.
    pub page: Option<Page>,
    /// Data contributed by loaders (virtual pages are stored under their slug).
    pub extras: Map<String, Value>,
    pub not_found: bool,
    pub redirect: Option<String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Whether a handler has already dealt with this request.
    pub fn is_claimed(&self) -> bool {
        self.redirect.is_some() || !self.not_found
    }
}

/// A hook invoked while resolving a page, allowed to enrich the page's data.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, request: &mut PageRequest) -> anyhow::Result<()>;
}

/// A hook given a chance to claim an otherwise unmatched request.
#[async_trait]
pub trait NotFoundHandler: Send + Sync {
    async fn handle(&self, request: &mut PageRequest) -> anyhow::Result<()>;
}

/// One entry in the ordered list of page-load hooks.
#[derive(Clone)]
pub enum PageLoad {
    /// Load the page with this slug and expose it under `extras[slug]`.
    Virtual(String),
    Hook(Arc<dyn PageLoader>),
}

impl std::fmt::Debug for PageLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageLoad::Virtual(slug) => f.debug_tuple("Virtual").field(slug).finish(),
            PageLoad::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

/// Request middleware contributed by a module or the site.
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function into a [`Middleware`].
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request, next| Box::pin(f(request, next)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn request_is_claimed_by_redirect_or_cleared_flag() {
        let mut request = PageRequest::new("/missing");
        request.not_found = true;
        assert!(!request.is_claimed());

        request.redirect = Some("/found".to_string());
        assert!(request.is_claimed());

        request.redirect = None;
        request.not_found = false;
        assert!(request.is_claimed());
    }

    #[test]
    fn page_type_defaults_when_absent() {
        let page: Page = serde_json::from_value(serde_json::json!({ "slug": "/about" })).unwrap();
        assert_eq!(page.page_type, "default");
        assert!(page.title.is_empty());
    }
}
