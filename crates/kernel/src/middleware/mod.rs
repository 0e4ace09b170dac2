//! HTTP middleware components.
//!
//! Locale resolution, plus adapters that mount module and site
//! [`Middleware`] onto an axum router.

pub mod locale;

pub use locale::{LocaleResolver, ResolvedLocale, resolve_locale};

use axum::Router;
use axum::extract::Request;
use axum::middleware::{Next, from_fn};
use keystone_sdk::Middleware;

/// Wrap `router` so `chain` runs in order, first entry outermost.
pub fn apply_chain<S>(router: Router<S>, chain: &[Middleware]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    chain.iter().rev().fold(router, |router, middleware| {
        let middleware = middleware.clone();
        router.layer(from_fn(move |request: Request, next: Next| {
            let middleware = middleware.clone();
            async move { middleware(request, next).await }
        }))
    })
}
