//! Locale resolution middleware.
//!
//! Resolution order: i18n cookie (when it names a configured locale), then
//! the default locale. The result is stored in request extensions.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::Response;
use tower_sessions::cookie::Cookie;

use crate::config::I18nSettings;

/// The resolved locale for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocale(pub String);

#[derive(Debug, Clone)]
pub struct LocaleResolver {
    cookie: String,
    locales: Vec<String>,
    default_locale: String,
}

impl LocaleResolver {
    pub fn new(settings: &I18nSettings) -> Self {
        Self {
            cookie: settings.cookie.clone(),
            locales: settings.locales.clone(),
            default_locale: settings.default_locale.clone(),
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> String {
        self.from_cookie(headers)
            .unwrap_or_else(|| self.default_locale.clone())
    }

    fn from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.cookie)
            .map(|cookie| cookie.value().to_string())
            .filter(|locale| self.locales.iter().any(|l| l == locale))
    }
}

/// Attach [`ResolvedLocale`] to the request.
pub async fn resolve_locale(
    State(resolver): State<Arc<LocaleResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let locale = resolver.resolve(request.headers());
    request.extensions_mut().insert(ResolvedLocale(locale));
    next.run(request).await
}
