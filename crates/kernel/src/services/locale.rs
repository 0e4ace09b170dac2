//! Locale service for interface string translation.
//!
//! Translations are loaded from `<directory>/<lang>.json` files into an
//! in-memory cache. Each file is a flat object mapping source strings to
//! translations.

use std::path::Path;

use anyhow::{Context, Result};
use dashmap::DashMap;
use keystone_sdk::Localizer;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::I18nSettings;

/// Locale translation service.
pub struct LocaleService {
    locales: Vec<String>,
    default_locale: String,
    /// key = "language\0source" → translation.
    cache: DashMap<String, String>,
}

impl LocaleService {
    pub fn new(settings: &I18nSettings) -> Self {
        Self {
            locales: settings.locales.clone(),
            default_locale: settings.default_locale.clone(),
            cache: DashMap::new(),
        }
    }

    /// Load translations for every configured locale found in `directory`.
    ///
    /// Missing files are skipped; malformed ones are an error.
    pub async fn load_directory(&self, directory: &Path) -> Result<usize> {
        let mut total = 0;
        for language in &self.locales {
            let path = directory.join(format!("{language}.json"));
            if !path.exists() {
                debug!(language = %language, path = %path.display(), "no translation file");
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let strings: Map<String, Value> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            total += self.load_language(language, strings);
        }
        Ok(total)
    }

    /// Load one language's strings into the cache.
    pub fn load_language(&self, language: &str, strings: Map<String, Value>) -> usize {
        let mut count = 0;
        for (source, translation) in strings {
            if let Value::String(translation) = translation {
                self.cache.insert(cache_key(language, &source), translation);
                count += 1;
            }
        }
        info!(language = %language, count = count, "loaded locale translations");
        count
    }

    /// Whether `language` is one of the configured locales.
    pub fn is_supported(&self, language: &str) -> bool {
        self.locales.iter().any(|l| l == language)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Localizer for LocaleService {
    fn translate(&self, source: &str, locale: &str) -> String {
        self.cache
            .get(&cache_key(locale, source))
            .map(|t| t.clone())
            .unwrap_or_else(|| source.to_string())
    }

    fn default_locale(&self) -> &str {
        &self.default_locale
    }

    fn locales(&self) -> &[String] {
        &self.locales
    }
}

/// Uses a null byte separator so sources containing colons cannot collide.
fn cache_key(language: &str, source: &str) -> String {
    format!("{language}\0{source}")
}

impl std::fmt::Debug for LocaleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocaleService")
            .field("locales", &self.locales)
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn settings(locales: &[&str]) -> I18nSettings {
        I18nSettings {
            locales: locales.iter().map(|l| l.to_string()).collect(),
            default_locale: locales[0].to_string(),
            cookie: "site_language".into(),
            directory: PathBuf::from("locales"),
        }
    }

    #[test]
    fn translate_falls_back_to_source() {
        let service = LocaleService::new(&settings(&["en", "fr"]));
        assert_eq!(service.translate("Hello", "fr"), "Hello");
    }

    #[tokio::test]
    async fn files_are_loaded_per_locale() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fr.json"), r#"{"Hello": "Bonjour", "n": 3}"#).unwrap();

        let service = LocaleService::new(&settings(&["en", "fr"]));
        let loaded = service.load_directory(dir.path()).await.unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(service.translate("Hello", "fr"), "Bonjour");
        assert_eq!(service.translate("Hello", "en"), "Hello");
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), "not json").unwrap();
        let service = LocaleService::new(&settings(&["en"]));
        assert!(service.load_directory(dir.path()).await.is_err());
    }

    #[test]
    fn cache_key_no_collision_with_colons() {
        assert_ne!(cache_key("en", "12:00"), cache_key("en:12", "00"));
    }
}
