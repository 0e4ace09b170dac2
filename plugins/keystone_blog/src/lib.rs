//! Blog module for Keystone.
//!
//! Serves posts under a base path (`/blog` by default), exposing the blog
//! settings to every page below it, and redirects retired post slugs to
//! their replacements.
//!
//! ```toml
//! [modules.keystone-blog]
//! path = "/news"
//! title = "News"
//!
//! [modules.keystone-blog.redirects]
//! "/news/old-launch" = "/news/launch"
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use keystone_sdk::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const STYLESHEET: &str = "blog";
const PACKAGE_STYLESHEET: &str = include_str!("../public/css/blog.css");

/// Declared options of a blog module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlogSettings {
    pub path: String,
    pub title: String,
    /// Retired slug → current slug.
    pub redirects: IndexMap<String, String>,
}

impl Default for BlogSettings {
    fn default() -> Self {
        Self {
            path: "/blog".to_string(),
            title: "Blog".to_string(),
            redirects: IndexMap::new(),
        }
    }
}

impl BlogSettings {
    fn validate(&self) -> anyhow::Result<()> {
        if !self.path.starts_with('/') {
            anyhow::bail!("`path` must start with '/', got '{}'", self.path);
        }
        if let Some((from, _)) = self.redirects.iter().find(|(_, to)| !to.starts_with('/')) {
            anyhow::bail!("redirect target for '{from}' must be an absolute path");
        }
        Ok(())
    }

    /// Whether `path` is the blog root or a page below it.
    pub fn covers(&self, path: &str) -> bool {
        let base = self.path.trim_end_matches('/');
        base.is_empty()
            || path == base
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// A constructed blog module.
pub struct Blog {
    name: String,
    settings: Arc<BlogSettings>,
    template_sources: Vec<TemplateSource>,
    browser: BrowserNaming,
}

impl Blog {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BlogSettings {
        &self.settings
    }

    /// Override directories layered over the blog's own templates.
    pub fn template_sources(&self) -> &[TemplateSource] {
        &self.template_sources
    }

    pub fn browser(&self) -> &BrowserNaming {
        &self.browser
    }

    /// The blog stylesheet: the most specific override folder holding
    /// `public/css/blog.css`, else the copy compiled into this crate.
    fn stylesheet(&self) -> AssetDeclaration {
        self.template_sources
            .iter()
            .rev()
            .map(|source| {
                AssetDeclaration::new(AssetKind::Stylesheet, STYLESHEET, source.dir.clone())
            })
            .find(|asset| asset.source_path().is_file())
            .unwrap_or_else(|| {
                AssetDeclaration::embedded(AssetKind::Stylesheet, STYLESHEET, PACKAGE_STYLESHEET)
            })
    }
}

impl SiteModule for Blog {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn page_loader(&self) -> Option<Arc<dyn PageLoader>> {
        Some(Arc::clone(&self.settings) as Arc<dyn PageLoader>)
    }

    fn not_found_handler(&self) -> Option<Arc<dyn NotFoundHandler>> {
        if self.settings.redirects.is_empty() {
            None
        } else {
            Some(Arc::clone(&self.settings) as Arc<dyn NotFoundHandler>)
        }
    }

    fn assets(&self) -> Vec<AssetDeclaration> {
        vec![AssetDeclaration {
            web: format!("/modules/{}", self.name),
            ..self.stylesheet()
        }]
    }
}

#[async_trait]
impl PageLoader for BlogSettings {
    async fn load(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        if self.covers(&request.path) {
            request.extras.insert(
                "blog".to_string(),
                json!({ "path": self.path, "title": self.title }),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl NotFoundHandler for BlogSettings {
    async fn handle(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        if let Some(target) = self.redirects.get(&request.path) {
            debug!(from = %request.path, to = %target, "redirecting retired post");
            request.redirect = Some(target.clone());
        }
        Ok(())
    }
}

/// Factory registered in the package catalog as `keystone-blog`.
///
/// Settings are checked while the module becomes ready, so a bad option
/// fails the bootstrap with the module's name attached.
pub fn factory() -> Factory {
    Factory::deferred(|options: ModuleOptions| {
        let parsed: Result<BlogSettings, _> =
            serde_json::from_value(serde_json::Value::Object(options.config.clone()));
        let settings = match parsed {
            Ok(settings) => settings,
            Err(e) => return Construction::failed(anyhow::anyhow!("invalid options: {e}")),
        };
        let checked = settings.validate();

        let blog = Blog {
            name: options.name,
            settings: Arc::new(settings),
            template_sources: options.template_sources,
            browser: options.browser,
        };
        Construction::pending(Arc::new(blog), async move { checked })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn settings(path: &str) -> BlogSettings {
        BlogSettings {
            path: path.to_string(),
            ..BlogSettings::default()
        }
    }

    #[test]
    fn covers_the_base_path_and_below() {
        let blog = settings("/news");
        assert!(blog.covers("/news"));
        assert!(blog.covers("/news/launch"));
        assert!(!blog.covers("/newsletter"));
        assert!(!blog.covers("/"));
        assert!(settings("/").covers("/anything"));
    }

    fn blog(template_sources: Vec<TemplateSource>) -> Blog {
        Blog {
            name: "keystone-blog".into(),
            settings: Arc::new(BlogSettings::default()),
            template_sources,
            browser: BrowserNaming::default(),
        }
    }

    #[test]
    fn stylesheet_defaults_to_the_compiled_in_copy() {
        let assets = blog(Vec::new()).assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].inline.as_deref(), Some(PACKAGE_STYLESHEET));
        assert_eq!(assets[0].web, "/modules/keystone-blog");
    }

    #[test]
    fn override_folder_stylesheet_wins() {
        let empty = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(local.path().join("public/css")).unwrap();
        std::fs::write(local.path().join("public/css/blog.css"), "/* local */").unwrap();

        let source = |dir: &tempfile::TempDir| TemplateSource {
            dir: dir.path().to_path_buf(),
            name: "myBlog".into(),
        };
        let assets = blog(vec![source(&local), source(&empty)]).assets();
        assert!(assets[0].inline.is_none());
        assert_eq!(assets[0].fs, local.path());
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(settings("news").validate().is_err());

        let mut blog = settings("/news");
        blog.redirects.insert("/news/a".into(), "news/b".into());
        let err = blog.validate().unwrap_err();
        assert!(err.to_string().contains("/news/a"));
    }

    #[tokio::test]
    async fn loader_only_annotates_blog_pages() {
        let blog = settings("/news");

        let mut inside = PageRequest::new("/news/launch");
        blog.load(&mut inside).await.unwrap();
        assert_eq!(inside.extras["blog"]["path"], "/news");

        let mut outside = PageRequest::new("/about");
        blog.load(&mut outside).await.unwrap();
        assert!(outside.extras.is_empty());
    }

    #[tokio::test]
    async fn retired_slugs_redirect() {
        let mut blog = settings("/news");
        blog.redirects
            .insert("/news/old-launch".into(), "/news/launch".into());

        let mut request = PageRequest::new("/news/old-launch");
        request.not_found = true;
        blog.handle(&mut request).await.unwrap();
        assert_eq!(request.redirect.as_deref(), Some("/news/launch"));

        let mut other = PageRequest::new("/news/unknown");
        other.not_found = true;
        blog.handle(&mut other).await.unwrap();
        assert!(!other.is_claimed());
    }
}
