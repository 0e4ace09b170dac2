//! Default page service: page records plus Tera page-type templates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use dashmap::DashMap;
use keystone_sdk::{
    CoreService, Page, PageLoad, PageRequest, PageService, PagesInit, ServeOptions,
};
use parking_lot::RwLock;
use serde::Deserialize;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, info};

const FALLBACK_PAGE: &str = "<!DOCTYPE html>
<html><head><title>{{ page.title }}</title></head>
<body><h1>{{ page.title }}</h1></body></html>
";

const FALLBACK_NOT_FOUND: &str = "<!DOCTYPE html>
<html><head><title>Not found</title></head>
<body><h1>Not found</h1><p>{{ path }}</p></body></html>
";

#[derive(Debug, Default, Deserialize)]
struct PageFile {
    #[serde(default)]
    page: Vec<Page>,
}

/// Default [`PageService`].
///
/// Templates are looked up by page type (`<type>.html`); the 404 page is
/// `notFound.html`. Directories loaded later override earlier ones.
#[derive(Default)]
pub struct BasicPages {
    pages: DashMap<String, Page>,
    tera: RwLock<Tera>,
    core: RwLock<Option<Arc<dyn CoreService>>>,
}

impl BasicPages {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_store(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: PageFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        for page in file.page {
            self.insert(page);
        }
        Ok(())
    }

    fn ensure_defaults(&self) {
        for (slug, title) in [("/", "Home"), ("global", "Global")] {
            self.pages
                .entry(slug.to_string())
                .or_insert_with(|| Page::new(slug, title));
        }
    }

    fn render(&self, template: &str, fallback: &str, context: &TeraContext) -> Result<String> {
        let tera = self.tera.read();
        if tera.get_template(template).is_ok() {
            return tera
                .render(template, context)
                .with_context(|| format!("failed to render {template}"));
        }
        Tera::one_off(fallback, context, true).context("failed to render fallback page")
    }

    fn context(&self, request: &PageRequest) -> TeraContext {
        let mut context = TeraContext::new();
        let locals = self
            .core
            .read()
            .as_ref()
            .map(|core| core.locals())
            .unwrap_or_default();
        for (key, value) in locals {
            context.insert(key, &value);
        }
        context.insert("page", &request.page);
        context.insert("path", &request.path);
        context.insert("extras", &request.extras);
        context.insert("user", &request.user);
        context.insert("locale", &request.locale);
        context
    }
}

/// Site-relative targets gain the prefix; absolute URLs pass through.
fn redirect_location(prefix: &str, target: &str) -> String {
    if target.starts_with('/') && !target.starts_with("//") {
        format!("{prefix}{target}")
    } else {
        target.to_string()
    }
}

/// Template files under each directory, keyed by their relative name.
fn template_files(dirs: &[PathBuf]) -> Result<Vec<(PathBuf, Option<String>)>> {
    let mut files = Vec::new();
    for dir in dirs {
        if dir.is_dir() {
            collect_templates(dir, dir, &mut files)?;
        }
    }
    Ok(files)
}

fn collect_templates(
    base: &Path,
    dir: &Path,
    files: &mut Vec<(PathBuf, Option<String>)>,
) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let name = path
                .strip_prefix(base)
                .with_context(|| format!("template {} outside {}", path.display(), base.display()))?
                .to_string_lossy()
                .replace('\\', "/");
            files.push((path, Some(name)));
        }
    }
    Ok(())
}

#[async_trait]
impl PageService for BasicPages {
    async fn init(&self, init: PagesInit) -> Result<()> {
        let mut dirs = vec![init.template_path.clone()];
        dirs.extend(init.partial_paths.iter().cloned());
        dirs.extend(init.template_sources.iter().map(|s| s.dir.join("views")));

        let files = template_files(&dirs)?;
        let mut tera = Tera::default();
        tera.add_template_files(files)
            .context("failed to load page templates")?;
        debug!(count = tera.get_template_names().count(), "loaded page templates");
        *self.tera.write() = tera;

        if let Some(store) = &init.store {
            self.load_store(store)?;
        }
        self.ensure_defaults();
        *self.core.write() = Some(init.core);

        info!(pages = self.pages.len(), "pages initialized");
        Ok(())
    }

    async fn find(&self, slug: &str) -> Result<Option<Page>> {
        Ok(self.pages.get(slug).map(|p| p.clone()))
    }

    fn insert(&self, page: Page) {
        self.pages.insert(page.slug.clone(), page);
    }

    async fn serve(&self, mut request: PageRequest, options: &ServeOptions) -> Result<Response> {
        request.page = self.find(&request.path).await?;
        request.not_found = request.page.is_none();

        for loader in &options.loaders {
            match loader {
                PageLoad::Virtual(slug) => {
                    let page = self.find(slug).await?;
                    request
                        .extras
                        .insert(slug.clone(), serde_json::to_value(page)?);
                }
                PageLoad::Hook(hook) => hook.load(&mut request).await?,
            }
            if request.redirect.is_some() {
                break;
            }
        }

        if request.redirect.is_none() {
            if request.page.is_none() {
                request.not_found = true;
            }
            if request.not_found {
                options.not_found.handle(&mut request).await?;
            }
        }

        if let Some(target) = &request.redirect {
            let location = redirect_location(&options.prefix, target);
            return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
        }

        let context = self.context(&request);
        if request.not_found {
            let body = self.render("notFound.html", FALLBACK_NOT_FOUND, &context)?;
            return Ok((StatusCode::NOT_FOUND, Html(body)).into_response());
        }

        let template = match &request.page {
            Some(page) => format!("{}.html", page.page_type),
            None => "default.html".to_string(),
        };
        let body = self.render(&template, FALLBACK_PAGE, &context)?;
        Ok(Html(body).into_response())
    }
}

impl std::fmt::Debug for BasicPages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicPages")
            .field("pages", &self.pages.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn page_store_parses_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.toml");
        std::fs::write(
            &path,
            r#"
            [[page]]
            slug = "/about"
            title = "About"

            [[page]]
            slug = "/news"
            title = "News"
            type = "blog"
            "#,
        )
        .unwrap();

        let pages = BasicPages::new();
        pages.load_store(&path).unwrap();
        pages.ensure_defaults();

        assert_eq!(pages.pages.get("/about").unwrap().page_type, "default");
        assert_eq!(pages.pages.get("/news").unwrap().page_type, "blog");
        assert!(pages.pages.contains_key("global"));
        assert!(pages.pages.contains_key("/"));
    }

    #[test]
    fn later_template_dirs_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("pages");
        let over = dir.path().join("override");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::create_dir_all(over.join("partials")).unwrap();
        std::fs::write(base.join("default.html"), "base").unwrap();
        std::fs::write(over.join("default.html"), "override").unwrap();
        std::fs::write(over.join("partials/footer.html"), "footer").unwrap();

        let mut tera = Tera::default();
        tera.add_template_files(template_files(&[base, over]).unwrap())
            .unwrap();

        let rendered = tera.render("default.html", &TeraContext::new()).unwrap();
        assert_eq!(rendered, "override");
        assert!(tera.get_template("partials/footer.html").is_ok());
    }

    #[test]
    fn redirects_stay_under_the_prefix() {
        assert_eq!(redirect_location("", "/blog/launch"), "/blog/launch");
        assert_eq!(redirect_location("/site", "/blog/launch"), "/site/blog/launch");
        assert_eq!(
            redirect_location("/site", "https://example.org/x"),
            "https://example.org/x"
        );
        assert_eq!(redirect_location("/site", "//cdn.example.org/x"), "//cdn.example.org/x");
    }

    #[test]
    fn fallback_escapes_titles() {
        let pages = BasicPages::new();
        let mut request = PageRequest::new("/x");
        request.page = Some(Page::new("/x", "<b>x</b>"));
        let body = pages
            .render("default.html", FALLBACK_PAGE, &pages.context(&request))
            .unwrap();
        assert!(body.contains("&lt;b&gt;x&lt;&#x2F;b&gt;"));
    }
}
