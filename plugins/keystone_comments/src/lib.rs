//! Comments module for Keystone.
//!
//! Attaches to a blog module found through the bridge: the `blog` option
//! names it, otherwise `blog` and then `keystone-blog` are tried. Pages
//! below the blog's path get a `comments` entry their templates can use
//! to render the thread.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use keystone_blog::{Blog, BlogSettings};
use keystone_sdk::prelude::*;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

const DEFAULT_BLOGS: [&str; 2] = ["blog", "keystone-blog"];

/// The blog comments attach to, captured when bridged.
#[derive(Debug, Clone)]
pub struct AttachedBlog {
    pub module: String,
    pub settings: BlogSettings,
}

/// A constructed comments module.
pub struct Comments {
    blog_option: Option<String>,
    attached: Arc<RwLock<Option<AttachedBlog>>>,
    loader: Arc<ThreadLoader>,
}

impl Comments {
    /// The blog found while bridging, if any.
    pub fn attached(&self) -> Option<AttachedBlog> {
        self.attached.read().clone()
    }

    fn candidates(&self) -> Vec<&str> {
        match &self.blog_option {
            Some(name) => vec![name.as_str()],
            None => DEFAULT_BLOGS.to_vec(),
        }
    }
}

impl SiteModule for Comments {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bridge_receiver(&self) -> Option<&dyn BridgeReceiver> {
        Some(self)
    }

    fn page_loader(&self) -> Option<Arc<dyn PageLoader>> {
        Some(Arc::clone(&self.loader) as Arc<dyn PageLoader>)
    }
}

impl BridgeReceiver for Comments {
    fn receive_bridge(&self, bridge: &Bridge) {
        let found = self.candidates().into_iter().find_map(|name| {
            let module = bridge.get(name)?;
            let blog = module.as_any().downcast_ref::<Blog>()?;
            Some(AttachedBlog {
                module: name.to_string(),
                settings: blog.settings().clone(),
            })
        });

        match &found {
            Some(blog) => info!(blog = %blog.module, path = %blog.settings.path, "comments attached"),
            None => warn!(tried = ?self.candidates(), "comments found no blog module"),
        }
        *self.attached.write() = found;
    }
}

struct ThreadLoader {
    attached: Arc<RwLock<Option<AttachedBlog>>>,
    moderated: bool,
}

#[async_trait]
impl PageLoader for ThreadLoader {
    async fn load(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        let Some(blog) = self.attached.read().clone() else {
            return Ok(());
        };
        if blog.settings.covers(&request.path) && request.path != blog.settings.path {
            request.extras.insert(
                "comments".to_string(),
                json!({
                    "thread": request.path,
                    "moderated": self.moderated,
                    "can_post": request.user.is_some(),
                }),
            );
        }
        Ok(())
    }
}

/// Factory registered in the package catalog as `keystone-comments`.
pub fn factory() -> Factory {
    Factory::immediate(|options: ModuleOptions| {
        let attached = Arc::new(RwLock::new(None));
        let moderated = options.get::<bool>("moderated").unwrap_or(true);
        let comments = Comments {
            blog_option: options.get::<String>("blog"),
            loader: Arc::new(ThreadLoader {
                attached: Arc::clone(&attached),
                moderated,
            }),
            attached,
        };
        Ok(Some(Arc::new(comments) as ModuleHandle))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn comments(blog_option: Option<&str>) -> Comments {
        let attached = Arc::new(RwLock::new(None));
        Comments {
            blog_option: blog_option.map(str::to_string),
            loader: Arc::new(ThreadLoader {
                attached: Arc::clone(&attached),
                moderated: false,
            }),
            attached,
        }
    }

    struct NotABlog;

    impl SiteModule for NotABlog {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn ignores_peers_that_are_not_blogs() {
        let impostor: ModuleHandle = Arc::new(NotABlog);
        let mut bridge = Bridge::new();
        bridge.insert("blog", &impostor);

        let module = comments(None);
        module.receive_bridge(&bridge);
        assert!(module.attached().is_none());
    }

    #[tokio::test]
    async fn pages_outside_the_blog_get_no_thread() {
        let module = comments(None);
        *module.attached.write() = Some(AttachedBlog {
            module: "blog".into(),
            settings: BlogSettings::default(),
        });

        let mut post = PageRequest::new("/blog/launch");
        module.loader.load(&mut post).await.unwrap();
        assert_eq!(post.extras["comments"]["thread"], "/blog/launch");
        assert_eq!(post.extras["comments"]["can_post"], false);

        let mut index = PageRequest::new("/blog");
        module.loader.load(&mut index).await.unwrap();
        assert!(!index.extras.contains_key("comments"));
    }
}
