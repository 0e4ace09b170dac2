//! Module factories and the options they are constructed with.
//!
//! Two factory shapes are accepted:
//!
//! - [`Factory::Deferred`] returns its instance right away together with a
//!   readiness future that completes once the module finished its own setup.
//! - [`Factory::Immediate`] returns a fully ready instance synchronously.
//!
//! [`Factory::invoke`] lifts the immediate shape into the deferred one, so
//! callers only ever deal with a [`Construction`].

use std::path::PathBuf;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::module::ModuleHandle;
use crate::services::Services;

/// The result of invoking a factory: an instance (if any) plus readiness.
pub struct Construction {
    pub instance: Option<ModuleHandle>,
    pub ready: BoxFuture<'static, anyhow::Result<()>>,
}

impl Construction {
    /// An instance that is ready immediately.
    pub fn ready(instance: ModuleHandle) -> Self {
        Self {
            instance: Some(instance),
            ready: Box::pin(std::future::ready(Ok(()))),
        }
    }

    /// An instance that becomes ready once `ready` completes.
    pub fn pending(
        instance: ModuleHandle,
        ready: impl std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            instance: Some(instance),
            ready: Box::pin(ready),
        }
    }

    /// A construction that failed before producing anything.
    pub fn failed(error: anyhow::Error) -> Self {
        Self {
            instance: None,
            ready: Box::pin(std::future::ready(Err(error))),
        }
    }
}

type DeferredFn = dyn Fn(ModuleOptions) -> Construction + Send + Sync;
type ImmediateFn = dyn Fn(ModuleOptions) -> anyhow::Result<Option<ModuleHandle>> + Send + Sync;

/// A module constructor.
#[derive(Clone)]
pub enum Factory {
    Deferred(Arc<DeferredFn>),
    Immediate(Arc<ImmediateFn>),
}

impl Factory {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(ModuleOptions) -> Construction + Send + Sync + 'static,
    {
        Factory::Deferred(Arc::new(f))
    }

    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(ModuleOptions) -> anyhow::Result<Option<ModuleHandle>> + Send + Sync + 'static,
    {
        Factory::Immediate(Arc::new(f))
    }

    /// Call the factory, normalizing both shapes into a [`Construction`].
    pub fn invoke(&self, options: ModuleOptions) -> Construction {
        match self {
            Factory::Deferred(f) => f(options),
            Factory::Immediate(f) => match f(options) {
                Ok(instance) => Construction {
                    instance,
                    ready: Box::pin(std::future::ready(Ok(()))),
                },
                Err(e) => Construction::failed(e),
            },
        }
    }

    /// Whether both values wrap the very same constructor.
    pub fn same_as(&self, other: &Factory) -> bool {
        match (self, other) {
            (Factory::Deferred(a), Factory::Deferred(b)) => Arc::ptr_eq(a, b),
            (Factory::Immediate(a), Factory::Immediate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factory::Deferred(_) => f.write_str("Factory::Deferred"),
            Factory::Immediate(_) => f.write_str("Factory::Immediate"),
        }
    }
}

/// A directory layered over a module's own templates and assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub dir: PathBuf,
    pub name: String,
}

/// Client-side constructor names for a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserNaming {
    #[serde(default)]
    pub construct: Option<String>,
    #[serde(default)]
    pub base_construct: Option<String>,
}

/// Everything a factory is constructed with.
#[derive(Clone)]
pub struct ModuleOptions {
    /// Declared module name.
    pub name: String,
    /// Options declared for this module.
    pub config: Map<String, Value>,
    pub services: Services,
    /// Override directories, most specific last.
    pub template_sources: Vec<TemplateSource>,
    pub browser: BrowserNaming,
    /// The wrapped package factory, when a local implementation extends one.
    pub parent: Option<Factory>,
}

impl ModuleOptions {
    /// Deserialize one declared option.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Construct through the parent factory with these options.
    ///
    /// Fails when there is no parent to delegate to.
    pub fn delegate(mut self) -> Construction {
        match self.parent.take() {
            Some(parent) => parent.invoke(self),
            None => Construction::failed(anyhow::anyhow!(
                "module '{}' has no parent implementation to delegate to",
                self.name
            )),
        }
    }
}

impl std::fmt::Debug for ModuleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleOptions")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("template_sources", &self.template_sources)
            .field("browser", &self.browser)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}
