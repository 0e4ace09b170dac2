//! Caller hooks run at fixed points of the bootstrap sequence.

use std::future::Future;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use keystone_sdk::{AppHandle, Services};

use crate::config::SiteConfig;
use crate::module::ModuleRegistry;

/// What a hook sees: the finished module set and the shared services.
#[derive(Clone)]
pub struct HookContext {
    pub config: Arc<SiteConfig>,
    pub app: AppHandle,
    pub services: Services,
    pub modules: Arc<ModuleRegistry>,
}

/// A one-shot caller hook.
pub type Hook = Box<dyn FnOnce(HookContext) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Wrap an async closure into a [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: FnOnce(HookContext) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |context| Box::pin(f(context)))
}

/// Run `hook` if present; absent hooks succeed.
pub(super) async fn run_optional(hook: Option<Hook>, context: &HookContext) -> anyhow::Result<()> {
    match hook {
        Some(hook) => hook(context.clone()).await,
        None => Ok(()),
    }
}
