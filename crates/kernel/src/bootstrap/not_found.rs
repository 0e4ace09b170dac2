//! The not-found pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use keystone_sdk::{NotFoundHandler, PageRequest};

/// Tries each handler in order until one claims the request.
///
/// A request is claimed once a handler sets a redirect or clears the
/// not-found flag. If every handler declines the request stays not found.
#[derive(Clone, Default)]
pub struct NotFoundPipeline {
    handlers: Vec<Arc<dyn NotFoundHandler>>,
}

impl NotFoundPipeline {
    pub fn new(handlers: Vec<Arc<dyn NotFoundHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl NotFoundHandler for NotFoundPipeline {
    async fn handle(&self, request: &mut PageRequest) -> anyhow::Result<()> {
        for handler in &self.handlers {
            handler.handle(request).await?;
            if request.is_claimed() {
                break;
            }
        }
        Ok(())
    }
}
