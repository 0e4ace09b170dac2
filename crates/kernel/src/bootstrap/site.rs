//! A bootstrapped site, ready to go.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use keystone_sdk::Services;
use tracing::info;

use super::phases::announce;
use super::{Invocation, Phase, PhaseEvent, PhaseObserver};
use crate::config::SiteConfig;
use crate::error::BootstrapError;
use crate::module::ModuleRegistry;
use crate::task::{TaskContext, TaskRegistry};

/// How [`Site::go`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new generation id was written and assets were finalized.
    Generated(String),
    TaskCompleted(String),
    /// The listener shut down.
    Served,
}

/// The result of a successful bootstrap.
pub struct Site {
    config: Arc<SiteConfig>,
    invocation: Invocation,
    services: Services,
    modules: Arc<ModuleRegistry>,
    router: Option<Router>,
    tasks: TaskRegistry,
    observer: Option<PhaseObserver>,
}

impl Site {
    pub(super) fn new(
        config: Arc<SiteConfig>,
        invocation: Invocation,
        services: Services,
        modules: Arc<ModuleRegistry>,
        router: Option<Router>,
        tasks: TaskRegistry,
        observer: Option<PhaseObserver>,
    ) -> Self {
        Self {
            config,
            invocation,
            services,
            modules,
            router,
            tasks,
            observer,
        }
    }

    pub fn config(&self) -> &Arc<SiteConfig> {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    /// The assembled application; `None` when running a task.
    pub fn router(&self) -> Option<Router> {
        self.router.clone()
    }

    /// Report the new generation, run the task, or listen.
    pub async fn go(self) -> Result<Outcome, BootstrapError> {
        announce(self.observer.as_ref(), Phase::Go, PhaseEvent::Started);

        match self.invocation {
            Invocation::Generate => {
                let id = self.config.generation.clone().unwrap_or_default();
                info!(generation = %id, "generation updated");
                Ok(Outcome::Generated(id))
            }
            Invocation::Task { name, args } => {
                let task = self
                    .tasks
                    .get(&name)
                    .ok_or_else(|| BootstrapError::UnknownTask {
                        name: name.clone(),
                        available: self.tasks.names().join(", "),
                    })?;
                info!(task = %name, "running task");
                task.run(TaskContext {
                    args,
                    config: Arc::clone(&self.config),
                    services: self.services.clone(),
                    modules: Arc::clone(&self.modules),
                })
                .await
                .map_err(|e| BootstrapError::phase(Phase::Go, e))?;
                Ok(Outcome::TaskCompleted(name))
            }
            Invocation::Serve => {
                let app = self.router.ok_or_else(|| {
                    BootstrapError::phase(Phase::Go, anyhow::anyhow!("page routes were not assembled"))
                })?;
                let addr = format!("{}:{}", self.config.address, self.config.port);
                let listener = tokio::net::TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("failed to bind to {addr}"))
                    .map_err(|e| BootstrapError::phase(Phase::Go, e))?;

                info!(%addr, "server listening");
                axum::serve(listener, app)
                    .await
                    .context("server error")
                    .map_err(|e| BootstrapError::phase(Phase::Go, e))?;
                Ok(Outcome::Served)
            }
        }
    }
}
