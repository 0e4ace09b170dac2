//! Command-line tasks.
//!
//! A task runs after bootstrap instead of the HTTP listener. The site
//! registers its own; `keystone:modules` is built in.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use keystone_sdk::Services;
use tracing::warn;

use crate::config::SiteConfig;
use crate::generation::GENERATION_TASK;
use crate::module::ModuleRegistry;

/// Name of the built-in module listing task.
pub const MODULES_TASK: &str = "keystone:modules";

/// Everything a task runs with.
#[derive(Clone)]
pub struct TaskContext {
    /// Arguments after the task name.
    pub args: Vec<String>,
    pub config: Arc<SiteConfig>,
    pub services: Services,
    pub modules: Arc<ModuleRegistry>,
}

#[async_trait]
pub trait Task: Send + Sync {
    fn description(&self) -> &str;

    async fn run(&self, context: TaskContext) -> Result<()>;
}

/// Registered tasks, in registration order.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Arc<dyn Task>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        let mut registry = Self {
            tasks: IndexMap::new(),
        };
        registry.register(MODULES_TASK, Arc::new(ModulesTask));
        registry
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`, replacing any previous task of that name.
    pub fn register(&mut self, name: impl Into<String>, task: Arc<dyn Task>) {
        let name = name.into();
        if name == GENERATION_TASK {
            warn!(task = %name, "task name is reserved, ignoring registration");
            return;
        }
        self.tasks.insert(name, task);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        name == GENERATION_TASK || self.tasks.contains_key(name)
    }

    /// Every runnable task name, the generation task included.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(GENERATION_TASK)
            .chain(self.tasks.keys().map(String::as_str))
            .collect()
    }
}

/// Prints each registered module and how it was resolved.
struct ModulesTask;

#[async_trait]
impl Task for ModulesTask {
    fn description(&self) -> &str {
        "List configured modules and where each implementation comes from"
    }

    async fn run(&self, context: TaskContext) -> Result<()> {
        if context.modules.is_empty() {
            println!("No modules configured.");
            return Ok(());
        }

        println!("{:<32} {:<16}", "MODULE", "SOURCE");
        println!("{}", "-".repeat(48));
        for (name, module) in context.modules.iter() {
            println!("{:<32} {:<16}", name, module.kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        fn description(&self) -> &str {
            "does nothing"
        }

        async fn run(&self, _context: TaskContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builtin_tasks_are_listed() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.names(), vec![GENERATION_TASK, MODULES_TASK]);
        assert!(registry.contains(GENERATION_TASK));
        assert!(registry.get(GENERATION_TASK).is_none());
    }

    #[test]
    fn generation_name_is_reserved() {
        let mut registry = TaskRegistry::new();
        registry.register(GENERATION_TASK, Arc::new(Noop));
        registry.register("site:reindex", Arc::new(Noop));
        assert_eq!(
            registry.names(),
            vec![GENERATION_TASK, MODULES_TASK, "site:reindex"]
        );
        assert!(registry.get(GENERATION_TASK).is_none());
    }
}
