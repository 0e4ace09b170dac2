//! Registry of constructed modules.

use indexmap::IndexMap;
use keystone_sdk::{Bridge, ModuleHandle};

use super::locator::ResolutionKind;

/// A constructed module and how it was resolved.
#[derive(Clone)]
pub struct RegisteredModule {
    pub instance: ModuleHandle,
    pub kind: ResolutionKind,
}

/// Constructed modules in declaration order.
///
/// Only the bootstrapper inserts; once bootstrap finishes the registry is
/// shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &mut self,
        name: impl Into<String>,
        instance: ModuleHandle,
        kind: ResolutionKind,
    ) -> anyhow::Result<()> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            anyhow::bail!("module '{name}' is already registered");
        }
        self.modules
            .insert(name, RegisteredModule { instance, kind });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredModule> {
        self.modules.get(name)
    }

    /// Modules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredModule)> {
        self.modules.iter().map(|(name, m)| (name.as_str(), m))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Non-owning name → instance view handed to bridge receivers.
    pub fn bridge(&self) -> Bridge {
        let mut bridge = Bridge::new();
        for (name, module) in &self.modules {
            bridge.insert(name.clone(), &module.instance);
        }
        bridge
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.modules.iter().map(|(name, m)| (name, m.kind)))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::any::Any;
    use std::sync::Arc;

    use keystone_sdk::SiteModule;

    use super::*;

    struct Plain;

    impl SiteModule for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut registry = ModuleRegistry::new();
        for name in ["keystone-people", "blog", "keystone-comments"] {
            registry
                .insert(name, Arc::new(Plain), ResolutionKind::PackageOnly)
                .unwrap();
        }
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["keystone-people", "blog", "keystone-comments"]);

        let bridged: Vec<_> = registry.bridge().names().map(String::from).collect();
        assert_eq!(bridged, names);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ModuleRegistry::new();
        registry
            .insert("blog", Arc::new(Plain), ResolutionKind::LocalOnly)
            .unwrap();
        assert!(
            registry
                .insert("blog", Arc::new(Plain), ResolutionKind::LocalOnly)
                .is_err()
        );
        assert_eq!(registry.len(), 1);
    }
}
