//! Package catalog and local module index.
//!
//! Packages are reusable module implementations compiled into the binary.
//! The local index holds the application's own factories for modules that
//! live in `lib/modules/<name>`.

use std::collections::HashMap;

use indexmap::IndexMap;
use keystone_sdk::Factory;
use thiserror::Error;

/// Structured failure reported when loading a package.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageLoadError {
    /// No package is registered under `name`.
    #[error("package '{name}' is not installed")]
    NotFound { name: String },

    /// The package exists but one of its own requirements does not.
    #[error("package '{package}' requires '{dependency}' which is not installed")]
    MissingDependency { package: String, dependency: String },

    #[error("package '{package}' failed to load: {details}")]
    Failed { package: String, details: String },
}

impl PackageLoadError {
    /// Whether this error means `target` itself is absent.
    ///
    /// A missing dependency of `target`, or a `NotFound` naming some other
    /// package, does not count.
    pub fn is_absent(&self, target: &str) -> bool {
        matches!(self, PackageLoadError::NotFound { name } if name == target)
    }
}

/// Anything that can turn a package name into a factory.
pub trait PackageSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Factory, PackageLoadError>;
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    factory: Factory,
    requires: Vec<String>,
}

/// Packages available to the site, keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl PackageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package with no requirements.
    pub fn register(&mut self, name: impl Into<String>, factory: Factory) -> &mut Self {
        self.register_with_requires(name, factory, Vec::<String>::new())
    }

    /// Register a package that needs other packages to be present to load.
    pub fn register_with_requires(
        &mut self,
        name: impl Into<String>,
        factory: Factory,
        requires: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.entries.insert(
            name.into(),
            CatalogEntry {
                factory,
                requires: requires.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Package names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl PackageSource for PackageCatalog {
    fn load(&self, name: &str) -> Result<Factory, PackageLoadError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| PackageLoadError::NotFound {
                name: name.to_string(),
            })?;

        if let Some(missing) = entry.requires.iter().find(|dep| !self.contains(dep)) {
            return Err(PackageLoadError::MissingDependency {
                package: name.to_string(),
                dependency: missing.clone(),
            });
        }

        Ok(entry.factory.clone())
    }
}

/// Application-registered factories for local modules.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    factories: HashMap<String, Factory>,
}

impl LocalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Factory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&Factory> {
        self.factories.get(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn noop() -> Factory {
        Factory::immediate(|_| Ok(None))
    }

    #[test]
    fn only_not_found_for_the_target_means_absent() {
        let not_found = PackageLoadError::NotFound {
            name: "keystone-blog".into(),
        };
        assert!(not_found.is_absent("keystone-blog"));
        assert!(!not_found.is_absent("keystone-comments"));

        let missing_dep = PackageLoadError::MissingDependency {
            package: "keystone-blog".into(),
            dependency: "keystone-people".into(),
        };
        assert!(!missing_dep.is_absent("keystone-blog"));
        assert!(!missing_dep.is_absent("keystone-people"));
    }

    #[test]
    fn unknown_package_is_not_found() {
        let catalog = PackageCatalog::new();
        let err = catalog.load("keystone-blog").unwrap_err();
        assert!(err.is_absent("keystone-blog"));
    }

    #[test]
    fn missing_requirement_is_reported_structurally() {
        let mut catalog = PackageCatalog::new();
        catalog.register_with_requires("keystone-comments", noop(), ["keystone-blog"]);

        let err = catalog.load("keystone-comments").unwrap_err();
        assert_eq!(
            err,
            PackageLoadError::MissingDependency {
                package: "keystone-comments".into(),
                dependency: "keystone-blog".into(),
            }
        );

        catalog.register("keystone-blog", noop());
        assert!(catalog.load("keystone-comments").is_ok());
    }

    #[test]
    fn loaded_factory_is_the_registered_one() {
        let factory = noop();
        let mut catalog = PackageCatalog::new();
        catalog.register("keystone-blog", factory.clone());
        assert!(catalog.load("keystone-blog").unwrap().same_as(&factory));
    }
}
