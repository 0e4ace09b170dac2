//! Decide where a declared module's implementation comes from.
//!
//! | local folder | package loads | result        |
//! |--------------|---------------|---------------|
//! | no           | yes           | PackageOnly   |
//! | yes          | absent        | LocalOnly     |
//! | yes          | yes           | LocalSubclass |
//!
//! Any package failure other than "the target itself is absent" is fatal,
//! whether or not a local folder exists.

use std::fmt;
use std::path::PathBuf;

use keystone_sdk::{Factory, TemplateSource};

use super::catalog::{LocalIndex, PackageSource};
use super::naming::override_label;
use crate::error::BootstrapError;

/// Resolution strategy, without the factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    PackageOnly,
    LocalOnly,
    LocalSubclass,
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ResolutionKind::PackageOnly => "package",
            ResolutionKind::LocalOnly => "local",
            ResolutionKind::LocalSubclass => "local-subclass",
        })
    }
}

/// Where a module's implementation comes from.
#[derive(Debug, Clone)]
pub enum ResolvedSource {
    /// The package factory, used as is.
    PackageOnly { package: String, factory: Factory },
    /// The application's own factory for a local folder.
    LocalOnly { folder: PathBuf, factory: Factory },
    /// A package factory layered with the local folder's templates.
    LocalSubclass {
        folder: PathBuf,
        package: String,
        base: Factory,
        /// Local factory, given the layered package factory as parent.
        local: Option<Factory>,
        override_source: TemplateSource,
    },
}

impl ResolvedSource {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            ResolvedSource::PackageOnly { .. } => ResolutionKind::PackageOnly,
            ResolvedSource::LocalOnly { .. } => ResolutionKind::LocalOnly,
            ResolvedSource::LocalSubclass { .. } => ResolutionKind::LocalSubclass,
        }
    }
}

/// Resolves module names against the package catalog and local folders.
pub struct ModuleLocator<'a> {
    packages: &'a dyn PackageSource,
    locals: &'a LocalIndex,
    search_roots: &'a [PathBuf],
}

impl<'a> ModuleLocator<'a> {
    pub fn new(
        packages: &'a dyn PackageSource,
        locals: &'a LocalIndex,
        search_roots: &'a [PathBuf],
    ) -> Self {
        Self {
            packages,
            locals,
            search_roots,
        }
    }

    /// Local override folder for `name`, if one exists.
    pub fn local_folder(&self, name: &str) -> Option<PathBuf> {
        self.search_roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_dir())
    }

    /// Resolve module `name`, which overrides package `extend` (or `name`).
    pub fn locate(&self, name: &str, extend: Option<&str>) -> Result<ResolvedSource, BootstrapError> {
        let target = extend.unwrap_or(name);

        let Some(folder) = self.local_folder(name) else {
            return self
                .packages
                .load(target)
                .map(|factory| ResolvedSource::PackageOnly {
                    package: target.to_string(),
                    factory,
                })
                .map_err(|source| {
                    if source.is_absent(target) {
                        BootstrapError::Resolution {
                            module: name.to_string(),
                            details: format!(
                                "package '{target}' is not installed and no local folder '{name}' \
                                 exists in {}",
                                self.describe_roots()
                            ),
                        }
                    } else {
                        dependency_error(name, target, source)
                    }
                });
        };

        match self.packages.load(target) {
            Ok(base) => Ok(ResolvedSource::LocalSubclass {
                override_source: TemplateSource {
                    dir: folder.clone(),
                    name: override_label(name),
                },
                folder,
                package: target.to_string(),
                base,
                local: self.locals.get(name).cloned(),
            }),
            Err(source) if source.is_absent(target) => match self.locals.get(name) {
                Some(factory) => Ok(ResolvedSource::LocalOnly {
                    folder,
                    factory: factory.clone(),
                }),
                None => Err(BootstrapError::Resolution {
                    module: name.to_string(),
                    details: format!(
                        "found local folder {} but no package '{target}' to extend and no local \
                         implementation registered for it",
                        folder.display()
                    ),
                }),
            },
            Err(source) => Err(dependency_error(name, target, source)),
        }
    }

    fn describe_roots(&self) -> String {
        if self.search_roots.is_empty() {
            return "(no module roots)".to_string();
        }
        self.search_roots
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn dependency_error(
    module: &str,
    package: &str,
    source: super::catalog::PackageLoadError,
) -> BootstrapError {
    BootstrapError::DependencyResolution {
        module: module.to_string(),
        package: package.to_string(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::module::catalog::{PackageCatalog, PackageLoadError};

    struct Failing(PackageLoadError);

    impl PackageSource for Failing {
        fn load(&self, _name: &str) -> Result<Factory, PackageLoadError> {
            Err(self.0.clone())
        }
    }

    fn noop() -> Factory {
        Factory::immediate(|_| Ok(None))
    }

    fn roots_with(folders: &[&str]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        for folder in folders {
            std::fs::create_dir_all(dir.path().join(folder)).unwrap();
        }
        let roots = vec![dir.path().to_path_buf()];
        (dir, roots)
    }

    #[test]
    fn package_without_folder_is_used_directly() {
        let factory = noop();
        let mut catalog = PackageCatalog::new();
        catalog.register("keystone-blog", factory.clone());
        let locals = LocalIndex::new();
        let (_dir, roots) = roots_with(&[]);

        let resolved = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("keystone-blog", None)
            .unwrap();
        match resolved {
            ResolvedSource::PackageOnly { package, factory: f } => {
                assert_eq!(package, "keystone-blog");
                assert!(f.same_as(&factory));
            }
            other => panic!("expected PackageOnly, got {:?}", other.kind()),
        }
    }

    #[test]
    fn extend_without_folder_resolves_the_target_package() {
        let mut catalog = PackageCatalog::new();
        catalog.register("keystone-blog", noop());
        let locals = LocalIndex::new();
        let (_dir, roots) = roots_with(&[]);

        let resolved = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("blog", Some("keystone-blog"))
            .unwrap();
        assert_eq!(resolved.kind(), ResolutionKind::PackageOnly);
    }

    #[test]
    fn folder_without_package_uses_local_factory() {
        let catalog = PackageCatalog::new();
        let mut locals = LocalIndex::new();
        locals.register("events", noop());
        let (_dir, roots) = roots_with(&["events"]);

        let resolved = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("events", None)
            .unwrap();
        assert_eq!(resolved.kind(), ResolutionKind::LocalOnly);
    }

    #[test]
    fn folder_without_package_or_local_factory_fails() {
        let catalog = PackageCatalog::new();
        let locals = LocalIndex::new();
        let (_dir, roots) = roots_with(&["events"]);

        let err = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("events", None)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Resolution { ref module, .. } if module == "events"));
    }

    #[test]
    fn folder_and_package_layer_the_override_source() {
        let mut catalog = PackageCatalog::new();
        catalog.register("keystone-blog", noop());
        let locals = LocalIndex::new();
        let (dir, roots) = roots_with(&["blog"]);

        let resolved = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("blog", Some("keystone-blog"))
            .unwrap();
        match resolved {
            ResolvedSource::LocalSubclass {
                folder,
                package,
                local,
                override_source,
                ..
            } => {
                assert_eq!(folder, dir.path().join("blog"));
                assert_eq!(package, "keystone-blog");
                assert!(local.is_none());
                assert_eq!(override_source.name, "myBlog");
                assert_eq!(override_source.dir, folder);
            }
            other => panic!("expected LocalSubclass, got {:?}", other.kind()),
        }
    }

    #[test]
    fn missing_dependency_with_folder_is_fatal() {
        let source = Failing(PackageLoadError::MissingDependency {
            package: "keystone-blog".into(),
            dependency: "keystone-people".into(),
        });
        let mut locals = LocalIndex::new();
        locals.register("keystone-blog", noop());
        let (_dir, roots) = roots_with(&["keystone-blog"]);

        let err = ModuleLocator::new(&source, &locals, &roots)
            .locate("keystone-blog", None)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::DependencyResolution { .. }));
    }

    #[test]
    fn not_found_naming_another_package_is_fatal() {
        let source = Failing(PackageLoadError::NotFound {
            name: "keystone-people".into(),
        });
        let mut locals = LocalIndex::new();
        locals.register("keystone-blog", noop());
        let (_dir, roots) = roots_with(&["keystone-blog"]);

        let err = ModuleLocator::new(&source, &locals, &roots)
            .locate("keystone-blog", None)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::DependencyResolution { .. }));
    }

    #[test]
    fn absent_package_without_folder_is_a_resolution_error() {
        let catalog = PackageCatalog::new();
        let locals = LocalIndex::new();
        let (_dir, roots) = roots_with(&[]);

        let err = ModuleLocator::new(&catalog, &locals, &roots)
            .locate("keystone-blog", None)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Resolution { .. }));
        assert!(err.to_string().contains("keystone-blog"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut catalog = PackageCatalog::new();
        catalog.register("keystone-blog", noop());
        let locals = LocalIndex::new();
        let (_dir, roots) = roots_with(&["blog"]);
        let locator = ModuleLocator::new(&catalog, &locals, &roots);

        let kinds: Vec<_> = (0..3)
            .map(|_| locator.locate("blog", Some("keystone-blog")).unwrap().kind())
            .collect();
        assert!(kinds.iter().all(|k| *k == ResolutionKind::LocalSubclass));
    }
}
