//! Module construction.

use keystone_sdk::{Factory, ModuleHandle, ModuleOptions, TemplateSource};
use tracing::{debug, error};

use super::locator::ResolvedSource;
use super::naming::browser_naming;
use crate::error::BootstrapError;

/// A factory that layers `source` over the options, then delegates to `base`.
pub fn subclass_factory(base: Factory, source: TemplateSource) -> Factory {
    Factory::deferred(move |mut options: ModuleOptions| {
        options.template_sources.push(source.clone());
        base.invoke(options)
    })
}

/// The factory to invoke for `resolved`, plus the parent it receives.
fn entry_point(resolved: &ResolvedSource) -> (Factory, Option<Factory>) {
    match resolved {
        ResolvedSource::PackageOnly { factory, .. } | ResolvedSource::LocalOnly { factory, .. } => {
            (factory.clone(), None)
        }
        ResolvedSource::LocalSubclass {
            base,
            local,
            override_source,
            ..
        } => {
            let wrapper = subclass_factory(base.clone(), override_source.clone());
            match local {
                Some(local) => (local.clone(), Some(wrapper)),
                None => (wrapper, None),
            }
        }
    }
}

/// Construct one module and wait until it reports ready.
pub async fn construct(
    resolved: &ResolvedSource,
    mut options: ModuleOptions,
) -> Result<ModuleHandle, BootstrapError> {
    let name = options.name.clone();

    if let ResolvedSource::LocalSubclass { package, .. } = resolved {
        options.browser = browser_naming(&name, package, &options.browser);
    }

    let (factory, parent) = entry_point(resolved);
    options.parent = parent;

    debug!(module = %name, kind = %resolved.kind(), "constructing module");
    let construction = factory.invoke(options);

    if let Err(e) = construction.ready.await {
        error!(module = %name, error = %e, "module failed to initialize");
        return Err(BootstrapError::module_init(name, e));
    }

    match construction.instance {
        Some(instance) => Ok(instance),
        None => {
            error!(module = %name, "module factory returned no instance");
            Err(BootstrapError::module_init(
                name,
                anyhow::anyhow!("factory completed without returning a module instance"),
            ))
        }
    }
}
