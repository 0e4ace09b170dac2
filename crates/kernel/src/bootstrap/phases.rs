//! The bootstrap sequence.

use std::collections::HashMap;
use std::sync::Arc;

use keystone_sdk::{
    AppHandle, CoreInit, CoreService, FileStorage, Localizer, Mailer, ModuleOptions,
    NotFoundHandler, PageLoad, PageService, PagesInit, SchemaInit, SchemaService, ServeOptions,
    ServiceOverrides, Services, TemplateSource,
};
use sqlx::PgPool;
use tracing::{debug, info};

use super::hooks::{HookContext, run_optional};
use super::{Bootstrap, Invocation, NotFoundPipeline, Phase, PhaseEvent, PhaseObserver, Site};
use crate::config::SiteConfig;
use crate::db;
use crate::error::BootstrapError;
use crate::generation;
use crate::module::naming::override_label;
use crate::module::{self, LocalIndex, ModuleLocator, ModuleRegistry, PackageSource};
use crate::routes::{self, RouterParts};
use crate::services::{
    BasicCore, BasicPages, BasicSchemas, LocalFileStorage, LocaleService, MailService,
};

/// Log a phase transition and tell the observer, if any.
pub(super) fn announce(observer: Option<&PhaseObserver>, phase: Phase, event: PhaseEvent) {
    match event {
        PhaseEvent::Started => info!(phase = %phase, "bootstrap phase"),
        PhaseEvent::Skipped => info!(phase = %phase, "bootstrap phase skipped"),
    }
    if let Some(observer) = observer {
        observer(phase, event);
    }
}

impl Bootstrap {
    /// Run every phase up to, but not including, [`Phase::Go`].
    pub async fn build(self) -> Result<Site, BootstrapError> {
        let Bootstrap {
            mut config,
            invocation,
            packages,
            locals,
            core,
            schemas,
            pages,
            mailer,
            storage,
            locale,
            overrides,
            late_routes,
            before_end_assets,
            after_init,
            loaders: caller_loaders,
            not_found: caller_not_found,
            middleware,
            page_middleware,
            tasks,
            observer,
        } = self;
        let observer = observer.as_ref();

        if let Invocation::Task { name, .. } = &invocation {
            if !tasks.contains(name) {
                return Err(BootstrapError::UnknownTask {
                    name: name.clone(),
                    available: tasks.names().join(", "),
                });
            }
        }

        if invocation == Invocation::Generate {
            let id = generation::regenerate(&config.root_dir)
                .map_err(|e| BootstrapError::phase(Phase::PrepareStorage, e))?;
            info!(generation = %id, "wrote new generation id");
            config.generation = Some(id);
        }

        announce(observer, Phase::PrepareStorage, PhaseEvent::Started);
        prepare_storage(&config)
            .await
            .map_err(|e| BootstrapError::phase(Phase::PrepareStorage, e))?;

        announce(observer, Phase::InitStorageBackend, PhaseEvent::Started);
        let storage: Arc<dyn FileStorage> =
            storage.unwrap_or_else(|| Arc::new(LocalFileStorage::new(&config.uploads)));
        storage
            .init()
            .await
            .map_err(|e| BootstrapError::phase(Phase::InitStorageBackend, e))?;

        announce(observer, Phase::InitCore, PhaseEvent::Started);
        let app = AppHandle::new();
        let (mailer, locale, db) = shared_dependencies(&config, mailer, locale)
            .await
            .map_err(|e| BootstrapError::phase(Phase::InitCore, e))?;
        let core: Arc<dyn CoreService> = core.unwrap_or_else(|| Arc::new(BasicCore::new()));
        core.init(CoreInit {
            root_dir: config.root_dir.clone(),
            prefix: config.prefix.clone(),
            base_url: config.base_url.clone(),
            absolute_urls: config.absolute_urls,
            generation: config.generation.clone(),
            locals: config.locals.clone(),
            partial_paths: vec![global_views(&config)],
            minify: config.minify,
            options: config.core.clone(),
            storage: Arc::clone(&storage),
            mailer: Arc::clone(&mailer),
            locale: Arc::clone(&locale),
            app: app.clone(),
            db: db.clone(),
        })
        .await
        .map_err(|e| BootstrapError::phase(Phase::InitCore, e))?;

        announce(observer, Phase::InitSchemaSubsystem, PhaseEvent::Started);
        let schemas: Arc<dyn SchemaService> =
            schemas.unwrap_or_else(|| Arc::new(BasicSchemas::new()));
        schemas
            .init(SchemaInit {
                core: Arc::clone(&core),
                app: app.clone(),
                template_sources: vec![subsystem_source(&config, "keystone-schemas")],
                options: config.schemas.clone(),
            })
            .await
            .map_err(|e| BootstrapError::phase(Phase::InitSchemaSubsystem, e))?;

        announce(observer, Phase::InitPageSubsystem, PhaseEvent::Started);
        let pages: Arc<dyn PageService> = pages.unwrap_or_else(|| Arc::new(BasicPages::new()));
        pages
            .init(PagesInit {
                core: Arc::clone(&core),
                schemas: Arc::clone(&schemas),
                app: app.clone(),
                template_path: config.pages.template_path.clone(),
                partial_paths: vec![global_views(&config)],
                template_sources: vec![subsystem_source(&config, "keystone-pages")],
                store: Some(config.data_dir().join("pages.toml")),
                options: config.pages.options.clone(),
            })
            .await
            .map_err(|e| BootstrapError::phase(Phase::InitPageSubsystem, e))?;
        schemas.set_pages(Arc::clone(&pages));

        let services = Services {
            core: Arc::clone(&core),
            pages: Arc::clone(&pages),
            schemas,
            mailer,
            storage,
            locale: Arc::clone(&locale),
            app: app.clone(),
            db,
        };

        announce(observer, Phase::InitModules, PhaseEvent::Started);
        let registry =
            init_modules(&config, packages.as_ref(), &locals, &overrides, &services).await?;
        let modules = Arc::new(registry);
        info!(count = modules.len(), "modules initialized");

        announce(observer, Phase::BridgeModules, PhaseEvent::Started);
        bridge_modules(&modules);

        let config = Arc::new(config);
        let context = HookContext {
            config: Arc::clone(&config),
            app: app.clone(),
            services: services.clone(),
            modules: Arc::clone(&modules),
        };

        announce(observer, Phase::SetLateRoutes, PhaseEvent::Started);
        run_optional(late_routes, &context)
            .await
            .map_err(|e| BootstrapError::phase(Phase::SetLateRoutes, e))?;

        let router = if invocation.is_task() {
            announce(observer, Phase::ServePages, PhaseEvent::Skipped);
            None
        } else {
            announce(observer, Phase::ServePages, PhaseEvent::Started);
            let serve = serve_options(&config, &modules, caller_loaders, caller_not_found);
            let router = routes::assemble(RouterParts {
                config: Arc::clone(&config),
                modules: Arc::clone(&modules),
                app_routes: app.take_routes(),
                pages: Arc::clone(&pages),
                serve,
                db: services.db.clone(),
                middleware,
                page_middleware,
            })
            .await
            .map_err(|e| BootstrapError::phase(Phase::ServePages, e))?;
            Some(router)
        };

        if matches!(invocation, Invocation::Task { .. }) {
            announce(observer, Phase::FinalizeAssets, PhaseEvent::Skipped);
        } else {
            announce(observer, Phase::FinalizeAssets, PhaseEvent::Started);
            for (_, module) in modules.iter() {
                for asset in module.instance.assets() {
                    core.push_asset(asset);
                }
            }
            for asset in &config.assets {
                core.push_asset(asset.clone());
            }
            run_optional(before_end_assets, &context)
                .await
                .map_err(|e| BootstrapError::phase(Phase::FinalizeAssets, e))?;
            let written = core
                .end_assets()
                .await
                .map_err(|e| BootstrapError::phase(Phase::FinalizeAssets, e))?;
            debug!(bundles = written.len(), "assets finalized");
        }

        announce(observer, Phase::AfterInit, PhaseEvent::Started);
        run_optional(after_init, &context)
            .await
            .map_err(|e| BootstrapError::phase(Phase::AfterInit, e))?;

        Ok(Site::new(
            config,
            invocation,
            services,
            modules,
            router,
            tasks,
            observer.cloned(),
        ))
    }
}

async fn prepare_storage(config: &SiteConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    for dir in [
        config.data_dir(),
        config.uploads.temp_path.clone(),
        config.uploads.uploads_path.clone(),
    ] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Mailer, localizer and database handle, built from config unless supplied.
async fn shared_dependencies(
    config: &SiteConfig,
    mailer: Option<Arc<dyn Mailer>>,
    locale: Option<Arc<dyn Localizer>>,
) -> anyhow::Result<(Arc<dyn Mailer>, Arc<dyn Localizer>, Option<PgPool>)> {
    let mailer: Arc<dyn Mailer> = match mailer {
        Some(mailer) => mailer,
        None => Arc::new(MailService::new(&config.mailer)?),
    };

    let locale: Arc<dyn Localizer> = match locale {
        Some(locale) => locale,
        None => {
            let service = LocaleService::new(&config.i18n);
            service.load_directory(&config.i18n.directory).await?;
            Arc::new(service)
        }
    };

    let db = config.db.as_ref().map(db::create_pool).transpose()?;
    Ok((mailer, locale, db))
}

fn global_views(config: &SiteConfig) -> std::path::PathBuf {
    config.root_dir.join("views").join("global")
}

/// Override folder for a built-in subsystem, e.g. `keystone-pages` → `myPages`.
fn subsystem_source(config: &SiteConfig, subsystem: &str) -> TemplateSource {
    TemplateSource {
        dir: config.subsystem_override_dir(subsystem),
        name: override_label(subsystem),
    }
}

/// Locate, construct and register every declared module, in order.
async fn init_modules(
    config: &SiteConfig,
    packages: &dyn PackageSource,
    locals: &LocalIndex,
    overrides: &HashMap<String, ServiceOverrides>,
    services: &Services,
) -> Result<ModuleRegistry, BootstrapError> {
    let locator = ModuleLocator::new(packages, locals, &config.module_roots);
    let mut registry = ModuleRegistry::new();

    for declaration in &config.modules {
        let resolved = locator.locate(&declaration.name, declaration.extend.as_deref())?;

        let services = match overrides.get(&declaration.name) {
            Some(overrides) => overrides.clone().merged_over(services),
            None => services.clone(),
        };
        let options = ModuleOptions {
            name: declaration.name.clone(),
            config: declaration.options.clone(),
            services,
            template_sources: Vec::new(),
            browser: declaration.browser.clone(),
            parent: None,
        };

        let instance = module::construct(&resolved, options).await?;
        registry
            .insert(declaration.name.as_str(), instance, resolved.kind())
            .map_err(|e| BootstrapError::phase(Phase::InitModules, e))?;
    }

    Ok(registry)
}

/// Hand every bridge receiver the full module map, once.
fn bridge_modules(modules: &ModuleRegistry) {
    let bridge = modules.bridge();
    for (name, module) in modules.iter() {
        if let Some(receiver) = module.instance.bridge_receiver() {
            debug!(module = %name, peers = bridge.len(), "bridging module");
            receiver.receive_bridge(&bridge);
        }
    }
}

/// Loaders run `global` first, then module loaders in registry order, then
/// the caller's. Not-found handlers follow the same order.
fn serve_options(
    config: &SiteConfig,
    modules: &ModuleRegistry,
    caller_loaders: Vec<PageLoad>,
    caller_not_found: Option<Arc<dyn NotFoundHandler>>,
) -> ServeOptions {
    let mut loaders = vec![PageLoad::Virtual("global".to_string())];
    loaders.extend(
        modules
            .iter()
            .filter_map(|(_, m)| m.instance.page_loader())
            .map(PageLoad::Hook),
    );
    loaders.extend(caller_loaders);

    let mut handlers: Vec<Arc<dyn NotFoundHandler>> = modules
        .iter()
        .filter_map(|(_, m)| m.instance.not_found_handler())
        .collect();
    handlers.extend(caller_not_found);

    ServeOptions {
        loaders,
        not_found: Arc::new(NotFoundPipeline::new(handlers)),
        update_after_login: config.second_chance_login,
        prefix: config.prefix.clone(),
        options: config.pages.options.clone(),
    }
}
