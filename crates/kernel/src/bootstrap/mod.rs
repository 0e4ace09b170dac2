//! Site bootstrap.
//!
//! [`Bootstrap`] collects the site configuration, the package catalog and
//! any caller-supplied services or hooks, then [`Bootstrap::build`] runs
//! the fixed sequence of [`Phase`]s one after another. The first failing
//! phase aborts the rest; nothing runs concurrently.

mod hooks;
mod not_found;
mod phases;
mod site;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keystone_sdk::{
    CoreService, Factory, FileStorage, Localizer, Mailer, Middleware, NotFoundHandler, PageLoad,
    PageLoader, PageService, SchemaService, ServiceOverrides,
};

pub use hooks::{Hook, HookContext, hook};
pub use not_found::NotFoundPipeline;
pub use site::{Outcome, Site};

use crate::config::SiteConfig;
use crate::generation::GENERATION_TASK;
use crate::module::{LocalIndex, PackageCatalog, PackageSource};
use crate::task::{Task, TaskRegistry};

/// Bootstrap phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PrepareStorage,
    InitStorageBackend,
    InitCore,
    InitSchemaSubsystem,
    InitPageSubsystem,
    InitModules,
    BridgeModules,
    SetLateRoutes,
    ServePages,
    FinalizeAssets,
    AfterInit,
    Go,
}

impl Phase {
    pub const ALL: [Phase; 12] = [
        Phase::PrepareStorage,
        Phase::InitStorageBackend,
        Phase::InitCore,
        Phase::InitSchemaSubsystem,
        Phase::InitPageSubsystem,
        Phase::InitModules,
        Phase::BridgeModules,
        Phase::SetLateRoutes,
        Phase::ServePages,
        Phase::FinalizeAssets,
        Phase::AfterInit,
        Phase::Go,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PrepareStorage => "prepare_storage",
            Phase::InitStorageBackend => "init_storage_backend",
            Phase::InitCore => "init_core",
            Phase::InitSchemaSubsystem => "init_schema_subsystem",
            Phase::InitPageSubsystem => "init_page_subsystem",
            Phase::InitModules => "init_modules",
            Phase::BridgeModules => "bridge_modules",
            Phase::SetLateRoutes => "set_late_routes",
            Phase::ServePages => "serve_pages",
            Phase::FinalizeAssets => "finalize_assets",
            Phase::AfterInit => "after_init",
            Phase::Go => "go",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the process was started to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Start the HTTP listener.
    Serve,
    /// Run a named task, then exit without listening.
    Task { name: String, args: Vec<String> },
    /// Write a new generation id, finalize assets, then exit.
    Generate,
}

impl Invocation {
    /// Interpret positional arguments: the first, if any, names a task.
    pub fn from_args(mut args: Vec<String>) -> Self {
        if args.is_empty() {
            return Invocation::Serve;
        }
        let name = args.remove(0);
        if name == GENERATION_TASK {
            Invocation::Generate
        } else {
            Invocation::Task { name, args }
        }
    }

    /// Whether the listener will not be started.
    pub fn is_task(&self) -> bool {
        !matches!(self, Invocation::Serve)
    }
}

/// Observer notified as each phase starts or is skipped.
pub type PhaseObserver = Arc<dyn Fn(Phase, PhaseEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Started,
    Skipped,
}

/// Builder for a site bootstrap.
pub struct Bootstrap {
    pub(crate) config: SiteConfig,
    pub(crate) invocation: Invocation,
    pub(crate) packages: Arc<dyn PackageSource>,
    pub(crate) locals: LocalIndex,
    pub(crate) core: Option<Arc<dyn CoreService>>,
    pub(crate) schemas: Option<Arc<dyn SchemaService>>,
    pub(crate) pages: Option<Arc<dyn PageService>>,
    pub(crate) mailer: Option<Arc<dyn Mailer>>,
    pub(crate) storage: Option<Arc<dyn FileStorage>>,
    pub(crate) locale: Option<Arc<dyn Localizer>>,
    pub(crate) overrides: HashMap<String, ServiceOverrides>,
    pub(crate) late_routes: Option<Hook>,
    pub(crate) before_end_assets: Option<Hook>,
    pub(crate) after_init: Option<Hook>,
    pub(crate) loaders: Vec<PageLoad>,
    pub(crate) not_found: Option<Arc<dyn NotFoundHandler>>,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) page_middleware: Vec<Middleware>,
    pub(crate) tasks: TaskRegistry,
    pub(crate) observer: Option<PhaseObserver>,
}

impl Bootstrap {
    pub fn new(config: SiteConfig, invocation: Invocation) -> Self {
        let loaders = config
            .pages
            .load
            .iter()
            .cloned()
            .map(PageLoad::Virtual)
            .collect();

        Self {
            config,
            invocation,
            packages: Arc::new(PackageCatalog::new()),
            locals: LocalIndex::new(),
            core: None,
            schemas: None,
            pages: None,
            mailer: None,
            storage: None,
            locale: None,
            overrides: HashMap::new(),
            late_routes: None,
            before_end_assets: None,
            after_init: None,
            loaders,
            not_found: None,
            middleware: Vec::new(),
            page_middleware: Vec::new(),
            tasks: TaskRegistry::new(),
            observer: None,
        }
    }

    /// Packages modules resolve against.
    pub fn packages(mut self, packages: impl PackageSource + 'static) -> Self {
        self.packages = Arc::new(packages);
        self
    }

    /// Register the application's own factory for local module `name`.
    pub fn local_index(mut self, name: impl Into<String>, factory: Factory) -> Self {
        self.locals.register(name, factory);
        self
    }

    pub fn core(mut self, core: Arc<dyn CoreService>) -> Self {
        self.core = Some(core);
        self
    }

    pub fn schemas(mut self, schemas: Arc<dyn SchemaService>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn pages(mut self, pages: Arc<dyn PageService>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn locale(mut self, locale: Arc<dyn Localizer>) -> Self {
        self.locale = Some(locale);
        self
    }

    /// Shared services module `name` receives instead of the site-wide ones.
    pub fn service_overrides(mut self, name: impl Into<String>, overrides: ServiceOverrides) -> Self {
        self.overrides.insert(name.into(), overrides);
        self
    }

    /// Routes registered here take precedence over the page wildcard.
    pub fn late_routes(mut self, hook: Hook) -> Self {
        self.late_routes = Some(hook);
        self
    }

    /// Runs after assets are pushed, before the bundle is written.
    pub fn before_end_assets(mut self, hook: Hook) -> Self {
        self.before_end_assets = Some(hook);
        self
    }

    /// Runs last, after everything else is initialized.
    pub fn after_init(mut self, hook: Hook) -> Self {
        self.after_init = Some(hook);
        self
    }

    /// Page-load hook run after every module's own loader.
    pub fn page_loader(mut self, loader: Arc<dyn PageLoader>) -> Self {
        self.loaders.push(PageLoad::Hook(loader));
        self
    }

    /// Fallback tried after every module's not-found handler.
    pub fn not_found(mut self, handler: Arc<dyn NotFoundHandler>) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Middleware run on every request, ahead of module middleware.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Middleware run only in front of the page handler.
    pub fn page_middleware(mut self, middleware: Middleware) -> Self {
        self.page_middleware.push(middleware);
        self
    }

    pub fn task(mut self, name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        self.tasks.register(name, task);
        self
    }

    /// Observe phase progress; used by the site's own diagnostics and tests.
    pub fn observe(mut self, observer: PhaseObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}
