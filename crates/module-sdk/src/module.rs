//! The module instance contract and cross-module bridging.

use std::any::Any;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::asset::AssetDeclaration;
use crate::page::{Middleware, NotFoundHandler, PageLoader};

/// A constructed module, shared between the registry and anyone it bridges to.
pub type ModuleHandle = Arc<dyn SiteModule>;

/// A live module instance.
///
/// Every capability beyond [`as_any`](Self::as_any) is optional; the default
/// implementations report the capability as absent.
pub trait SiteModule: Send + Sync + 'static {
    /// Access to the concrete type, for modules that look each other up.
    fn as_any(&self) -> &dyn Any;

    /// Receiver for the full module map, delivered once after every module
    /// has been constructed.
    fn bridge_receiver(&self) -> Option<&dyn BridgeReceiver> {
        None
    }

    /// Hook run while resolving every page request.
    fn page_loader(&self) -> Option<Arc<dyn PageLoader>> {
        None
    }

    /// Hook given a chance to claim unmatched requests.
    fn not_found_handler(&self) -> Option<Arc<dyn NotFoundHandler>> {
        None
    }

    /// Middleware run on every request.
    fn middleware(&self) -> Vec<Middleware> {
        Vec::new()
    }

    /// Middleware run only in front of the page handler.
    fn page_middleware(&self) -> Vec<Middleware> {
        Vec::new()
    }

    /// Stylesheets and scripts this module adds to the site bundle.
    fn assets(&self) -> Vec<AssetDeclaration> {
        Vec::new()
    }
}

/// Capability of modules that want to see their peers.
pub trait BridgeReceiver: Send + Sync {
    fn receive_bridge(&self, bridge: &Bridge);
}

/// Name-ordered, non-owning view of every registered module.
///
/// Entries are weak so a module holding the bridge does not keep its peers
/// (or itself) alive past the registry that owns them.
#[derive(Clone, Default)]
pub struct Bridge {
    modules: IndexMap<String, Weak<dyn SiteModule>>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module under `name`, keeping insertion order.
    pub fn insert(&mut self, name: impl Into<String>, module: &ModuleHandle) {
        self.modules.insert(name.into(), Arc::downgrade(module));
    }

    /// Look up a peer by name.
    pub fn get(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.get(name).and_then(Weak::upgrade)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Module names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
