//! Default CMS core: template locals and the static asset bundle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use keystone_sdk::{AssetDeclaration, AssetKind, CoreInit, CoreService};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};

/// Default [`CoreService`].
///
/// Asset finalization concatenates every pushed stylesheet into
/// `public/assets/site-<generation>.css` and every script into
/// `public/assets/site-<generation>.js`, in push order.
#[derive(Default)]
pub struct BasicCore {
    init: RwLock<Option<CoreInit>>,
    assets: Mutex<Vec<AssetDeclaration>>,
}

impl BasicCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// File name of the bundle for `kind`.
    pub fn bundle_name(generation: Option<&str>, kind: AssetKind) -> String {
        match generation {
            Some(generation) => format!("site-{generation}.{}", kind.extension()),
            None => format!("site.{}", kind.extension()),
        }
    }

    /// Assets pushed so far.
    pub fn pushed_assets(&self) -> Vec<AssetDeclaration> {
        self.assets.lock().clone()
    }
}

#[async_trait]
impl CoreService for BasicCore {
    async fn init(&self, init: CoreInit) -> Result<()> {
        debug!(
            root = %init.root_dir.display(),
            prefix = %init.prefix,
            generation = ?init.generation,
            storage = init.storage.scheme(),
            "core initialized"
        );
        *self.init.write() = Some(init);
        Ok(())
    }

    fn locals(&self) -> Map<String, Value> {
        self.init
            .read()
            .as_ref()
            .map(|init| init.locals.clone())
            .unwrap_or_default()
    }

    fn push_asset(&self, asset: AssetDeclaration) {
        self.assets.lock().push(asset);
    }

    async fn end_assets(&self) -> Result<Vec<PathBuf>> {
        let (root_dir, generation) = {
            let guard = self.init.read();
            let init = guard
                .as_ref()
                .context("core must be initialized before assets are finalized")?;
            (init.root_dir.clone(), init.generation.clone())
        };
        let assets = self.pushed_assets();
        let out_dir = root_dir.join("public").join("assets");

        let mut written = Vec::new();
        for kind in [AssetKind::Stylesheet, AssetKind::Script] {
            let sources: Vec<_> = assets.iter().filter(|a| a.kind == kind).collect();
            if sources.is_empty() {
                continue;
            }

            let mut bundle = String::new();
            for asset in &sources {
                match &asset.inline {
                    Some(content) => bundle.push_str(content),
                    None => {
                        let path = asset.source_path();
                        let content = fs::read_to_string(&path).await.with_context(|| {
                            format!("asset '{}' not found at {}", asset.name, path.display())
                        })?;
                        bundle.push_str(&content);
                    }
                }
                if !bundle.ends_with('\n') {
                    bundle.push('\n');
                }
            }

            fs::create_dir_all(&out_dir)
                .await
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            let target = out_dir.join(Self::bundle_name(generation.as_deref(), kind));
            fs::write(&target, bundle)
                .await
                .with_context(|| format!("failed to write {}", target.display()))?;

            info!(bundle = %target.display(), files = sources.len(), "asset bundle written");
            written.push(target);
        }

        Ok(written)
    }
}

impl std::fmt::Debug for BasicCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCore")
            .field("initialized", &self.init.read().is_some())
            .field("assets", &self.assets.lock().len())
            .finish()
    }
}
