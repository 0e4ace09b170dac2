//! Keystone test utilities.
//!
//! Helpers for integration testing: a temporary site layout, valid base
//! configuration tables, and modules that record what the bootstrapper
//! did to them.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keystone_sdk::prelude::*;
use parking_lot::Mutex;
use tempfile::TempDir;

/// Admin password used by [`TempSite::config`].
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

/// A throwaway project root with the standard directory layout.
pub struct TempSite {
    dir: TempDir,
}

impl TempSite {
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        for sub in ["data", "public", "views/pages", "views/global", "lib/modules"] {
            std::fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create `lib/modules/<name>`, making `name` a local override.
    pub fn override_folder(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = self.path("lib/modules").join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// A valid base configuration rooted here, with no modules.
    pub fn config(&self) -> toml::Table {
        base_config(self.root())
    }
}

/// The minimal valid base configuration for a site rooted at `root`.
pub fn base_config(root: &Path) -> toml::Table {
    let mut table = toml::Table::new();
    let mut set = |key: &str, value: toml::Value| {
        table.insert(key.to_string(), value);
    };
    set("root", root.to_string_lossy().into_owned().into());
    set("short_name", "testsite".into());
    set("host_name", "test.example.com".into());
    set("admin_password", ADMIN_PASSWORD.into());
    set("session_secret", "not a very secret secret".into());
    set("compress", false.into());
    set("modules", toml::Value::Table(toml::Table::new()));
    table
}

/// Declare module `name` in `config`, in declaration order.
pub fn declare_module(config: &mut toml::Table, name: &str, options: toml::Table) {
    let modules = config
        .entry("modules")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if let toml::Value::Table(modules) = modules {
        modules.insert(name.to_string(), toml::Value::Table(options));
    }
}

/// Shared, ordered log of what happened to recording modules.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// How many recorded events start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

/// A module that records construction, bridging and page hooks.
pub struct RecordingModule {
    pub name: String,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub template_sources: Vec<TemplateSource>,
    pub browser: BrowserNaming,
    /// Peer names seen when bridged.
    pub peers: Mutex<Vec<String>>,
    recorder: Recorder,
}

impl RecordingModule {
    fn from_options(options: &ModuleOptions, recorder: &Recorder) -> Self {
        Self {
            name: options.name.clone(),
            config: options.config.clone(),
            template_sources: options.template_sources.clone(),
            browser: options.browser.clone(),
            peers: Mutex::new(Vec::new()),
            recorder: recorder.clone(),
        }
    }
}

impl SiteModule for RecordingModule {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bridge_receiver(&self) -> Option<&dyn BridgeReceiver> {
        Some(self)
    }
}

impl BridgeReceiver for RecordingModule {
    fn receive_bridge(&self, bridge: &Bridge) {
        self.recorder.record(format!("bridge:{}", self.name));
        *self.peers.lock() = bridge.names().map(str::to_string).collect();
    }
}

/// Immediate factory building [`RecordingModule`]s.
pub fn recording_factory(recorder: &Recorder) -> Factory {
    let recorder = recorder.clone();
    Factory::immediate(move |options: ModuleOptions| {
        recorder.record(format!("construct:{}", options.name));
        Ok(Some(
            Arc::new(RecordingModule::from_options(&options, &recorder)) as ModuleHandle,
        ))
    })
}

/// Deferred factory whose readiness is recorded separately.
pub fn deferred_recording_factory(recorder: &Recorder) -> Factory {
    let recorder = recorder.clone();
    Factory::deferred(move |options: ModuleOptions| {
        recorder.record(format!("construct:{}", options.name));
        let module = Arc::new(RecordingModule::from_options(&options, &recorder));
        let ready = recorder.clone();
        let name = options.name;
        Construction::pending(module, async move {
            ready.record(format!("ready:{name}"));
            Ok(())
        })
    })
}

/// Local factory that records itself, then delegates to its parent.
pub fn delegating_factory(recorder: &Recorder) -> Factory {
    let recorder = recorder.clone();
    Factory::deferred(move |options: ModuleOptions| {
        recorder.record(format!("local:{}", options.name));
        options.delegate()
    })
}

/// Factory that always fails with `message`, recording the attempt.
pub fn failing_factory(recorder: &Recorder, message: &'static str) -> Factory {
    let recorder = recorder.clone();
    Factory::immediate(move |options: ModuleOptions| {
        recorder.record(format!("construct:{}", options.name));
        Err(anyhow::anyhow!(message))
    })
}

/// Deferred factory whose instance never becomes ready: readiness fails
/// with `message`.
pub fn unready_factory(recorder: &Recorder, message: &'static str) -> Factory {
    let recorder = recorder.clone();
    Factory::deferred(move |options: ModuleOptions| {
        recorder.record(format!("construct:{}", options.name));
        let module = Arc::new(RecordingModule::from_options(&options, &recorder));
        Construction::pending(module, async move { Err(anyhow::anyhow!(message)) })
    })
}
