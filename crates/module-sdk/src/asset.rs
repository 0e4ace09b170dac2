//! Static asset declarations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of static asset pushed into the site bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stylesheet,
    Script,
}

impl AssetKind {
    /// Subdirectory under `<fs>/public` holding assets of this kind.
    pub fn dir(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "css",
            AssetKind::Script => "js",
        }
    }

    /// File extension of assets of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "css",
            AssetKind::Script => "js",
        }
    }
}

/// A single stylesheet or script registered for the site bundle.
///
/// The file is expected at `<fs>/public/<kind dir>/<name>.<ext>` and is
/// served at `<web>/<kind dir>/<name>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDeclaration {
    pub kind: AssetKind,
    pub name: String,
    pub fs: PathBuf,
    #[serde(default)]
    pub web: String,
    /// Audience: `always`, `user` or `anon`.
    #[serde(default = "default_when")]
    pub when: String,
    /// Contents shipped with the declaring crate, used instead of reading
    /// [`source_path`](Self::source_path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
}

fn default_when() -> String {
    "always".to_string()
}

impl AssetDeclaration {
    /// Create a declaration visible to everyone.
    pub fn new(kind: AssetKind, name: impl Into<String>, fs: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
            fs: fs.into(),
            web: String::new(),
            when: default_when(),
            inline: None,
        }
    }

    /// A declaration whose contents are compiled in rather than read from disk.
    pub fn embedded(kind: AssetKind, name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            inline: Some(contents.into()),
            ..Self::new(kind, name, PathBuf::new())
        }
    }

    /// Path of the source file on disk.
    pub fn source_path(&self) -> PathBuf {
        self.fs
            .join("public")
            .join(self.kind.dir())
            .join(format!("{}.{}", self.name, self.kind.extension()))
    }

    /// Public URL of the unbundled file.
    pub fn web_path(&self) -> String {
        format!(
            "{}/{}/{}.{}",
            self.web.trim_end_matches('/'),
            self.kind.dir(),
            self.name,
            self.kind.extension()
        )
    }
}
