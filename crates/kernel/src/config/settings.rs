//! Resolved per-subsystem settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Storage backend name; only `local` is built in.
    pub backend: String,
    pub uploads_path: PathBuf,
    pub uploads_url: String,
    pub temp_path: PathBuf,
}

/// A named image size the storage layer renders uploads into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
        }
    }
}

/// Image sizes registered when the site does not supply its own list.
pub fn default_image_sizes() -> Vec<ImageSize> {
    vec![
        ImageSize::new("full", 1140, 1140),
        ImageSize::new("two-thirds", 760, 760),
        ImageSize::new("one-half", 570, 700),
        ImageSize::new("one-third", 380, 700),
        ImageSize::new("one-sixth", 190, 350),
    ]
}

/// How outgoing mail is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransport {
    /// Local `sendmail` binary (default).
    Sendmail { command: Option<String> },
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        /// `starttls` (default), `tls`, or `none`.
        encryption: String,
    },
    /// Messages are logged and dropped.
    Disabled,
}

/// Mail settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MailSettings {
    pub transport: MailTransport,
    pub from: String,
    /// Every mailer key other than the transport itself.
    pub extra: Map<String, Value>,
}

/// Internationalization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I18nSettings {
    pub locales: Vec<String>,
    pub default_locale: String,
    /// Cookie carrying the visitor's language choice.
    pub cookie: String,
    pub directory: PathBuf,
}

/// Session cookie attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub http_only: bool,
    pub secure: bool,
    /// Lifetime in seconds; `None` makes it a browser-session cookie.
    pub max_age: Option<i64>,
    pub path: String,
    /// `strict`, `lax` (default), or `none`.
    pub same_site: String,
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Session cookie name; distinguishes sites sharing a domain.
    pub key: String,
    /// Redis URL for a shared session store; in-memory when absent.
    pub store_url: Option<String>,
    pub cookie: CookieSettings,
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
}

/// Page subsystem settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PagesSettings {
    pub template_path: PathBuf,
    /// Extra virtual pages loaded for every request, after module loaders.
    pub load: Vec<String>,
    /// Remaining `[pages]` keys, passed through to the page service.
    pub options: Map<String, Value>,
}
