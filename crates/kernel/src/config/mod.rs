//! Site configuration.
//!
//! Layers, lowest priority first:
//!
//! 1. built-in defaults computed from the project root,
//! 2. the caller's base configuration (usually `site.toml`),
//! 3. optional local overrides (`<root>/data/local.toml`), deep-merged.
//!
//! Required settings are checked before anything touches the filesystem
//! beyond reading the override file.

mod merge;
mod settings;

use std::env;
use std::path::{Path, PathBuf};

use keystone_sdk::AssetDeclaration;
use keystone_sdk::AssetKind;
use serde::Deserialize;
use serde_json::{Map, Value};
use toml::Table;

pub use merge::{deep_merge, deep_merge_json, set_default, to_json_map};
pub use settings::{
    CookieSettings, DbSettings, I18nSettings, ImageSize, MailSettings, MailTransport,
    PagesSettings, SessionSettings, UploadSettings, default_image_sizes,
};

use crate::error::ConfigError;
use crate::generation;
use crate::module::ModuleDeclaration;

/// Where local overrides come from.
#[derive(Debug, Clone, Default)]
pub enum OverrideSource {
    /// `<root>/data/local.toml`, if it exists.
    #[default]
    ProjectFile,
    /// A specific file, if it exists.
    File(PathBuf),
    /// An already-parsed table.
    Inline(Table),
    None,
}

/// Fully resolved site configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub root_dir: PathBuf,
    pub short_name: String,
    pub host_name: String,
    pub admin_password: String,
    pub session_secret: String,
    pub title: Option<String>,
    /// URL prefix the whole site is mounted under; empty for none.
    pub prefix: String,
    pub base_url: Option<String>,
    pub absolute_urls: bool,
    pub minify: bool,
    pub compress: bool,
    pub address: String,
    pub port: u16,
    pub second_chance_login: bool,
    /// Template locals visible on every page.
    pub locals: Map<String, Value>,
    pub uploads: UploadSettings,
    pub image_sizes: Vec<ImageSize>,
    pub mailer: MailSettings,
    pub i18n: I18nSettings,
    pub session: SessionSettings,
    pub db: Option<DbSettings>,
    /// Pass-through settings for the core service.
    pub core: Map<String, Value>,
    /// Pass-through settings for the schema service.
    pub schemas: Map<String, Value>,
    pub pages: PagesSettings,
    pub assets: Vec<AssetDeclaration>,
    /// Declared modules, in declaration order.
    pub modules: Vec<ModuleDeclaration>,
    /// Directories searched for local module override folders.
    pub module_roots: Vec<PathBuf>,
    /// Deployment-wide asset generation id.
    pub generation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    root: Option<String>,
    short_name: Option<String>,
    host_name: Option<String>,
    admin_password: Option<String>,
    session_secret: Option<String>,
    title: Option<String>,
    prefix: Option<String>,
    base_url: Option<String>,
    absolute_urls: bool,
    minify: bool,
    compress: Option<bool>,
    address: Option<String>,
    port: Option<u16>,
    uploads_url: Option<String>,
    second_chance_login: bool,
    image_sizes: Option<Vec<ImageSize>>,
    add_image_sizes: Vec<ImageSize>,
    locals: Table,
    uploads: RawUploads,
    mailer: Table,
    i18n: RawI18n,
    session: RawSession,
    db: Option<RawDb>,
    core: Table,
    schemas: Table,
    pages: Table,
    assets: RawAssets,
    modules: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUploads {
    backend: Option<String>,
    uploads_path: Option<PathBuf>,
    uploads_url: Option<String>,
    temp_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawI18n {
    locales: Option<Vec<String>>,
    default_locale: Option<String>,
    cookie: Option<String>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSession {
    key: Option<String>,
    store_url: Option<String>,
    cookie: RawCookie,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCookie {
    http_only: Option<bool>,
    secure: Option<bool>,
    max_age: Option<i64>,
    path: Option<String>,
    same_site: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDb {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAssets {
    stylesheets: Vec<RawAsset>,
    scripts: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAsset {
    Name(String),
    Full {
        name: String,
        fs: Option<PathBuf>,
        web: Option<String>,
        when: Option<String>,
    },
}

impl SiteConfig {
    /// Resolve `base` plus local overrides into an effective configuration.
    pub fn resolve(base: Table, overrides: OverrideSource) -> Result<Self, ConfigError> {
        let root = match base.get("root").and_then(toml::Value::as_str) {
            Some(root) if !root.trim().is_empty() => PathBuf::from(root),
            _ => {
                return Err(ConfigError::Missing {
                    field: "root",
                    hint: "set it to the directory containing your project",
                });
            }
        };

        let mut merged = base;
        if let Some(local) = read_overrides(&overrides, &root)? {
            deep_merge(&mut merged, local);
        }

        let raw: RawConfig =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::Malformed {
                    field: "site configuration".to_string(),
                    details: e.message().to_string(),
                })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let root_dir = PathBuf::from(required(
            raw.root,
            "root",
            "set it to the directory containing your project",
        )?);
        let short_name = required(
            raw.short_name,
            "short_name",
            "set it to the name of your project's repository or folder",
        )?;
        let host_name = required(
            raw.host_name,
            "host_name",
            "set it to the preferred hostname of your site, such as mycompany.com",
        )?;
        let admin_password = required(
            raw.admin_password,
            "admin_password",
            "set it to a secure password for admin access; this account is always valid \
             in addition to accounts in the database",
        )?;
        let session_secret = required(
            raw.session_secret,
            "session_secret",
            "this should be a secure password not used for any other purpose",
        )?;

        let prefix = normalize_prefix(raw.prefix.as_deref().unwrap_or(""));
        let base_url = raw.base_url.or_else(|| Some(format!("http://{host_name}")));

        let uploads = resolve_uploads(
            raw.uploads,
            raw.uploads_url,
            &root_dir,
            &prefix,
            raw.absolute_urls.then_some(base_url.as_deref()).flatten(),
        )?;

        let mut image_sizes = raw.image_sizes.unwrap_or_else(default_image_sizes);
        image_sizes.extend(raw.add_image_sizes);

        let mut locals = to_json_map(raw.locals);
        if let Some(title) = &raw.title {
            set_default(&mut locals, "site_title", title.clone());
        }
        set_default(&mut locals, "short_name", short_name.clone());
        set_default(&mut locals, "host_name", host_name.clone());

        let mailer = resolve_mailer(raw.mailer, &host_name)?;
        let i18n = resolve_i18n(raw.i18n, &root_dir)?;
        let session = resolve_session(raw.session, &short_name, &prefix);
        let db = raw.db.map(|db| resolve_db(db, &short_name));

        let mut pages_table = raw.pages;
        let template_path = match pages_table.remove("template_path") {
            Some(toml::Value::String(path)) => PathBuf::from(path),
            _ => root_dir.join("views").join("pages"),
        };
        let load = match pages_table.remove("load") {
            Some(value) => value
                .try_into::<Vec<String>>()
                .map_err(|e| ConfigError::Malformed {
                    field: "pages.load".to_string(),
                    details: e.message().to_string(),
                })?,
            None => Vec::new(),
        };

        let mut assets = Vec::new();
        for (kind, entries) in [
            (AssetKind::Stylesheet, raw.assets.stylesheets),
            (AssetKind::Script, raw.assets.scripts),
        ] {
            assets.extend(entries.into_iter().map(|a| a.into_declaration(kind, &root_dir)));
        }

        let modules = ModuleDeclaration::parse_all(raw.modules)?;
        let module_roots = vec![root_dir.join("lib").join("modules")];
        let generation = generation::read(&root_dir);

        Ok(Self {
            short_name,
            host_name,
            admin_password,
            session_secret,
            title: raw.title,
            prefix,
            base_url,
            absolute_urls: raw.absolute_urls,
            minify: raw.minify,
            compress: raw.compress.unwrap_or(true),
            address: raw.address.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: raw.port.unwrap_or(3000),
            second_chance_login: raw.second_chance_login,
            locals,
            uploads,
            image_sizes,
            mailer,
            i18n,
            session,
            db,
            core: to_json_map(raw.core),
            schemas: to_json_map(raw.schemas),
            pages: PagesSettings {
                template_path,
                load,
                options: to_json_map(pages_table),
            },
            assets,
            modules,
            module_roots,
            generation,
            root_dir,
        })
    }

    /// Apply `PORT` and `ADDRESS` from the environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("PORT") {
            self.port = port.parse().map_err(|_| ConfigError::Malformed {
                field: "PORT".to_string(),
                details: "must be a valid u16".to_string(),
            })?;
        }
        if let Ok(address) = env::var("ADDRESS") {
            self.address = address;
        }
        Ok(())
    }

    /// `<root>/data`
    pub fn data_dir(&self) -> PathBuf {
        self.root_dir.join("data")
    }

    /// `<root>/public`
    pub fn public_dir(&self) -> PathBuf {
        self.root_dir.join("public")
    }

    /// Override folder for a built-in subsystem, e.g. `keystone-pages`.
    pub fn subsystem_override_dir(&self, subsystem: &str) -> PathBuf {
        self.root_dir.join("lib").join("modules").join(subsystem)
    }
}

impl RawAsset {
    fn into_declaration(self, kind: AssetKind, root: &Path) -> AssetDeclaration {
        match self {
            RawAsset::Name(name) => AssetDeclaration::new(kind, name, root),
            RawAsset::Full { name, fs, web, when } => AssetDeclaration {
                kind,
                name,
                fs: fs.unwrap_or_else(|| root.to_path_buf()),
                web: web.unwrap_or_default(),
                when: when.unwrap_or_else(|| "always".to_string()),
                inline: None,
            },
        }
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    hint: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing { field, hint }),
    }
}

fn read_overrides(source: &OverrideSource, root: &Path) -> Result<Option<Table>, ConfigError> {
    let path = match source {
        OverrideSource::None => return Ok(None),
        OverrideSource::Inline(table) => return Ok(Some(table.clone())),
        OverrideSource::ProjectFile => root.join("data").join("local.toml"),
        OverrideSource::File(path) => path.clone(),
    };

    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    let table = content
        .parse::<Table>()
        .map_err(|e| ConfigError::Malformed {
            field: path.display().to_string(),
            details: e.message().to_string(),
        })?;
    Ok(Some(table))
}

/// `"blog/"` → `"/blog"`, `"/"` → `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn resolve_uploads(
    raw: RawUploads,
    legacy_url: Option<String>,
    root: &Path,
    prefix: &str,
    absolute_base: Option<&str>,
) -> Result<UploadSettings, ConfigError> {
    let backend = raw.backend.unwrap_or_else(|| "local".to_string());
    if backend != "local" {
        return Err(ConfigError::Malformed {
            field: "uploads.backend".to_string(),
            details: format!("unsupported storage backend '{backend}'; only 'local' is built in"),
        });
    }

    let default_url = match absolute_base {
        Some(base) => format!("{}{prefix}/uploads", base.trim_end_matches('/')),
        None => format!("{prefix}/uploads"),
    };

    Ok(UploadSettings {
        backend,
        uploads_path: raw
            .uploads_path
            .unwrap_or_else(|| root.join("public").join("uploads")),
        uploads_url: legacy_url.or(raw.uploads_url).unwrap_or(default_url),
        temp_path: raw
            .temp_path
            .unwrap_or_else(|| root.join("data").join("temp").join("uploads")),
    })
}

fn resolve_mailer(mut raw: Table, host_name: &str) -> Result<MailSettings, ConfigError> {
    let transport_name = match raw.remove("transport") {
        Some(toml::Value::String(name)) => name.to_lowercase(),
        Some(_) => {
            return Err(ConfigError::Malformed {
                field: "mailer.transport".to_string(),
                details: "must be a string".to_string(),
            });
        }
        None => "sendmail".to_string(),
    };
    let options = match raw.remove("transport_options") {
        Some(toml::Value::Table(t)) => t,
        _ => Table::new(),
    };
    let opt_str = |key: &str| options.get(key).and_then(toml::Value::as_str).map(String::from);

    let transport = match transport_name.as_str() {
        "sendmail" => MailTransport::Sendmail {
            command: opt_str("command"),
        },
        "smtp" => {
            let host = opt_str("host").ok_or_else(|| ConfigError::Malformed {
                field: "mailer.transport_options.host".to_string(),
                details: "required when transport is 'smtp'".to_string(),
            })?;
            let port = match options.get("port").and_then(toml::Value::as_integer) {
                Some(p) => u16::try_from(p).map_err(|_| ConfigError::Malformed {
                    field: "mailer.transport_options.port".to_string(),
                    details: "must be a valid u16".to_string(),
                })?,
                None => 587,
            };
            MailTransport::Smtp {
                host,
                port,
                username: opt_str("username"),
                password: opt_str("password"),
                encryption: opt_str("encryption")
                    .map(|e| e.to_lowercase())
                    .unwrap_or_else(|| "starttls".to_string()),
            }
        }
        "disabled" | "none" => MailTransport::Disabled,
        other => {
            return Err(ConfigError::Malformed {
                field: "mailer.transport".to_string(),
                details: format!("unknown transport '{other}'; use sendmail, smtp or disabled"),
            });
        }
    };

    let extra = to_json_map(raw);
    let from = extra
        .get("from")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| format!("noreply@{host_name}"));

    Ok(MailSettings {
        transport,
        from,
        extra,
    })
}

fn resolve_i18n(raw: RawI18n, root: &Path) -> Result<I18nSettings, ConfigError> {
    let locales = raw
        .locales
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| vec!["en".to_string()]);
    let default_locale = match raw.default_locale {
        Some(locale) if !locales.contains(&locale) => {
            return Err(ConfigError::Malformed {
                field: "i18n.default_locale".to_string(),
                details: format!(
                    "'{locale}' is not one of the configured locales ({})",
                    locales.join(", ")
                ),
            });
        }
        Some(locale) => locale,
        None => locales[0].clone(),
    };
    Ok(I18nSettings {
        locales,
        default_locale,
        cookie: raw.cookie.unwrap_or_else(|| "site_language".to_string()),
        directory: raw.directory.unwrap_or_else(|| root.join("locales")),
    })
}

fn resolve_session(raw: RawSession, short_name: &str, prefix: &str) -> SessionSettings {
    let cookie_path = if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.to_string()
    };
    SessionSettings {
        key: raw.key.unwrap_or_else(|| format!("{short_name}.sid")),
        store_url: raw.store_url,
        cookie: CookieSettings {
            http_only: raw.cookie.http_only.unwrap_or(true),
            secure: raw.cookie.secure.unwrap_or(false),
            max_age: raw.cookie.max_age,
            path: raw.cookie.path.unwrap_or(cookie_path),
            same_site: raw
                .cookie
                .same_site
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "lax".to_string()),
        },
    }
}

fn resolve_db(raw: RawDb, short_name: &str) -> DbSettings {
    DbSettings {
        url: raw.url,
        host: raw.host.unwrap_or_else(|| "localhost".to_string()),
        port: raw.port.unwrap_or(5432),
        name: raw.name.unwrap_or_else(|| short_name.to_string()),
        user: raw.user,
        password: raw.password,
        max_connections: raw.max_connections.unwrap_or(10),
    }
}
