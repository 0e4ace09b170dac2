//! Module declarations parsed from the `[modules]` table.

use keystone_sdk::BrowserNaming;
use serde_json::{Map, Value};

use crate::config::to_json_map;
use crate::error::ConfigError;

/// One entry of the `[modules]` table.
///
/// Table order is construction order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDeclaration {
    pub name: String,
    /// Package this module overrides; the module's own name when unset.
    pub extend: Option<String>,
    /// Declared options, minus the keys consumed by the bootstrapper.
    pub options: Map<String, Value>,
    /// Explicit client-side names; derived when unset.
    pub browser: BrowserNaming,
}

impl ModuleDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extend: None,
            options: Map::new(),
            browser: BrowserNaming::default(),
        }
    }

    /// Parse the `[modules]` value, keeping declaration order.
    pub fn parse_all(value: Option<toml::Value>) -> Result<Vec<Self>, ConfigError> {
        let table = match value {
            None => return Ok(Vec::new()),
            Some(toml::Value::Table(table)) => table,
            Some(_) => return Err(ConfigError::ModulesNotTable),
        };

        let mut declarations = Vec::with_capacity(table.len());
        for (name, entry) in table {
            validate_name(&name)?;
            let mut entry = match entry {
                toml::Value::Table(entry) => entry,
                _ => {
                    return Err(ConfigError::Malformed {
                        field: format!("modules.{name}"),
                        details: "module options must be a table; use `{}` for none".to_string(),
                    });
                }
            };

            let extend = match entry.remove("extend") {
                Some(toml::Value::String(target)) => {
                    validate_name(&target)?;
                    Some(target)
                }
                Some(_) => {
                    return Err(ConfigError::Malformed {
                        field: format!("modules.{name}.extend"),
                        details: "must be a package name".to_string(),
                    });
                }
                None => None,
            };

            let browser = match entry.remove("browser") {
                Some(value) => value
                    .try_into::<BrowserNaming>()
                    .map_err(|e| ConfigError::Malformed {
                        field: format!("modules.{name}.browser"),
                        details: e.message().to_string(),
                    })?,
                None => BrowserNaming::default(),
            };

            declarations.push(Self {
                name,
                extend,
                options: to_json_map(entry),
                browser,
            });
        }

        Ok(declarations)
    }
}

/// Module names double as directory names under `lib/modules`.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.is_empty() {
        Some("name cannot be empty")
    } else if name.contains('/') || name.contains('\\') || name.contains("..") {
        Some("name cannot contain path separators")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        Some("use lowercase letters, digits, '-' and '_'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidModuleName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
