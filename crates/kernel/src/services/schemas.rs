//! Default schema service: the set of known field types.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashSet;
use keystone_sdk::{PageService, SchemaInit, SchemaService};
use tracing::debug;

const BUILTIN_FIELD_TYPES: &[&str] = &[
    "string", "slug", "boolean", "integer", "float", "select", "date", "time", "url", "area",
    "singleton", "array", "join",
];

/// Default [`SchemaService`].
///
/// Sites add field types with `[schemas] add_field_types = [..]`. The
/// `page` field type becomes available once the page service is linked.
#[derive(Default)]
pub struct BasicSchemas {
    field_types: DashSet<String>,
}

impl BasicSchemas {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaService for BasicSchemas {
    async fn init(&self, init: SchemaInit) -> Result<()> {
        for name in BUILTIN_FIELD_TYPES {
            self.field_types.insert((*name).to_string());
        }
        if let Some(extra) = init.options.get("add_field_types").and_then(|v| v.as_array()) {
            for name in extra.iter().filter_map(|v| v.as_str()) {
                self.field_types.insert(name.to_string());
            }
        }
        debug!(
            field_types = self.field_types.len(),
            overrides = init.template_sources.len(),
            "schemas initialized"
        );
        Ok(())
    }

    fn set_pages(&self, _pages: Arc<dyn PageService>) {
        self.field_types.insert("page".to_string());
    }

    fn has_field_type(&self, name: &str) -> bool {
        self.field_types.contains(name)
    }
}
