//! Compiler configuration and the per-organization value-table registry.
//!
//! ```toml
//! schema = "core"
//! ancestors = "recursive"
//!
//! [[value_tables]]
//! org_id = 1
//! table = "org_1_values"
//! ```

use std::collections::HashMap;
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::hierarchy::AncestorSource;
use crate::sql_common::DbSchema;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("could not read config file `{path}`")]
    #[diagnostic(code(dqql::config::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config")]
    #[diagnostic(code(dqql::config::toml))]
    Toml(#[from] toml::de::Error),
    #[error("organization {0} is registered twice")]
    #[diagnostic(code(dqql::config::duplicate_organization))]
    DuplicateOrganization(i64),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Describes the physical value table holding one organization's data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueTable {
    pub name: SmolStr,
}

impl ValueTable {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        ValueTable { name: name.into() }
    }

    /// The conventional table of an organization, `org_<id>_values`
    pub fn for_org(org_id: i64) -> Self {
        ValueTable::new(format!("org_{org_id}_values"))
    }
}

/// Organization id to value table. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueTableRegistry {
    tables: HashMap<i64, ValueTable>,
}

impl ValueTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, org_id: i64, table: ValueTable) -> Result<()> {
        if self.tables.contains_key(&org_id) {
            return Err(ConfigError::DuplicateOrganization(org_id));
        }
        self.tables.insert(org_id, table);
        Ok(())
    }

    pub fn get(&self, org_id: i64) -> Option<&ValueTable> {
        self.tables.get(&org_id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    schema: DbSchema,
    #[serde(default)]
    ancestors: AncestorSource,
    #[serde(default)]
    value_tables: Vec<RawValueTable>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawValueTable {
    org_id: i64,
    table: SmolStr,
}

/// Everything a compilation needs that does not come with the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerConfig {
    pub schema: DbSchema,
    pub ancestors: AncestorSource,
    pub registry: ValueTableRegistry,
}

impl CompilerConfig {
    pub fn new(schema: DbSchema, ancestors: AncestorSource, registry: ValueTableRegistry) -> Self {
        CompilerConfig { schema, ancestors, registry }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;
        let mut registry = ValueTableRegistry::new();
        for entry in raw.value_tables {
            registry.register(entry.org_id, ValueTable::new(entry.table))?;
        }
        Ok(CompilerConfig { schema: raw.schema, ancestors: raw.ancestors, registry })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            schema = %config.schema,
            organizations = config.registry.len(),
            "loaded compiler config"
        );
        Ok(config)
    }
}
