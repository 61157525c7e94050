//! Raw resource config types matching the JSON documents under `CONFIG_PATH`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field type as written in config (`"string"`, `"number"`, `"boolean"`, `"date"`, `"identifier"`, `"reference"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTypeConfig {
    String,
    Number,
    Boolean,
    Date,
    Identifier,
    Reference,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdTypeConfig {
    #[default]
    Uuid,
    Int,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldTypeConfig,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub searchable: bool,
    /// PostgreSQL column type used as a cast on writes (e.g. `uuid`, `jsonb`, `numeric(10,2)`).
    #[serde(default)]
    pub column_type: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Names of the fields the storage layer stamps on insert/update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimestampsConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// Per-resource override of the process-wide page settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default)]
    pub default_limit: Option<u64>,
    #[serde(default)]
    pub max_limit: Option<u64>,
}

/// Where a resource lives when backed by PostgreSQL. Table defaults to the resource name.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Base path segment; defaults to `name`.
    #[serde(default)]
    pub path_segment: Option<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub id_type: IdTypeConfig,
    pub fields: Vec<FieldConfig>,
    /// Enabled operations. Missing means all five.
    #[serde(default)]
    pub operations: Option<Vec<String>>,
    /// Fields that must never be exposed in API responses (e.g. password hashes, secrets).
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub timestamps: Option<TimestampsConfig>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub page: Option<PageConfig>,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl ResourceConfig {
    pub fn path_segment(&self) -> &str {
        self.path_segment.as_deref().unwrap_or(&self.name)
    }
}

/// A config file holds either one resource or an array of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ConfigDocument {
    Many(Vec<ResourceConfig>),
    One(Box<ResourceConfig>),
}

impl ConfigDocument {
    pub fn into_resources(self) -> Vec<ResourceConfig> {
        match self {
            ConfigDocument::Many(v) => v,
            ConfigDocument::One(r) => vec![*r],
        }
    }
}
