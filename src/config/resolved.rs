//! Resolved resource model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use std::collections::{HashMap, HashSet};

/// Semantic type of a field; drives query value coercion and input type checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Identifier,
    /// Identifier of another resource.
    Reference,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Identifier => "identifier",
            FieldType::Reference => "reference",
        }
    }
}

/// Primary key type for parsing path/body ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdType {
    Uuid,
    Int,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "list" => Ok(Operation::List),
            // "read" is the name older configs use for single fetch.
            "get" | "read" => Ok(Operation::Get),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// Pagination window bounds applied by the query compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSettings {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        PageSettings {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub filterable: bool,
    pub sortable: bool,
    pub searchable: bool,
    pub column_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageTarget {
    pub schema: Option<String>,
    pub table: String,
}

/// Static description of one resource. Built once at startup, shared read-only.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub name: String,
    pub path_segment: String,
    pub id_field: String,
    pub id_type: IdType,
    /// Declared fields in config order; always contains the id field.
    pub fields: Vec<FieldDescriptor>,
    pub operations: HashSet<Operation>,
    /// Field names to strip from all API responses.
    pub sensitive_fields: HashSet<String>,
    pub unique_fields: Vec<String>,
    pub timestamps: Timestamps,
    pub validation: HashMap<String, ValidationRule>,
    pub page: PageSettings,
    pub storage: StorageTarget,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn searchable_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.searchable)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Timestamp fields are stamped by storage and cannot be written through the API.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.timestamps.created.as_deref() == Some(name) || self.timestamps.updated.as_deref() == Some(name)
    }
}
