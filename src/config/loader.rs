//! Load resource configs from JSON files and resolve them into model descriptors.

use crate::config::resolved::{
    FieldDescriptor, FieldType, IdType, ModelDescriptor, Operation, PageSettings, StorageTarget, Timestamps,
};
use crate::config::types::*;
use crate::config::{validate, validate_resource};
use crate::error::ConfigError;
use std::collections::HashSet;
use std::path::Path;

fn field_type(t: FieldTypeConfig) -> FieldType {
    match t {
        FieldTypeConfig::String => FieldType::String,
        FieldTypeConfig::Number => FieldType::Number,
        FieldTypeConfig::Boolean => FieldType::Boolean,
        FieldTypeConfig::Date => FieldType::Date,
        FieldTypeConfig::Identifier => FieldType::Identifier,
        FieldTypeConfig::Reference => FieldType::Reference,
    }
}

/// Build one descriptor (validates the resource first). `defaults` supplies page bounds the config does not override.
pub fn resolve(config: &ResourceConfig, defaults: &PageSettings) -> Result<ModelDescriptor, ConfigError> {
    validate_resource(config)?;

    let mut fields: Vec<FieldDescriptor> = config
        .fields
        .iter()
        .map(|f| FieldDescriptor {
            name: f.name.clone(),
            field_type: field_type(f.type_),
            filterable: f.filterable,
            sortable: f.sortable,
            searchable: f.searchable,
            column_type: f.column_type.clone(),
        })
        .collect();
    // An undeclared id field is filterable and sortable.
    if !fields.iter().any(|f| f.name == config.id_field) {
        fields.insert(
            0,
            FieldDescriptor {
                name: config.id_field.clone(),
                field_type: FieldType::Identifier,
                filterable: true,
                sortable: true,
                searchable: false,
                column_type: None,
            },
        );
    }

    let operations: HashSet<Operation> = match &config.operations {
        Some(ops) => ops
            .iter()
            .map(|o| o.parse::<Operation>())
            .collect::<Result<_, _>>()
            .map_err(|o| ConfigError::Validation(format!("resource {}: unknown operation '{}'", config.name, o)))?,
        None => Operation::ALL.into_iter().collect(),
    };

    let overrides = config.page.clone().unwrap_or_default();
    let max_limit = overrides.max_limit.unwrap_or(defaults.max_limit);
    let default_limit = overrides.default_limit.unwrap_or(defaults.default_limit).min(max_limit);

    let storage = config.storage.clone().unwrap_or_default();

    Ok(ModelDescriptor {
        name: config.name.clone(),
        path_segment: config.path_segment().to_string(),
        id_field: config.id_field.clone(),
        id_type: match config.id_type {
            IdTypeConfig::Uuid => IdType::Uuid,
            IdTypeConfig::Int => IdType::Int,
            IdTypeConfig::Text => IdType::Text,
        },
        fields,
        operations,
        sensitive_fields: config.sensitive_fields.iter().cloned().collect(),
        unique_fields: config.unique.clone(),
        timestamps: config
            .timestamps
            .as_ref()
            .map(|t| Timestamps {
                created: t.created.clone(),
                updated: t.updated.clone(),
            })
            .unwrap_or_default(),
        validation: config.validation.clone(),
        page: PageSettings {
            default_limit,
            max_limit,
        },
        storage: StorageTarget {
            schema: storage.schema,
            table: storage.table.unwrap_or_else(|| config.name.clone()),
        },
    })
}

/// Validate the whole set (including path uniqueness) and resolve every resource.
pub fn resolve_all(configs: &[ResourceConfig], defaults: &PageSettings) -> Result<Vec<ModelDescriptor>, ConfigError> {
    validate(configs)?;
    configs.iter().map(|c| resolve(c, defaults)).collect()
}

/// Parse one JSON document holding a resource or an array of resources.
pub fn parse_document(json: &str) -> Result<Vec<ResourceConfig>, ConfigError> {
    let doc: ConfigDocument = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(doc.into_resources())
}

/// Load resource configs from a JSON file, or from every `*.json` file in a directory (sorted by file name).
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    if meta.is_file() {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        return parse_document(&raw);
    }

    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let p = entry.path();
        if p.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(p);
        }
    }
    files.sort();

    let mut out = Vec::new();
    for file in files {
        let raw = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        let resources = parse_document(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        tracing::debug!(file = %file.display(), count = resources.len(), "loaded resource config");
        out.extend(resources);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLES: &str = r#"{
        "name": "articles",
        "id_type": "int",
        "fields": [
            {"name": "title", "type": "string", "filterable": true, "sortable": true, "searchable": true},
            {"name": "views", "type": "number", "filterable": true, "sortable": true}
        ],
        "operations": ["list", "read"],
        "page": {"max_limit": 50}
    }"#;

    #[test]
    fn resolves_defaults_and_overrides() {
        let configs = parse_document(ARTICLES).unwrap();
        let d = resolve(&configs[0], &PageSettings { default_limit: 80, max_limit: 500 }).unwrap();
        assert_eq!(d.path_segment, "articles");
        assert_eq!(d.id_type, IdType::Int);
        assert_eq!(d.fields[0].name, "id");
        assert!(d.fields[0].filterable && d.fields[0].sortable);
        assert_eq!(d.page, PageSettings { default_limit: 50, max_limit: 50 });
        assert!(d.allows(Operation::Get));
        assert!(!d.allows(Operation::Delete));
        assert_eq!(d.storage.table, "articles");
        assert_eq!(d.searchable_fields(), vec!["title".to_string()]);
    }

    #[test]
    fn array_documents_resolve_together() {
        let raw = format!("[{}]", ARTICLES);
        let configs = parse_document(&raw).unwrap();
        let all = resolve_all(&configs, &PageSettings::default()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(parse_document("{"), Err(ConfigError::Load(_))));
    }
}
