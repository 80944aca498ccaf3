//! Schema validation seam.
//!
//! The store never evaluates JSON Schema itself; it hands `(document, schema id)`
//! to a [`SchemaValidator`] and acts on the returned violations. The default
//! implementation compiles the schema documents embedded in this crate.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::StoreError;

pub const CARDS_CONFIG_SCHEMA: &str = "cardsconfig-schema";
pub const CARD_TYPE_SCHEMA: &str = "cardtype-schema";
pub const FIELD_TYPE_SCHEMA: &str = "fieldtype-schema";
pub const LINK_TYPE_SCHEMA: &str = "linktype-schema";
pub const WORKFLOW_SCHEMA: &str = "workflow-schema";
pub const TEMPLATE_SCHEMA: &str = "template-schema";
pub const CARD_BASE_SCHEMA: &str = "card-base-schema";

const EMBEDDED_SCHEMAS: [(&str, &str); 7] = [
    (
        CARDS_CONFIG_SCHEMA,
        include_str!("../schemas/cardsconfig.schema.json"),
    ),
    (
        CARD_TYPE_SCHEMA,
        include_str!("../schemas/cardtype.schema.json"),
    ),
    (
        FIELD_TYPE_SCHEMA,
        include_str!("../schemas/fieldtype.schema.json"),
    ),
    (
        LINK_TYPE_SCHEMA,
        include_str!("../schemas/linktype.schema.json"),
    ),
    (
        WORKFLOW_SCHEMA,
        include_str!("../schemas/workflow.schema.json"),
    ),
    (
        TEMPLATE_SCHEMA,
        include_str!("../schemas/template.schema.json"),
    ),
    (
        CARD_BASE_SCHEMA,
        include_str!("../schemas/card-base.schema.json"),
    ),
];

/// Black-box validator invoked by the store.
pub trait SchemaValidator: Send + Sync {
    /// Returns the list of violations for `document`; empty means valid.
    fn validate(&self, document: &Value, schema_id: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the raw schema document registered under `schema_id`.
    fn schema_document(&self, schema_id: &str) -> Option<Value>;
}

impl<T> SchemaValidator for Arc<T>
where
    T: SchemaValidator + ?Sized,
{
    fn validate(&self, document: &Value, schema_id: &str) -> Result<Vec<String>, StoreError> {
        (**self).validate(document, schema_id)
    }

    fn schema_document(&self, schema_id: &str) -> Option<Value> {
        (**self).schema_document(schema_id)
    }
}

/// Draft 7 validator over the schemas shipped with the crate.
pub struct JsonSchemaValidator {
    documents: HashMap<&'static str, Value>,
    compiled: HashMap<&'static str, JSONSchema>,
}

impl JsonSchemaValidator {
    pub fn new() -> Result<Self, StoreError> {
        let mut documents = HashMap::new();
        let mut compiled = HashMap::new();
        for (id, raw) in EMBEDDED_SCHEMAS {
            let document: Value = serde_json::from_str(raw)
                .map_err(|err| StoreError::Serialization(format!("schema {id}: {err}")))?;
            let schema = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&document)
                .map_err(|err| {
                    StoreError::Serialization(format!("failed to compile schema {id}: {err}"))
                })?;
            compiled.insert(id, schema);
            documents.insert(id, document);
        }
        Ok(Self {
            documents,
            compiled,
        })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value, schema_id: &str) -> Result<Vec<String>, StoreError> {
        let schema = self
            .compiled
            .get(schema_id)
            .ok_or_else(|| StoreError::NotFound(format!("schema '{schema_id}'")))?;

        let violations = match schema.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    let path = if path.is_empty() { "root".to_string() } else { path };
                    format!("{err} at '{path}'")
                })
                .collect(),
        };

        tracing::trace!(schema = schema_id, violations = violations.len(), "validated document");
        Ok(violations)
    }

    fn schema_document(&self, schema_id: &str) -> Option<Value> {
        self.documents.get(schema_id).cloned()
    }
}

/// Fails with [`StoreError::SchemaViolation`] when `document` does not conform.
pub fn ensure_valid(
    validator: &dyn SchemaValidator,
    document: &Value,
    schema_id: &str,
) -> Result<(), StoreError> {
    let violations = validator.validate(document, schema_id)?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaViolation {
            schema: schema_id.to_string(),
            violations,
        })
    }
}

/// Field data types accepted by the field-type schema.
///
/// Read from the schema's `dataType` pattern on every call so the store and
/// the schema document cannot drift apart.
pub fn supported_field_data_types(
    validator: &dyn SchemaValidator,
) -> Result<Vec<String>, StoreError> {
    let document = validator
        .schema_document(FIELD_TYPE_SCHEMA)
        .ok_or_else(|| StoreError::NotFound(format!("schema '{FIELD_TYPE_SCHEMA}'")))?;
    let pattern = document
        .pointer("/properties/dataType/pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            StoreError::Serialization(format!(
                "schema '{FIELD_TYPE_SCHEMA}' declares no dataType pattern"
            ))
        })?;
    parse_alternation(pattern)
}

/// Splits an anchored alternation such as `^(a|b|c)$` into its members.
fn parse_alternation(pattern: &str) -> Result<Vec<String>, StoreError> {
    let inner = pattern
        .strip_prefix("^(")
        .and_then(|rest| rest.strip_suffix(")$"))
        .ok_or_else(|| {
            StoreError::Serialization(format!("unsupported dataType pattern '{pattern}'"))
        })?;
    Ok(inner
        .split('|')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}
