//! Index schemas and persistable items
//!
//! A schema is identified by `index.mapping`. Schemas are registered
//! explicitly together with the constructor that turns a relation record
//! into a document for that schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use srlx_core::{RelationRecord, Result, SrlxError};

/// Field holding the creation timestamp of every document
pub const CREATED_AT_FIELD: &str = "createdAt";

// ============================================================================
// Schema identifiers and mappings
// ============================================================================

/// Schema identifier, displayed as `index.mapping`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId {
    pub index: String,
    pub mapping: String,
}

impl SchemaId {
    pub fn new(index: impl Into<String>, mapping: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            mapping: mapping.into(),
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.mapping)
    }
}

impl FromStr for SchemaId {
    type Err = SrlxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((index, mapping)) if !index.is_empty() && !mapping.is_empty() => {
                Ok(Self::new(index, mapping))
            }
            _ => Err(SrlxError::ConfigError(format!(
                "Invalid schema identifier '{s}', expected index.mapping"
            ))),
        }
    }
}

/// Index field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Keyword,
    Date,
}

/// Mapping of one document field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    pub field_type: FieldType,
    pub analyzer: Option<String>,
}

impl FieldMapping {
    /// Full-text field with the given analyzer
    pub fn analyzed(name: impl Into<String>, analyzer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            analyzer: Some(analyzer.into()),
        }
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Keyword,
            analyzer: None,
        }
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Date,
            analyzer: None,
        }
    }
}

/// Document model of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub id: SchemaId,
    pub fields: Vec<FieldMapping>,
}

impl ModelSchema {
    pub fn new(id: SchemaId, fields: Vec<FieldMapping>) -> Self {
        Self { id, fields }
    }

    /// Index mappings in Elasticsearch form: `{"properties": {...}}`
    pub fn mappings(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                let mut property = json!({ "type": field.field_type });
                if let Some(analyzer) = &field.analyzer {
                    property["analyzer"] = json!(analyzer);
                }
                (field.name.clone(), property)
            })
            .collect();

        json!({ "properties": properties })
    }
}

// ============================================================================
// Persistable items
// ============================================================================

/// A document ready to be saved into the index of its schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistableItem {
    pub schema: SchemaId,
    pub id: Uuid,
    pub body: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PersistableItem {
    /// Create an empty document for a schema
    pub fn new(schema: SchemaId) -> Self {
        Self {
            schema,
            id: Uuid::new_v4(),
            body: Map::new(),
            created_at: None,
        }
    }

    /// Set a document field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(name.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the creation timestamp unless one is already present
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
    }

    /// Document body including `createdAt`
    pub fn document(&self) -> Value {
        let mut body = self.body.clone();
        if let Some(created_at) = self.created_at {
            body.insert(CREATED_AT_FIELD.to_string(), json!(created_at.to_rfc3339()));
        }
        Value::Object(body)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Builds the document for a record under a schema
pub type ItemConstructor = fn(&ModelSchema, &RelationRecord, DateTime<Utc>) -> PersistableItem;

/// A schema together with its item constructor
#[derive(Clone)]
pub struct RegisteredSchema {
    schema: ModelSchema,
    constructor: ItemConstructor,
}

impl fmt::Debug for RegisteredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl RegisteredSchema {
    pub fn new(schema: ModelSchema, constructor: ItemConstructor) -> Self {
        Self {
            schema,
            constructor,
        }
    }

    pub fn id(&self) -> &SchemaId {
        &self.schema.id
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Build the document for a record, stamped now
    pub fn build(&self, record: &RelationRecord) -> PersistableItem {
        (self.constructor)(&self.schema, record, Utc::now())
    }
}

/// Explicit registry of index schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<RegisteredSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `relation.faq` schema
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(relation_faq_schema(), relation_item);
        registry
    }

    /// Register a schema, replacing any schema with the same identifier
    pub fn register(&mut self, schema: ModelSchema, constructor: ItemConstructor) {
        let entry = RegisteredSchema::new(schema, constructor);
        match self.entries.iter_mut().find(|e| e.id() == entry.id()) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, id: &SchemaId) -> Option<&RegisteredSchema> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Look up a schema by its `index.mapping` name
    pub fn resolve(&self, name: &str) -> Result<&RegisteredSchema> {
        let id: SchemaId = name.parse()?;
        self.get(&id)
            .ok_or_else(|| SrlxError::NotFound(format!("schema {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSchema> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Built-in relation schema
// ============================================================================

/// The `relation.faq` schema for extracted relations
pub fn relation_faq_schema() -> ModelSchema {
    ModelSchema::new(
        SchemaId::new("relation", "faq"),
        vec![
            FieldMapping::analyzed("leftEntity", "snowball"),
            FieldMapping::analyzed("rightEntity", "snowball"),
            FieldMapping::analyzed("relation", "snowball"),
            FieldMapping::keyword("sentence"),
            FieldMapping::keyword("text"),
            FieldMapping::keyword("block_id"),
            FieldMapping::date(CREATED_AT_FIELD),
        ],
    )
}

/// Item constructor of the `relation.faq` schema
pub fn relation_item(
    schema: &ModelSchema,
    record: &RelationRecord,
    now: DateTime<Utc>,
) -> PersistableItem {
    PersistableItem::new(schema.id.clone())
        .with_field("leftEntity", record.left_entity.as_str())
        .with_field("rightEntity", record.right_entity.as_str())
        .with_field("relation", record.relation.as_str())
        .with_field("sentence", record.sentence.as_str())
        .with_field("text", record.sentence.as_str())
        .with_created_at(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RelationRecord {
        RelationRecord::new("cat", "mouse", "chase", "The cat chased the mouse")
    }

    #[test]
    fn test_schema_id_display_and_parse() {
        let id = SchemaId::new("relation", "faq");
        assert_eq!(id.to_string(), "relation.faq");
        assert_eq!("relation.faq".parse::<SchemaId>().unwrap(), id);
        assert!("relation".parse::<SchemaId>().is_err());
        assert!(".faq".parse::<SchemaId>().is_err());
    }

    #[test]
    fn test_relation_faq_mappings() {
        let mappings = relation_faq_schema().mappings();
        let properties = &mappings["properties"];

        assert_eq!(properties["leftEntity"]["type"], "text");
        assert_eq!(properties["leftEntity"]["analyzer"], "snowball");
        assert_eq!(properties["sentence"]["type"], "keyword");
        assert!(properties["sentence"].get("analyzer").is_none());
        assert_eq!(properties["createdAt"]["type"], "date");
    }

    #[test]
    fn test_default_registry_builds_relation_items() {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.resolve("relation.faq").unwrap();

        let item = schema.build(&record());
        assert_eq!(item.schema, SchemaId::new("relation", "faq"));
        assert_eq!(item.field("leftEntity"), Some("cat"));
        assert_eq!(item.field("rightEntity"), Some("mouse"));
        assert_eq!(item.field("relation"), Some("chase"));
        assert_eq!(item.field("text"), item.field("sentence"));
        assert!(item.created_at.is_some());
        assert!(item.document().get("createdAt").is_some());
    }

    #[test]
    fn test_resolve_unknown_schema() {
        let registry = SchemaRegistry::with_defaults();
        assert!(matches!(
            registry.resolve("other.faq"),
            Err(SrlxError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_replaces_same_id() {
        fn bare(schema: &ModelSchema, _: &RelationRecord, _: DateTime<Utc>) -> PersistableItem {
            PersistableItem::new(schema.id.clone())
        }

        let mut registry = SchemaRegistry::with_defaults();
        registry.register(relation_faq_schema(), bare);

        assert_eq!(registry.len(), 1);
        let item = registry.iter().next().unwrap().build(&record());
        assert!(item.body.is_empty());
    }

    #[test]
    fn test_stamp_keeps_existing_timestamp() {
        let earlier = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut item = PersistableItem::new(SchemaId::new("a", "b")).with_created_at(earlier);
        item.stamp(Utc::now());
        assert_eq!(item.created_at, Some(earlier));

        let mut fresh = PersistableItem::new(SchemaId::new("a", "b"));
        fresh.stamp(earlier);
        assert_eq!(fresh.created_at, Some(earlier));
    }
}
