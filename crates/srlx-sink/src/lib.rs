//! srlx Sink - Persisting relation records into a search index
//!
//! This crate provides:
//! - An explicit schema registry mapping schema identifiers to item constructors
//! - Index store backends (in-memory and Elasticsearch-compatible HTTP)
//! - A bounded, cancellable uploading sink with tracked jobs
//! - A loader that forms one sink per registered schema

pub mod loader;
pub mod schema;
pub mod sink;
pub mod store;

pub use loader::SinkSet;
pub use schema::{
    FieldMapping, FieldType, ItemConstructor, ModelSchema, PersistableItem, RegisteredSchema,
    SchemaId, SchemaRegistry,
};
pub use sink::{IndexSink, ItemSink, SinkError, SinkState, SinkStats};
pub use store::{build_store, HttpIndexStore, IndexStore, MemoryStore};
