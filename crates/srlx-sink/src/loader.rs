//! Sink loader
//!
//! Forms one [`IndexSink`] per registered schema against a shared store and
//! closes them all together at shutdown.

use std::sync::Arc;

use tracing::{info, warn};

use crate::schema::{SchemaId, SchemaRegistry};
use crate::sink::{IndexSink, ItemSink};
use crate::store::IndexStore;
use srlx_core::{Result, SinkConfig, SrlxError};

/// The set of sinks formed from a schema registry
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<IndexSink>>,
}

impl SinkSet {
    /// Form one sink per registered schema
    pub fn form(
        registry: &SchemaRegistry,
        store: Arc<dyn IndexStore>,
        config: &SinkConfig,
    ) -> Self {
        let sinks: Vec<Arc<IndexSink>> = registry
            .iter()
            .map(|schema| Arc::new(IndexSink::new(schema.clone(), Arc::clone(&store), config)))
            .collect();

        info!(sinks = sinks.len(), store = store.name(), "formed sinks");
        Self { sinks }
    }

    pub fn get(&self, id: &SchemaId) -> Option<Arc<IndexSink>> {
        self.sinks.iter().find(|sink| sink.schema() == id).cloned()
    }

    /// Look up a sink by its `index.mapping` name
    pub fn by_name(&self, name: &str) -> Result<Arc<IndexSink>> {
        self.sinks
            .iter()
            .find(|sink| sink.name() == name)
            .cloned()
            .ok_or_else(|| SrlxError::NotFound(format!("sink {name}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<IndexSink>> {
        self.sinks.iter()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Stop every sink, returning the first failure after trying them all
    pub async fn close_all(&self) -> Result<()> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.stop().await {
                warn!(sink = sink.name(), error = %e, "failed to stop sink");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{relation_faq_schema, relation_item, FieldMapping, ModelSchema};
    use crate::sink::SinkState;
    use crate::store::MemoryStore;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::with_defaults();
        registry.register(
            ModelSchema::new(
                SchemaId::new("relation", "archive"),
                vec![FieldMapping::keyword("sentence")],
            ),
            relation_item,
        );
        registry
    }

    #[tokio::test]
    async fn test_form_one_sink_per_schema() {
        let set = SinkSet::form(&registry(), Arc::new(MemoryStore::new()), &SinkConfig::default());

        assert_eq!(set.len(), 2);
        assert!(set.get(&relation_faq_schema().id).is_some());
        assert_eq!(set.by_name("relation.archive").unwrap().name(), "relation.archive");
        assert!(set.by_name("relation.none").is_err());
    }

    #[tokio::test]
    async fn test_close_all_stops_every_sink() {
        let set = SinkSet::form(&registry(), Arc::new(MemoryStore::new()), &SinkConfig::default());
        for sink in set.iter() {
            sink.start().await.unwrap();
        }

        set.close_all().await.unwrap();
        set.close_all().await.unwrap();

        for sink in set.iter() {
            assert_eq!(sink.state(), SinkState::Stopped);
            assert_eq!(sink.stats().shutdowns, 1);
        }
    }
}
