//! Index store backends
//!
//! The sink only needs two operations from a store: prepare the index of a
//! schema once, and save one document.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::schema::{ModelSchema, PersistableItem, SchemaId};
use srlx_core::{Result, SrlxError, StoreBackend, StoreConfig};

/// Trait for search index stores
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Create the index and mappings of a schema (idempotent)
    async fn init_schema(&self, schema: &ModelSchema) -> Result<()>;

    /// Save one document, returning its id
    async fn save(&self, item: PersistableItem) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Build the store selected by configuration
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn IndexStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Http => Ok(Arc::new(HttpIndexStore::from_config(config)?)),
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-process store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<SchemaId, Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, schema: &SchemaId) -> bool {
        self.indices.read().contains_key(schema)
    }

    /// Saved documents of a schema, in save order
    pub fn documents(&self, schema: &SchemaId) -> Vec<Value> {
        self.indices
            .read()
            .get(schema)
            .map(|docs| docs.iter().map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, schema: &SchemaId) -> usize {
        self.indices.read().get(schema).map_or(0, Vec::len)
    }

    /// Number of documents across all schemas
    pub fn total(&self) -> usize {
        self.indices.read().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn init_schema(&self, schema: &ModelSchema) -> Result<()> {
        self.indices.write().entry(schema.id.clone()).or_default();
        Ok(())
    }

    async fn save(&self, mut item: PersistableItem) -> Result<String> {
        item.stamp(Utc::now());
        let id = item.id.to_string();

        let mut indices = self.indices.write();
        let docs = indices.get_mut(&item.schema).ok_or_else(|| {
            SrlxError::StoreError(format!("Index {} not initialized", item.schema))
        })?;
        docs.push((id.clone(), item.document()));
        Ok(id)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Elasticsearch-compatible HTTP store
// ============================================================================

/// Store speaking the Elasticsearch REST API
pub struct HttpIndexStore {
    client: Client,
    base_url: String,
}

impl HttpIndexStore {
    /// Create a new store for the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SrlxError::StoreError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, index)
    }
}

#[async_trait]
impl IndexStore for HttpIndexStore {
    async fn init_schema(&self, schema: &ModelSchema) -> Result<()> {
        let body = json!({ "mappings": schema.mappings() });

        let response = self
            .client
            .put(self.index_url(&schema.id.index))
            .json(&body)
            .send()
            .await
            .map_err(|e| SrlxError::StoreError(format!("Index request failed: {e}")))?;

        if response.status().is_success() {
            info!(schema = %schema.id, "created index");
            return Ok(());
        }

        let error_text = response.text().await.unwrap_or_default();
        if error_text.contains("resource_already_exists_exception")
            || error_text.contains("already exists")
        {
            debug!(schema = %schema.id, "index already exists");
            return Ok(());
        }

        Err(SrlxError::StoreError(format!(
            "Failed to create index {}: {error_text}",
            schema.id
        )))
    }

    async fn save(&self, mut item: PersistableItem) -> Result<String> {
        item.stamp(Utc::now());
        let id = item.id.to_string();

        let response = self
            .client
            .put(format!("{}/_doc/{id}", self.index_url(&item.schema.index)))
            .json(&item.document())
            .send()
            .await
            .map_err(|e| SrlxError::StoreError(format!("Save request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SrlxError::StoreError(format!(
                "Failed to save document {id}: {error_text}"
            )));
        }

        Ok(id)
    }

    fn name(&self) -> &str {
        "http"
    }
}
