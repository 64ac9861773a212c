//! Vector store adapters
//!
//! Split into submodules:
//! - `pinecone`: managed index over the Pinecone REST API
//! - `lance`: embedded LanceDB table

mod lance;
mod pinecone;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::services::{StoreBackend, StoreConfig};

pub use lance::LanceStore;
pub use pinecone::PineconeStore;

pub(crate) const METADATA_LABEL: &str = "label";
pub(crate) const METADATA_USER: &str = "user";
pub(crate) const METADATA_TRAINED_AT: &str = "trainedAt";

/// One stored embedding. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub namespace: String,
}

impl VectorRecord {
    pub fn label(&self) -> Option<&str> {
        self.metadata.get(METADATA_LABEL).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    /// Raw similarity from the store, not clamped.
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueryMatch {
    pub fn label(&self) -> Option<&str> {
        self.metadata.get(METADATA_LABEL).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub embedding: &'a [f32],
    pub namespace: &'a str,
    pub top_k: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn upsert(&self, records: &[VectorRecord]) -> AppResult<()>;

    async fn query(&self, request: &QueryRequest<'_>) -> AppResult<Vec<QueryMatch>>;

    async fn delete_namespace(&self, namespace: &str) -> AppResult<()>;
}

/// Checks the upsert contract shared by every backend.
pub fn validate_records(records: &[VectorRecord], dimensions: usize) -> AppResult<()> {
    if records.is_empty() {
        return Err(AppError::Store("No valid records to upsert.".to_string()));
    }

    for record in records {
        if record.id.trim().is_empty() {
            return Err(AppError::Store("record id is empty".to_string()));
        }
        if record.namespace.trim().is_empty() {
            return Err(AppError::Store(format!("record {} has no namespace", record.id)));
        }
        if record.values.len() != dimensions {
            return Err(AppError::Store(format!(
                "record {} has {} values, index expects {}",
                record.id,
                record.values.len(),
                dimensions
            )));
        }
    }
    Ok(())
}

pub fn validate_query(request: &QueryRequest<'_>) -> AppResult<()> {
    if request.embedding.is_empty() {
        return Err(AppError::Store(
            "Invalid embedding for vector query.".to_string(),
        ));
    }
    Ok(())
}

/// Binds to the configured index. Any error here is fatal at startup.
pub async fn connect_store(
    config: &StoreConfig,
    dimensions: usize,
) -> AppResult<Arc<dyn VectorStore>> {
    match config.backend {
        StoreBackend::Pinecone => {
            let store = PineconeStore::connect(
                &config.controller_url,
                &config.api_key,
                &config.index_name,
                dimensions,
            )
            .await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Lancedb => {
            let store = LanceStore::open(
                &config.lancedb_path,
                &config.index_name,
                dimensions,
                config.create_table,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, namespace: &str, len: usize) -> VectorRecord {
        let mut metadata = Map::new();
        metadata.insert(METADATA_LABEL.to_string(), json!("cat"));
        VectorRecord {
            id: id.to_string(),
            values: vec![0.5; len],
            metadata,
            namespace: namespace.to_string(),
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(validate_records(&[], 4), Err(AppError::Store(_))));
    }

    #[test]
    fn records_must_match_dimensions() {
        assert!(validate_records(&[record("a", "ns", 4)], 4).is_ok());
        assert!(validate_records(&[record("a", "ns", 3)], 4).is_err());
    }

    #[test]
    fn records_need_id_and_namespace() {
        assert!(validate_records(&[record(" ", "ns", 4)], 4).is_err());
        assert!(validate_records(&[record("a", "", 4)], 4).is_err());
    }

    #[test]
    fn empty_query_embedding_is_rejected() {
        let request = QueryRequest {
            embedding: &[],
            namespace: "ns",
            top_k: 3,
        };
        assert!(validate_query(&request).is_err());
    }

    #[test]
    fn label_reads_metadata() {
        assert_eq!(record("a", "ns", 1).label(), Some("cat"));
    }
}
