//! Pinecone REST adapter
//!
//! The control plane resolves the index host once; all data-plane calls go to
//! that host. Namespaces are native Pinecone namespaces.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{validate_query, validate_records, QueryMatch, QueryRequest, VectorRecord, VectorStore};
use crate::error::{AppError, AppResult};

const API_KEY_HEADER: &str = "Api-Key";
const API_VERSION_HEADER: &str = "X-Pinecone-API-Version";
const API_VERSION: &str = "2024-07";

#[derive(Debug, Deserialize)]
struct IndexList {
    indexes: Option<Vec<IndexDescription>>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    host: String,
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertBody<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

pub struct PineconeStore {
    client: Client,
    api_key: String,
    index_name: String,
    host: String,
    dimensions: usize,
}

impl PineconeStore {
    /// Resolves `index_name` through the control plane. A missing index is an error;
    /// there is no create-index fallback.
    pub async fn connect(
        controller_url: &str,
        api_key: &str,
        index_name: &str,
        dimensions: usize,
    ) -> AppResult<Self> {
        let client = Client::new();
        let url = format!("{}/indexes", controller_url.trim_end_matches('/'));

        tracing::info!("Fetching available Pinecone indexes...");
        let response = client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(|e| AppError::Store(format!("Pinecone indexes could not be retrieved: {}", e)))?;
        let list: IndexList = read_json(response, "list indexes").await?;

        let indexes = list.indexes.ok_or_else(|| {
            AppError::Store("Pinecone indexes could not be retrieved.".to_string())
        })?;
        let names: Vec<&str> = indexes.iter().map(|idx| idx.name.as_str()).collect();
        tracing::info!(indexes = ?names, "Available Pinecone indexes");

        let index = indexes
            .iter()
            .find(|idx| idx.name == index_name)
            .ok_or_else(|| AppError::Store(format!("Pinecone index '{}' not found!", index_name)))?;

        if let Some(index_dim) = index.dimension {
            if index_dim != dimensions {
                return Err(AppError::Config(format!(
                    "Pinecone index '{}' has dimension {}, VECTOR_DIMENSIONS is {}",
                    index_name, index_dim, dimensions
                )));
            }
        }

        let host = if index.host.starts_with("http://") || index.host.starts_with("https://") {
            index.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", index.host.trim_end_matches('/'))
        };
        tracing::info!(index = index_name, host = %host, "Pinecone index is ready");

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            index_name: index_name.to_string(),
            host,
            dimensions,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.host, path))
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_VERSION_HEADER, API_VERSION)
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    action: &str,
) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Store(format!(
            "Pinecone {} returned {}: {}",
            action, status, body
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::Store(format!("Pinecone {} response invalid: {}", action, e)))
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn backend(&self) -> &'static str {
        "pinecone"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> AppResult<()> {
        validate_records(records, self.dimensions)?;

        // one request per namespace
        let mut by_namespace: BTreeMap<&str, Vec<UpsertVector<'_>>> = BTreeMap::new();
        for record in records {
            by_namespace
                .entry(record.namespace.as_str())
                .or_default()
                .push(UpsertVector {
                    id: &record.id,
                    values: &record.values,
                    metadata: &record.metadata,
                });
        }

        for (namespace, vectors) in by_namespace {
            let count = vectors.len();
            let response = self
                .post("/vectors/upsert")
                .json(&UpsertBody { vectors, namespace })
                .send()
                .await
                .map_err(|e| AppError::Store(format!("Failed to save embedding: {}", e)))?;
            let _: Value = read_json(response, "upsert").await?;
            tracing::debug!(namespace, count, "Pinecone upsert completed");
        }

        Ok(())
    }

    async fn query(&self, request: &QueryRequest<'_>) -> AppResult<Vec<QueryMatch>> {
        validate_query(request)?;
        tracing::debug!(namespace = request.namespace, top_k = request.top_k, "Querying Pinecone");

        let response = self
            .post("/query")
            .json(&QueryBody {
                vector: request.embedding,
                top_k: request.top_k,
                namespace: request.namespace,
                include_metadata: true,
                include_values: false,
            })
            .send()
            .await
            .map_err(|e| AppError::Store(format!("Pinecone query failed: {}", e)))?;
        let body: QueryResponse = read_json(response, "query").await?;

        Ok(body.matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> AppResult<()> {
        let response = self
            .post("/vectors/delete")
            .json(&json!({ "deleteAll": true, "namespace": namespace }))
            .send()
            .await
            .map_err(|e| AppError::Store(format!("Namespace deletion failed: {}", e)))?;

        // a namespace that was never written has nothing to delete
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(namespace, "Pinecone namespace not found, nothing to delete");
            return Ok(());
        }
        let _: Value = read_json(response, "delete").await?;
        tracing::info!(namespace, "Namespace deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    #[derive(Clone, Default)]
    struct FakePinecone {
        host: Arc<Mutex<String>>,
        calls: Arc<Mutex<Vec<(String, Value)>>>,
        delete_status: Arc<Mutex<Option<StatusCode>>>,
    }

    impl FakePinecone {
        fn record(&self, path: &str, body: Value) {
            self.calls.lock().unwrap().push((path.to_string(), body));
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    async fn list_indexes(State(fake): State<FakePinecone>, headers: HeaderMap) -> Json<Value> {
        assert_eq!(headers.get(API_KEY_HEADER).unwrap(), "test-key");
        let host = fake.host.lock().unwrap().clone();
        Json(json!({
            "indexes": [
                { "name": "other", "host": "other.example", "dimension": 4 },
                { "name": "vision", "host": host, "dimension": 4 }
            ]
        }))
    }

    async fn upsert(State(fake): State<FakePinecone>, Json(body): Json<Value>) -> Json<Value> {
        let count = body["vectors"].as_array().map(Vec::len).unwrap_or(0);
        fake.record("/vectors/upsert", body);
        Json(json!({ "upsertedCount": count }))
    }

    async fn query(State(fake): State<FakePinecone>, Json(body): Json<Value>) -> Json<Value> {
        fake.record("/query", body);
        Json(json!({
            "matches": [
                { "id": "ns-cat-1", "score": 0.93, "metadata": { "label": "cat" } },
                { "id": "ns-dog-1", "score": 0.41, "metadata": { "label": "dog" } }
            ],
            "namespace": "ns"
        }))
    }

    async fn delete(
        State(fake): State<FakePinecone>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        fake.record("/vectors/delete", body);
        let status = fake.delete_status.lock().unwrap().unwrap_or(StatusCode::OK);
        (status, Json(json!({})))
    }

    async fn spawn_fake() -> (FakePinecone, String) {
        let fake = FakePinecone::default();
        let app = Router::new()
            .route("/indexes", get(list_indexes))
            .route("/vectors/upsert", post(upsert))
            .route("/query", post(query))
            .route("/vectors/delete", post(delete))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        *fake.host.lock().unwrap() = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (fake, base)
    }

    fn record(id: &str, namespace: &str) -> VectorRecord {
        let mut metadata = Map::new();
        metadata.insert("label".to_string(), json!("cat"));
        VectorRecord {
            id: id.to_string(),
            values: vec![0.1, 0.2, 0.3, 0.4],
            metadata,
            namespace: namespace.to_string(),
        }
    }

    #[tokio::test]
    async fn connect_resolves_named_index() {
        let (_fake, base) = spawn_fake().await;
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();
        assert_eq!(store.index_name(), "vision");
        assert_eq!(store.host, base);
    }

    #[tokio::test]
    async fn connect_fails_for_unknown_index() {
        let (_fake, base) = spawn_fake().await;
        let err = PineconeStore::connect(&base, "test-key", "missing", 4)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("'missing' not found"));
    }

    #[tokio::test]
    async fn connect_rejects_dimension_mismatch() {
        let (_fake, base) = spawn_fake().await;
        let err = PineconeStore::connect(&base, "test-key", "vision", 768)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn upsert_groups_by_namespace() {
        let (fake, base) = spawn_fake().await;
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();

        store
            .upsert(&[record("a", "ns1"), record("b", "ns2"), record("c", "ns1")])
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1["namespace"], "ns1");
        assert_eq!(calls[0].1["vectors"].as_array().unwrap().len(), 2);
        assert_eq!(calls[1].1["namespace"], "ns2");
    }

    #[tokio::test]
    async fn query_is_scoped_to_namespace() {
        let (fake, base) = spawn_fake().await;
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();

        let matches = store
            .query(&QueryRequest {
                embedding: &[0.1, 0.2, 0.3, 0.4],
                namespace: "ns",
                top_k: 3,
            })
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].label(), Some("cat"));
        let calls = fake.calls();
        assert_eq!(calls[0].0, "/query");
        assert_eq!(calls[0].1["namespace"], "ns");
        assert_eq!(calls[0].1["topK"], 3);
        assert_eq!(calls[0].1["includeMetadata"], true);
    }

    #[tokio::test]
    async fn delete_namespace_deletes_all() {
        let (fake, base) = spawn_fake().await;
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();

        store.delete_namespace("ns").await.unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0].1, json!({ "deleteAll": true, "namespace": "ns" }));
    }

    #[tokio::test]
    async fn delete_failure_propagates() {
        let (fake, base) = spawn_fake().await;
        *fake.delete_status.lock().unwrap() = Some(StatusCode::INTERNAL_SERVER_ERROR);
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();

        assert!(store.delete_namespace("ns").await.is_err());
    }

    #[tokio::test]
    async fn delete_of_unknown_namespace_is_ok() {
        let (fake, base) = spawn_fake().await;
        *fake.delete_status.lock().unwrap() = Some(StatusCode::NOT_FOUND);
        let store = PineconeStore::connect(&base, "test-key", "vision", 4).await.unwrap();

        assert!(store.delete_namespace("ns").await.is_ok());
    }
}
