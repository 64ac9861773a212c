//! LanceDB storage operations
//!
//! One table holds every user's vectors; the `namespace` column scopes queries
//! and deletes.

use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Error as LanceError, Table};
use serde_json::{Map, Value};

use super::{
    validate_query, validate_records, QueryMatch, QueryRequest, VectorRecord, VectorStore,
    METADATA_LABEL,
};
use crate::error::{AppError, AppResult, ResultExt};

const COLUMN_ID: &str = "id";
const COLUMN_NAMESPACE: &str = "namespace";
const COLUMN_LABEL: &str = "label";
const COLUMN_METADATA: &str = "metadata";
const COLUMN_VECTOR: &str = "vector";
const COLUMN_DISTANCE: &str = "_distance";

pub fn build_schema(dimensions: usize) -> AppResult<Arc<Schema>> {
    let dim = i32::try_from(dimensions)
        .map_err(|_| AppError::Config("VECTOR_DIMENSIONS overflow".to_string()))?;

    let vector = DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dim,
    );

    Ok(Arc::new(Schema::new(vec![
        Field::new(COLUMN_ID, DataType::Utf8, false),
        Field::new(COLUMN_NAMESPACE, DataType::Utf8, false),
        Field::new(COLUMN_LABEL, DataType::Utf8, false),
        Field::new(COLUMN_METADATA, DataType::Utf8, false),
        Field::new(COLUMN_VECTOR, vector, false),
    ])))
}

/// SQL string literal with embedded quotes doubled.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct LanceStore {
    table: Table,
    schema: Arc<Schema>,
    dimensions: usize,
}

impl LanceStore {
    /// Opens `table_name` under `path`. The table is created only when `create_table` is set.
    pub async fn open(
        path: &str,
        table_name: &str,
        dimensions: usize,
        create_table: bool,
    ) -> AppResult<Self> {
        let schema = build_schema(dimensions)?;
        let db = connect(path)
            .execute()
            .await
            .store_err("Failed to open LanceDB")?;

        let table = match db.open_table(table_name).execute().await {
            Ok(table) => table,
            Err(LanceError::TableNotFound { .. }) if create_table => {
                tracing::info!(table = table_name, dimensions, "Creating LanceDB table");
                db.create_empty_table(table_name, schema.clone())
                    .execute()
                    .await
                    .store_err("Failed to create LanceDB table")?
            }
            Err(LanceError::TableNotFound { .. }) => {
                return Err(AppError::Store(format!(
                    "LanceDB table '{}' not found!",
                    table_name
                )));
            }
            Err(err) => return Err(AppError::Store(err.to_string())),
        };

        let existing = table.schema().await.store_err("Failed to read table schema")?;
        match existing.field_with_name(COLUMN_VECTOR).map(|f| f.data_type().clone()) {
            Ok(DataType::FixedSizeList(_, size)) if size as usize == dimensions => {}
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "LanceDB table '{}' vector column is {:?}, VECTOR_DIMENSIONS is {}",
                    table_name, other, dimensions
                )));
            }
            Err(_) => {
                return Err(AppError::Config(format!(
                    "LanceDB table '{}' has no vector column",
                    table_name
                )));
            }
        }

        tracing::info!(path, table = table_name, "LanceDB table is ready");
        Ok(Self {
            table,
            schema,
            dimensions,
        })
    }

    fn build_record_batch(&self, records: &[VectorRecord]) -> AppResult<RecordBatch> {
        let ids = StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()));
        let namespaces = StringArray::from_iter_values(records.iter().map(|r| r.namespace.as_str()));
        let labels =
            StringArray::from_iter_values(records.iter().map(|r| r.label().unwrap_or_default()));
        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<Vec<_>, _>>()
            .store_err("Failed to encode metadata")?;
        let metadata = StringArray::from_iter_values(metadata.iter().map(String::as_str));

        let mut vectors = FixedSizeListBuilder::with_capacity(
            Float32Builder::with_capacity(records.len() * self.dimensions),
            self.dimensions as i32,
            records.len(),
        );
        for record in records {
            vectors.values().append_slice(&record.values);
            vectors.append(true);
        }

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(ids),
                Arc::new(namespaces),
                Arc::new(labels),
                Arc::new(metadata),
                Arc::new(vectors.finish()),
            ],
        )
        .store_err("Failed to build record batch")
    }
}

async fn collect_matches(mut stream: SendableRecordBatchStream) -> AppResult<Vec<QueryMatch>> {
    let mut matches = Vec::new();

    while let Some(batch) = stream.try_next().await.store_err("LanceDB query failed")? {
        if batch.num_rows() == 0 {
            continue;
        }

        let ids = string_column(&batch, COLUMN_ID)?;
        let labels = string_column(&batch, COLUMN_LABEL)?;
        let metadata = string_column(&batch, COLUMN_METADATA)?;
        let distances = batch
            .column_by_name(COLUMN_DISTANCE)
            .ok_or_else(|| AppError::Store("query result missing _distance".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Store("_distance column type mismatch".to_string()))?;

        for row in 0..batch.num_rows() {
            let mut meta: Map<String, Value> =
                serde_json::from_str(metadata.value(row)).unwrap_or_default();
            meta.entry(METADATA_LABEL.to_string())
                .or_insert_with(|| Value::String(labels.value(row).to_string()));

            matches.push(QueryMatch {
                id: ids.value(row).to_string(),
                score: 1.0 - distances.value(row),
                metadata: meta,
            });
        }
    }

    Ok(matches)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AppError::Store(format!("query result missing {}", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| AppError::Store(format!("{} column type mismatch", name)))
}

#[async_trait]
impl VectorStore for LanceStore {
    fn backend(&self) -> &'static str {
        "lancedb"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> AppResult<()> {
        validate_records(records, self.dimensions)?;

        // Replace rows that share an id. Delete and add are two commits, so a failed add
        // loses the old row; train ids carry a fresh uuid and never hit an existing row.
        let ids = records
            .iter()
            .map(|r| quote(&r.id))
            .collect::<Vec<_>>()
            .join(", ");
        self.table
            .delete(&format!("{} IN ({})", COLUMN_ID, ids))
            .await
            .store_err("Failed to save embedding")?;

        let batch = self.build_record_batch(records)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema.clone());
        self.table
            .add(batches)
            .execute()
            .await
            .store_err("Failed to save embedding")?;

        tracing::debug!(count = records.len(), "LanceDB upsert completed");
        Ok(())
    }

    async fn query(&self, request: &QueryRequest<'_>) -> AppResult<Vec<QueryMatch>> {
        validate_query(request)?;

        let stream = self
            .table
            .query()
            .nearest_to(request.embedding.to_vec())
            .store_err("LanceDB query failed")?
            .column(COLUMN_VECTOR)
            .distance_type(DistanceType::Cosine)
            .limit(request.top_k)
            .only_if(format!("{} = {}", COLUMN_NAMESPACE, quote(request.namespace)))
            .execute()
            .await
            .store_err("LanceDB query failed")?;

        collect_matches(stream).await
    }

    async fn delete_namespace(&self, namespace: &str) -> AppResult<()> {
        self.table
            .delete(&format!("{} = {}", COLUMN_NAMESPACE, quote(namespace)))
            .await
            .store_err("Namespace deletion failed")?;
        tracing::info!(namespace, "Namespace deleted");
        Ok(())
    }
}
