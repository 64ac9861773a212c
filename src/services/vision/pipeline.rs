//! Train / detect request pipeline
//!
//! Validating → Preprocessing → Extracting → (Storing | Querying) → Responding.
//! Each stage is logged; the first failing stage ends the request.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};

use super::embedding::{fit_dimension, FeatureExtractor};
use super::preprocess::{decode_base64_image, preprocess_image};
use super::store::{
    QueryMatch, QueryRequest, VectorRecord, VectorStore, METADATA_LABEL, METADATA_TRAINED_AT,
    METADATA_USER,
};
use crate::error::AppResult;
use crate::utils::validation::validate_limit;
use crate::utils::{namespace_for, record_id};

pub const UNKNOWN_OBJECT: &str = "Unknown Object";
pub const ZERO_CONFIDENCE: &str = "0%";

/// `/api/image` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Train,
    Detect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    Preprocessing,
    Extracting,
    Storing,
    Querying,
    Responding,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Validating => "validating",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Storing => "storing",
            PipelineStage::Querying => "querying",
            PipelineStage::Responding => "responding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelConfidence {
    pub label: String,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Matches(Vec<LabelConfidence>),
    Unknown,
}

/// `min(score * 100, 100)` with two decimals and a `%` suffix.
pub fn format_confidence(score: f32) -> String {
    let percent = (score * 100.0).min(100.0);
    format!("{:.2}%", percent)
}

/// Ranks matches by score and drops any without a label.
pub fn rank_matches(mut matches: Vec<QueryMatch>) -> Detection {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));

    let ranked: Vec<LabelConfidence> = matches
        .iter()
        .filter_map(|m| {
            m.label().map(|label| LabelConfidence {
                label: label.to_string(),
                confidence: format_confidence(m.score),
            })
        })
        .collect();

    if ranked.is_empty() {
        Detection::Unknown
    } else {
        Detection::Matches(ranked)
    }
}

pub struct ImagePipeline {
    extractor: Arc<dyn FeatureExtractor>,
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    default_top_k: usize,
    max_top_k: usize,
}

impl ImagePipeline {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn VectorStore>,
        dimensions: usize,
        default_top_k: usize,
        max_top_k: usize,
    ) -> Self {
        Self {
            extractor,
            store,
            dimensions,
            default_top_k,
            max_top_k,
        }
    }

    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, data: &str) -> AppResult<Vec<f32>> {
        tracing::debug!(stage = %PipelineStage::Preprocessing, "Decoding image");
        let bytes = decode_base64_image(data)?;
        let tensor = preprocess_image(&bytes)?;

        tracing::debug!(stage = %PipelineStage::Extracting, "Extracting embedding");
        let raw = self.extractor.extract(tensor).await?;
        Ok(fit_dimension(raw, self.dimensions))
    }

    /// Stores one embedding for `label` in the user's namespace and returns the record id.
    pub async fn train(&self, data: &str, label: &str, user: &str) -> AppResult<String> {
        let namespace = namespace_for(user);
        let label = label.trim();
        let values = self.embed(data).await?;

        let mut metadata = Map::new();
        metadata.insert(METADATA_LABEL.to_string(), json!(label));
        metadata.insert(METADATA_USER.to_string(), json!(namespace));
        metadata.insert(
            METADATA_TRAINED_AT.to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let record = VectorRecord {
            id: record_id(&namespace, label),
            values,
            metadata,
            namespace,
        };

        tracing::debug!(stage = %PipelineStage::Storing, id = %record.id, "Upserting record");
        self.store.upsert(std::slice::from_ref(&record)).await?;

        tracing::info!(id = %record.id, label, "Training completed");
        Ok(record.id)
    }

    /// Queries the user's namespace. Store failures are logged and read as "no match".
    pub async fn detect(&self, data: &str, user: &str, top_k: Option<usize>) -> AppResult<Detection> {
        let namespace = namespace_for(user);
        let top_k = validate_limit(top_k, self.default_top_k, self.max_top_k);
        let embedding = self.embed(data).await?;

        tracing::debug!(stage = %PipelineStage::Querying, namespace = %namespace, top_k, "Querying store");
        let request = QueryRequest {
            embedding: &embedding,
            namespace: &namespace,
            top_k,
        };
        let matches = match self.store.query(&request).await {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(error = %err, backend = self.store.backend(), "Query failed, treating as no match");
                Vec::new()
            }
        };

        tracing::debug!(stage = %PipelineStage::Responding, count = matches.len(), "Ranking matches");
        Ok(rank_matches(matches))
    }

    pub async fn delete_user(&self, user: &str) -> AppResult<()> {
        let namespace = namespace_for(user);
        self.store.delete_namespace(&namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn matched(id: &str, label: Option<&str>, score: f32) -> QueryMatch {
        let mut metadata = Map::new();
        if let Some(label) = label {
            metadata.insert(METADATA_LABEL.to_string(), Value::String(label.to_string()));
        }
        QueryMatch {
            id: id.to_string(),
            score,
            metadata,
        }
    }

    #[test]
    fn confidence_is_clamped_to_hundred() {
        assert_eq!(format_confidence(1.37), "100.00%");
        assert_eq!(format_confidence(1.0), "100.00%");
    }

    #[test]
    fn confidence_has_two_decimals() {
        assert_eq!(format_confidence(0.5), "50.00%");
        assert_eq!(format_confidence(0.1234), "12.34%");
        assert_eq!(format_confidence(0.0), "0.00%");
    }

    #[test]
    fn empty_matches_are_unknown() {
        assert_eq!(rank_matches(Vec::new()), Detection::Unknown);
        assert_eq!(rank_matches(vec![matched("a", None, 0.9)]), Detection::Unknown);
    }

    #[test]
    fn matches_are_sorted_by_score() {
        let detection = rank_matches(vec![
            matched("a", Some("dog"), 0.4),
            matched("b", Some("cat"), 0.9),
        ]);
        match detection {
            Detection::Matches(ranked) => {
                assert_eq!(ranked[0].label, "cat");
                assert_eq!(ranked[0].confidence, "90.00%");
                assert_eq!(ranked[1].label, "dog");
            }
            Detection::Unknown => panic!("expected matches"),
        }
    }

    #[test]
    fn stage_parses_lowercase() {
        let stage: Stage = serde_json::from_str("\"detect\"").unwrap();
        assert_eq!(stage, Stage::Detect);
        assert_eq!(PipelineStage::Querying.to_string(), "querying");
    }
}
