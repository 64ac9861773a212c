//! Embedding extraction
//!
//! Split into submodules:
//! - `model`: model backends and the EmbeddingService
//! - `vector`: pad/truncate contract, softmax

mod model;
mod vector;

use async_trait::async_trait;

use super::preprocess::ImageTensor;
use crate::error::AppResult;

pub use model::{EmbeddingService, GraphModel, ModelBackend, PooledFeatureModel};
pub use vector::{argmax, fit_dimension, softmax};

/// Turns a preprocessed image into a fixed-length embedding.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Length every returned vector has.
    fn dimensions(&self) -> usize;

    /// Short description for readiness reporting.
    fn describe(&self) -> String;

    async fn extract(&self, tensor: ImageTensor) -> AppResult<Vec<f32>>;
}
