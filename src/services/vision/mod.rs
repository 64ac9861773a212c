//! Image classification by nearest-neighbour search over stored embeddings
//!
//! Split into submodules:
//! - `preprocess`: decode and resize into the model's input tensor
//! - `embedding`: model backends, feature extraction, pad/truncate
//! - `labels`: ImageNet class index
//! - `store`: vector store adapters
//! - `pipeline`: train / detect / delete orchestration

pub mod embedding;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod store;

pub use embedding::{EmbeddingService, FeatureExtractor};
pub use labels::{ClassLabel, ClassLabels};
pub use pipeline::{format_confidence, Detection, ImagePipeline, LabelConfidence, Stage};
pub use preprocess::ImageTensor;
pub use store::{connect_store, QueryMatch, QueryRequest, VectorRecord, VectorStore};
