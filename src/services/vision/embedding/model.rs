//! EmbeddingService - model loading and feature extraction

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};
use ort::inputs;
use ort::session::Session;
use ort::value::Value;
use tokio::sync::OnceCell;

use super::vector::{argmax, fit_dimension, softmax};
use super::FeatureExtractor;
use crate::error::{AppError, AppResult, ResultExt};
use crate::services::vision::labels::ClassLabels;
use crate::services::vision::preprocess::ImageTensor;
use crate::services::{EmbeddingStrategy, ModelConfig};

/// Exported ONNX graph supplied by the operator (custom-model mode).
pub struct GraphModel {
    session: Mutex<Session>,
    path: PathBuf,
}

impl GraphModel {
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Model file not found at {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .inference_err("Failed to load custom model")?;

        Ok(Self {
            session: Mutex::new(session),
            path: path.to_path_buf(),
        })
    }

    /// Feeds the NHWC tensor to the first graph input and flattens the first output.
    pub fn run(&self, tensor: &ImageTensor) -> AppResult<Vec<f32>> {
        let input = Value::from_array((tensor.shape().to_vec(), tensor.data().to_vec()))
            .inference_err("failed to build graph input")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Inference("graph session lock poisoned".to_string()))?;
        let outputs = session
            .run(inputs![input])
            .inference_err("graph execution failed")?;

        let output = outputs
            .iter()
            .next()
            .map(|(_, value)| value)
            .ok_or_else(|| AppError::Inference("graph produced no outputs".to_string()))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .inference_err("graph output is not a f32 tensor")?;

        Ok(data.to_vec())
    }
}

/// Pretrained image model whose output is the pooled feature embedding (default mode).
pub struct PooledFeatureModel {
    model: Mutex<ImageEmbedding>,
    name: String,
}

impl PooledFeatureModel {
    pub fn load(config: &ModelConfig) -> AppResult<Self> {
        let model: ImageEmbeddingModel = config
            .image_embedding_model
            .parse::<ImageEmbeddingModel>()
            .config_err("unknown IMAGE_EMBEDDING_MODEL")?;

        let options =
            ImageInitOptions::new(model).with_cache_dir(PathBuf::from(&config.cache_dir));
        let embedding = ImageEmbedding::try_new(options)
            .inference_err("Failed to load pretrained image model")?;

        Ok(Self {
            model: Mutex::new(embedding),
            name: config.image_embedding_model.clone(),
        })
    }

    pub fn run(&self, tensor: &ImageTensor) -> AppResult<Vec<f32>> {
        // the runtime only takes encoded images; the PNG round trip is lossless for 8-bit input
        let png = tensor.to_png()?;

        let vectors = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| AppError::Inference("image model lock poisoned".to_string()))?;
            model.embed_bytes(&[png.as_slice()], None)
        }
        .inference_err("image embedding failed")?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Inference("image embedding returned no vectors".to_string()))
    }
}

/// Backend chosen once at load time.
pub enum ModelBackend {
    Graph(GraphModel),
    PooledFeature(PooledFeatureModel),
}

impl ModelBackend {
    /// Blocking; call from `spawn_blocking`.
    pub fn load(config: &ModelConfig) -> AppResult<Self> {
        if config.use_custom_model {
            let path = PathBuf::from(&config.custom_model_path);
            tracing::info!(path = %path.display(), "Loading custom graph model");
            Ok(ModelBackend::Graph(GraphModel::load(&path)?))
        } else {
            tracing::info!(model = %config.image_embedding_model, "Loading pretrained image model");
            Ok(ModelBackend::PooledFeature(PooledFeatureModel::load(config)?))
        }
    }

    pub fn name(&self) -> String {
        match self {
            ModelBackend::Graph(graph) => format!("graph:{}", graph.path.display()),
            ModelBackend::PooledFeature(pooled) => format!("pooled:{}", pooled.name),
        }
    }

    pub fn run(&self, tensor: &ImageTensor) -> AppResult<Vec<f32>> {
        match self {
            ModelBackend::Graph(graph) => graph.run(tensor),
            ModelBackend::PooledFeature(pooled) => pooled.run(tensor),
        }
    }
}

pub struct EmbeddingService {
    config: ModelConfig,
    dimensions: usize,
    labels: Arc<ClassLabels>,
    backend: OnceCell<Arc<ModelBackend>>,
}

impl EmbeddingService {
    pub fn new(config: ModelConfig, dimensions: usize, labels: Arc<ClassLabels>) -> Self {
        Self {
            config,
            dimensions,
            labels,
            backend: OnceCell::new(),
        }
    }

    pub fn strategy(&self) -> EmbeddingStrategy {
        self.config.strategy
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.initialized()
    }

    /// Loads the model once. Concurrent callers wait on the same load.
    pub async fn load(&self) -> AppResult<()> {
        self.backend
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let backend = tokio::task::spawn_blocking(move || ModelBackend::load(&config))
                    .await
                    .map_err(|e| AppError::Inference(format!("model load task failed: {}", e)))??;

                tracing::info!(
                    model = %backend.name(),
                    strategy = %self.config.strategy,
                    dimensions = self.dimensions,
                    "Model loaded"
                );
                Ok::<_, AppError>(Arc::new(backend))
            })
            .await?;
        Ok(())
    }

    fn apply_strategy(&self, raw: Vec<f32>) -> Vec<f32> {
        match self.config.strategy {
            EmbeddingStrategy::Pooled => raw,
            EmbeddingStrategy::Softmax => {
                let probs = softmax(&raw);
                if let Some((idx, prob)) = argmax(&probs) {
                    let class = self.labels.get(idx).map(|label| label.name.as_str());
                    tracing::debug!(idx, prob, class = ?class, "Top softmax class");
                }
                probs
            }
        }
    }
}

#[async_trait]
impl FeatureExtractor for EmbeddingService {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn describe(&self) -> String {
        match self.backend.get() {
            Some(backend) => backend.name(),
            None => "not loaded".to_string(),
        }
    }

    async fn extract(&self, tensor: ImageTensor) -> AppResult<Vec<f32>> {
        let backend = self.backend.get().cloned().ok_or(AppError::ModelNotReady)?;

        let raw = tokio::task::spawn_blocking(move || backend.run(&tensor))
            .await
            .map_err(|e| AppError::Inference(format!("inference task failed: {}", e)))??;

        if raw.is_empty() {
            return Err(AppError::Inference("model returned an empty output".to_string()));
        }
        tracing::debug!(raw_len = raw.len(), "Extracted feature vector");

        Ok(fit_dimension(self.apply_strategy(raw), self.dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(strategy: EmbeddingStrategy) -> EmbeddingService {
        let config = ModelConfig {
            strategy,
            ..ModelConfig::default()
        };
        EmbeddingService::new(config, 8, Arc::new(ClassLabels::empty()))
    }

    fn blank_tensor() -> ImageTensor {
        ImageTensor::from_data(vec![0.0; 224 * 224 * 3]).unwrap()
    }

    #[tokio::test]
    async fn extract_before_load_is_not_ready() {
        let service = service(EmbeddingStrategy::Pooled);
        assert!(!service.is_loaded());
        assert_eq!(service.describe(), "not loaded");

        let err = service.extract(blank_tensor()).await.unwrap_err();
        assert!(matches!(err, AppError::ModelNotReady));
    }

    #[tokio::test]
    async fn missing_custom_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig {
            use_custom_model: true,
            custom_model_path: dir.path().join("absent.onnx").to_string_lossy().to_string(),
            ..ModelConfig::default()
        };
        let service = EmbeddingService::new(config, 8, Arc::new(ClassLabels::empty()));

        let err = service.load().await.unwrap_err();
        assert!(err.to_string().contains("Model file not found"));
        assert!(!service.is_loaded());
    }

    #[test]
    fn pooled_strategy_keeps_raw_values() {
        let service = service(EmbeddingStrategy::Pooled);
        assert_eq!(service.apply_strategy(vec![3.0, -1.0]), vec![3.0, -1.0]);
    }

    #[test]
    fn softmax_strategy_normalizes() {
        let service = service(EmbeddingStrategy::Softmax);
        let probs = service.apply_strategy(vec![1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }
}
