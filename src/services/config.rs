//! 服务配置
//!
//! 所有配置都从环境变量读取，缺失或无法解析时使用默认值。
//!
//! | Variable                  | Default                        |
//! |---------------------------|--------------------------------|
//! | `HOST`                    | `0.0.0.0`                      |
//! | `PORT`                    | `3000`                         |
//! | `VERBOSE`                 | `false`                        |
//! | `MAX_BODY_BYTES`          | `10485760`                     |
//! | `VECTOR_DIMENSIONS`       | `768`                          |
//! | `DETECT_TOP_K`            | `5`                            |
//! | `CLASS_INDEX_URL`         | ImageNet class index           |
//! | `USE_CUSTOM_MODEL`        | `false`                        |
//! | `CUSTOM_MODEL_PATH`       | `models/mobilenet/model.onnx`  |
//! | `IMAGE_EMBEDDING_MODEL`   | `Qdrant/Unicom-ViT-B-16`       |
//! | `MODEL_CACHE_DIR`         | `.fastembed_cache`             |
//! | `EMBEDDING_STRATEGY`      | `pooled`                       |
//! | `VECTOR_STORE`            | `pinecone`                     |
//! | `PINECONE_API_KEY`        | required for `pinecone`        |
//! | `PINECONE_INDEX_NAME`     | required (alias `VECTOR_INDEX_NAME`) |
//! | `PINECONE_CONTROLLER_URL` | `https://api.pinecone.io`      |
//! | `LANCEDB_PATH`            | `data/lancedb`                 |
//! | `LANCEDB_CREATE_TABLE`    | `false`                        |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_VECTOR_DIMENSIONS: usize = 768;
pub const DEFAULT_DETECT_TOP_K: usize = 5;
pub const MAX_DETECT_TOP_K: usize = 100;
pub const DEFAULT_CLASS_INDEX_URL: &str =
    "https://storage.googleapis.com/download.tensorflow.org/data/imagenet_class_index.json";

/// 嵌入向量的生成策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStrategy {
    /// 直接使用模型输出的池化特征
    Pooled,
    /// 把模型输出当作 logits，做 softmax 归一化
    Softmax,
}

impl Default for EmbeddingStrategy {
    fn default() -> Self {
        EmbeddingStrategy::Pooled
    }
}

impl FromStr for EmbeddingStrategy {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "pooled" | "embedding" => Ok(EmbeddingStrategy::Pooled),
            "softmax" | "logits" => Ok(EmbeddingStrategy::Softmax),
            other => Err(AppError::Config(format!(
                "unknown EMBEDDING_STRATEGY: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for EmbeddingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingStrategy::Pooled => f.write_str("pooled"),
            EmbeddingStrategy::Softmax => f.write_str("softmax"),
        }
    }
}

/// 向量库后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Pinecone,
    Lancedb,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Pinecone
    }
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "pinecone" => Ok(StoreBackend::Pinecone),
            "lancedb" | "lance" => Ok(StoreBackend::Lancedb),
            other => Err(AppError::Config(format!("unknown VECTOR_STORE: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub use_custom_model: bool,
    pub custom_model_path: String,
    pub image_embedding_model: String,
    pub cache_dir: String,
    pub strategy: EmbeddingStrategy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            use_custom_model: false,
            custom_model_path: "models/mobilenet/model.onnx".to_string(),
            image_embedding_model: "Qdrant/Unicom-ViT-B-16".to_string(),
            cache_dir: ".fastembed_cache".to_string(),
            strategy: EmbeddingStrategy::Pooled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub api_key: String,
    pub index_name: String,
    pub controller_url: String,
    pub lancedb_path: String,
    pub create_table: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Pinecone,
            api_key: String::new(),
            index_name: String::new(),
            controller_url: "https://api.pinecone.io".to_string(),
            lancedb_path: "data/lancedb".to_string(),
            create_table: false,
        }
    }
}

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub verbose: bool,
    pub max_body_bytes: usize,
    pub vector_dimensions: usize,
    pub detect_top_k: usize,
    pub class_index_url: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            verbose: false,
            max_body_bytes: 10 * 1024 * 1024,
            vector_dimensions: DEFAULT_VECTOR_DIMENSIONS,
            detect_top_k: DEFAULT_DETECT_TOP_K,
            class_index_url: DEFAULT_CLASS_INDEX_URL.to_string(),
            model: ModelConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// 从环境变量加载配置（未设置的变量使用默认值）
    ///
    /// 枚举类变量写错时直接报错，而不是悄悄回退到默认值。
    pub fn from_env() -> AppResult<Self> {
        let defaults = ServiceConfig::default();
        let model_defaults = ModelConfig::default();
        let store_defaults = StoreConfig::default();

        let strategy = match env_opt("EMBEDDING_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => model_defaults.strategy,
        };
        let backend = match env_opt("VECTOR_STORE") {
            Some(raw) => raw.parse()?,
            None => store_defaults.backend,
        };
        let index_name = env_opt("PINECONE_INDEX_NAME")
            .or_else(|| env_opt("VECTOR_INDEX_NAME"))
            .unwrap_or_default();

        Ok(Self {
            host: env_str("HOST", &defaults.host),
            port: env_parse("PORT", defaults.port),
            verbose: env_bool("VERBOSE"),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            vector_dimensions: env_parse("VECTOR_DIMENSIONS", defaults.vector_dimensions)
                .max(1),
            detect_top_k: env_parse("DETECT_TOP_K", defaults.detect_top_k)
                .clamp(1, MAX_DETECT_TOP_K),
            class_index_url: env_str("CLASS_INDEX_URL", &defaults.class_index_url),
            model: ModelConfig {
                use_custom_model: env_bool("USE_CUSTOM_MODEL"),
                custom_model_path: env_str("CUSTOM_MODEL_PATH", &model_defaults.custom_model_path),
                image_embedding_model: env_str(
                    "IMAGE_EMBEDDING_MODEL",
                    &model_defaults.image_embedding_model,
                ),
                cache_dir: env_str("MODEL_CACHE_DIR", &model_defaults.cache_dir),
                strategy,
            },
            store: StoreConfig {
                backend,
                api_key: env_str("PINECONE_API_KEY", ""),
                index_name,
                controller_url: env_str("PINECONE_CONTROLLER_URL", &store_defaults.controller_url),
                lancedb_path: env_str("LANCEDB_PATH", &store_defaults.lancedb_path),
                create_table: env_bool("LANCEDB_CREATE_TABLE"),
            },
        })
    }

    /// 校验必填项，任何错误在启动阶段都是致命的
    pub fn validate(&self) -> AppResult<()> {
        if self.store.index_name.trim().is_empty() {
            return Err(AppError::Config(
                "PINECONE_INDEX_NAME is missing! Check your environment.".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Pinecone && self.store.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "PINECONE_API_KEY is missing! Check your environment.".to_string(),
            ));
        }
        if self.model.use_custom_model && self.model.custom_model_path.trim().is_empty() {
            return Err(AppError::Config(
                "USE_CUSTOM_MODEL is set but CUSTOM_MODEL_PATH is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// 默认日志过滤器：VERBOSE 打开时输出 debug 日志
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "visionvault=debug,tower_http=debug,info"
        } else {
            "info"
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_str(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    matches!(
        env_opt(key).map(|value| value.to_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}
