//! 统一错误类型定义
//!
//! 使用 `thiserror` 定义 `AppError` 枚举和 `AppResult` 类型别名，
//! 每个变体对应请求流水线里的一类失败，并决定返回给客户端的 HTTP 状态码。

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// 应用级统一错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求字段缺失或不合法
    #[error("{0}")]
    Validation(String),

    /// 模型尚未加载就调用了推理
    #[error("Model not loaded yet! Ensure `load()` is called at startup.")]
    ModelNotReady,

    /// 图片解码失败、模型输出形状未知等推理错误
    #[error("{0}")]
    Inference(String),

    /// 向量库 upsert / query / delete 失败
    #[error("{0}")]
    Store(String),

    /// 配置错误（启动阶段为致命错误）
    #[error("configuration error: {0}")]
    Config(String),

    /// 外部 HTTP 调用错误
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// 错误类型标签，用于序列化和日志
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::ModelNotReady => "model_not_ready",
            AppError::Inference(_) => "inference",
            AppError::Store(_) => "store",
            AppError::Config(_) => "config",
            AppError::Http(_) => "http",
        }
    }

    /// 映射到 HTTP 状态码：只有校验错误是 400，其余一律 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ========== Serialize 实现：输出 {type, message} ==========

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("type", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// 应用级 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

// ========== 扩展 trait：为 Result 添加上下文方法 ==========

/// 为 Result 类型添加错误上下文转换方法
pub trait ResultExt<T> {
    /// 将错误转换为推理错误
    fn inference_err(self, msg: &str) -> AppResult<T>;

    /// 将错误转换为向量库错误
    fn store_err(self, msg: &str) -> AppResult<T>;

    /// 将错误转换为配置错误
    fn config_err(self, msg: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn inference_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Inference(format!("{}: {}", msg, e)))
    }

    fn store_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Store(format!("{}: {}", msg, e)))
    }

    fn config_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Config(format!("{}: {}", msg, e)))
    }
}
