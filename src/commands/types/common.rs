//! 通用路由类型

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;

/// `DELETE /user?user=<id>`
#[derive(Debug, Default, Deserialize)]
pub struct DeleteUserQuery {
    pub user: Option<String>,
}

/// `{message}` 响应
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `GET /ready`
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub model: String,
    pub store: &'static str,
    pub dimensions: usize,
    pub labels: usize,
}

/// 路由层错误：带上失败场景（如 "Training failed!"）
///
/// - 校验错误 → 400 `{error}`
/// - 模型未加载 → 500 `{error: "Model not loaded yet!"}`
/// - 其他 → 500 `{error: context, details}`
#[derive(Debug)]
pub struct ApiError {
    context: &'static str,
    error: AppError,
}

impl ApiError {
    pub fn new(context: &'static str, error: AppError) -> Self {
        Self { context, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = match &self.error {
            AppError::Validation(message) => json!({ "error": message }),
            AppError::ModelNotReady => json!({ "error": "Model not loaded yet!" }),
            other => {
                tracing::error!(error = %other, kind = other.kind(), "{}", self.context);
                json!({ "error": self.context, "details": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// JSON 请求体；类型不符、JSON 损坏或 Content-Type 不对时按校验错误返回 400 `{error}`
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), "Rejected request body");
                Err(ApiError::new(
                    "Invalid request body",
                    AppError::Validation(rejection.body_text()),
                ))
            }
        }
    }
}
