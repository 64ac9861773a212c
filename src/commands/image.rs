// 图片训练 / 识别路由
//
// `/train` 和 `/detect` 按路由区分，`/api/image` 按 stage 字段区分，最终走同一条流水线

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::{
    ApiError, DetectRequest, DetectResponse, ImageRequest, TrainRequest, TrainResponse, ValidJson,
};
use crate::services::vision::pipeline::PipelineStage;
use crate::services::Stage;
use crate::utils::validation::{parse_stage, require_all};
use crate::AppState;

const TRAIN_FAILED: &str = "Training failed!";
const DETECT_FAILED: &str = "Detection failed!";
const MISSING_TRAIN_FIELDS: &str = "Missing data, label, or user!";
const MISSING_DETECT_FIELDS: &str = "Missing image or user!";
const MISSING_IMAGE_FIELDS: &str = "Missing required fields: data, user, stage.";
const TRAIN_COMPLETED: &str = "Training completed successfully!";

async fn run_train(
    state: &AppState,
    data: Option<&str>,
    label: Option<&str>,
    user: Option<&str>,
) -> Result<TrainResponse, ApiError> {
    tracing::debug!(stage = %PipelineStage::Validating, "Validating train request");
    let [data, label, user] = require_all([data, label, user], MISSING_TRAIN_FIELDS)
        .map_err(|e| ApiError::new(TRAIN_FAILED, e))?;

    let id = state
        .pipeline
        .train(data, label, user)
        .await
        .map_err(|e| ApiError::new(TRAIN_FAILED, e))?;

    Ok(TrainResponse {
        message: TRAIN_COMPLETED.to_string(),
        id,
    })
}

async fn run_detect(
    state: &AppState,
    data: Option<&str>,
    user: Option<&str>,
    top_k: Option<usize>,
) -> Result<DetectResponse, ApiError> {
    tracing::debug!(stage = %PipelineStage::Validating, "Validating detect request");
    let [data, user] = require_all([data, user], MISSING_DETECT_FIELDS)
        .map_err(|e| ApiError::new(DETECT_FAILED, e))?;

    let detection = state
        .pipeline
        .detect(data, user, top_k)
        .await
        .map_err(|e| ApiError::new(DETECT_FAILED, e))?;

    Ok(detection.into())
}

/// 训练：保存一条带标签的图片向量
pub async fn train_image(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    run_train(
        &state,
        req.data.as_deref(),
        req.label.as_deref(),
        req.user.as_deref(),
    )
    .await
    .map(Json)
}

/// 识别：在用户自己的命名空间里查最相近的标签
pub async fn detect_image(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    run_detect(&state, req.data.as_deref(), req.user.as_deref(), req.top_k)
        .await
        .map(Json)
}

/// `/api/image`：按 stage 分发
pub async fn process_image(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ImageRequest>,
) -> Result<Response, ApiError> {
    let [_, _, stage] = require_all(
        [req.data.as_deref(), req.user.as_deref(), req.stage.as_deref()],
        MISSING_IMAGE_FIELDS,
    )
    .map_err(|e| ApiError::new(TRAIN_FAILED, e))?;
    let stage = parse_stage(stage).map_err(|e| ApiError::new(TRAIN_FAILED, e))?;

    tracing::debug!(?stage, "Dispatching /api/image");
    match stage {
        Stage::Train => {
            let response = run_train(
                &state,
                req.data.as_deref(),
                req.label.as_deref(),
                req.user.as_deref(),
            )
            .await?;
            Ok(Json(response).into_response())
        }
        Stage::Detect => {
            let response =
                run_detect(&state, req.data.as_deref(), req.user.as_deref(), req.top_k).await?;
            Ok(Json(response).into_response())
        }
    }
}
