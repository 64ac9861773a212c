use axum::extract::State;
use axum::Json;

use super::types::ReadyResponse;
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

/// 模型已加载、向量库已绑定时返回 ready
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let pipeline = &state.pipeline;
    Json(ReadyResponse {
        status: "ready",
        model: pipeline.extractor().describe(),
        store: pipeline.store().backend(),
        dimensions: pipeline.dimensions(),
        labels: state.labels.len(),
    })
}
