// 用户命名空间删除

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::types::{DeleteUserQuery, MessageResponse};
use crate::utils::validation::non_blank;
use crate::AppState;

/// 删除某个用户的全部向量
pub async fn delete_user(
    State(state): State<AppState>,
    Query(query): Query<DeleteUserQuery>,
) -> (StatusCode, Json<MessageResponse>) {
    let Some(user) = non_blank(query.user.as_deref()) else {
        return (StatusCode::BAD_REQUEST, Json(MessageResponse::new("missing user")));
    };

    match state.pipeline.delete_user(user).await {
        Ok(()) => (StatusCode::OK, Json(MessageResponse::new("success"))),
        Err(err) => {
            tracing::error!(error = %err, "Failed to delete user namespace");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse::new("failed to delete user namespace")),
            )
        }
    }
}
