pub mod app_state;
pub mod commands;
pub mod error;
pub mod services;
pub mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use app_state::AppState;
pub use error::{AppError, AppResult};

use services::{
    connect_store, ClassLabels, EmbeddingService, ImagePipeline, ServiceConfig, MAX_DETECT_TOP_K,
};

/// 构建 HTTP 路由
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(commands::health))
        .route("/ready", get(commands::ready))
        .route("/train", post(commands::train_image))
        .route("/detect", post(commands::detect_image))
        .route("/api/image", post(commands::process_image))
        .route("/user", delete(commands::delete_user))
        .with_state(state)
        // base64 图片体积较大，用 tower-http 的限制替代 axum 默认的 2MB
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// 启动服务：加载标签和模型、绑定向量库，然后开始监听
///
/// 任何一步失败都直接返回错误，进程以非零状态退出。
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;

    let client = reqwest::Client::new();
    let labels = Arc::new(ClassLabels::load(&client, &config.class_index_url).await);

    let embedding = Arc::new(EmbeddingService::new(
        config.model.clone(),
        config.vector_dimensions,
        labels.clone(),
    ));

    let (_, store) = tokio::try_join!(
        embedding.load(),
        connect_store(&config.store, config.vector_dimensions)
    )?;

    let pipeline = ImagePipeline::new(
        embedding,
        store,
        config.vector_dimensions,
        config.detect_top_k,
        MAX_DETECT_TOP_K,
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        labels,
    };
    let router = build_router(state, config.max_body_bytes);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        addr = %addr,
        store = ?config.store.backend,
        dimensions = config.vector_dimensions,
        "Server running"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received SIGINT, shutting down gracefully");
}
