//! 图片路由类型

use serde::{Deserialize, Serialize};

use crate::services::vision::pipeline::{UNKNOWN_OBJECT, ZERO_CONFIDENCE};
use crate::services::{Detection, LabelConfidence};

/// `POST /train`
#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    pub data: Option<String>,
    pub label: Option<String>,
    pub user: Option<String>,
}

/// 训练响应
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub message: String,
    pub id: String,
}

/// `POST /detect`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub data: Option<String>,
    pub user: Option<String>,
    pub top_k: Option<usize>,
}

/// `POST /api/image`，由 `stage` 决定走训练还是识别
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub data: Option<String>,
    pub user: Option<String>,
    pub stage: Option<String>,
    pub label: Option<String>,
    pub top_k: Option<usize>,
}

/// 识别响应：有匹配时返回排序后的列表，否则返回 "Unknown Object"
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DetectResponse {
    Matches {
        matches: Vec<LabelConfidence>,
    },
    #[serde(rename_all = "camelCase")]
    Unknown {
        detected_label: String,
        confidence: String,
    },
}

impl From<Detection> for DetectResponse {
    fn from(detection: Detection) -> Self {
        match detection {
            Detection::Matches(matches) => DetectResponse::Matches { matches },
            Detection::Unknown => DetectResponse::Unknown {
                detected_label: UNKNOWN_OBJECT.to_string(),
                confidence: ZERO_CONFIDENCE.to_string(),
            },
        }
    }
}
