//! 路由类型模块
//!
//! 拆分为两个子模块：
//! - `image`: train / detect / api/image 请求与响应
//! - `common`: 通用响应和错误映射

mod common;
mod image;

// 导出图片相关类型
pub use image::{DetectRequest, DetectResponse, ImageRequest, TrainRequest, TrainResponse};

// 导出通用类型
pub use common::{ApiError, DeleteUserQuery, MessageResponse, ReadyResponse, ValidJson};
