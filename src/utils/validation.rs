//! 通用验证函数
//!
//! 提供集中的验证逻辑，避免在命令层重复验证代码

use crate::error::{AppError, AppResult};
use crate::services::Stage;

/// 取出非空字段
///
/// 缺失、空串和纯空白都视为未提供，返回 trim 后的字符串引用
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// 所有字段都必须非空，否则返回固定的校验错误信息
pub fn require_all<'a, const N: usize>(
    values: [Option<&'a str>; N],
    message: &str,
) -> AppResult<[&'a str; N]> {
    let mut out = [""; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = non_blank(value).ok_or_else(|| AppError::Validation(message.to_string()))?;
    }
    Ok(out)
}

/// 解析 `/api/image` 的 stage 字段
pub fn parse_stage(raw: &str) -> AppResult<Stage> {
    match raw.trim() {
        "train" => Ok(Stage::Train),
        "detect" => Ok(Stage::Detect),
        _ => Err(AppError::Validation("Invalid stage specified.".to_string())),
    }
}

/// 验证限制值范围
pub fn validate_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).max(1).min(max)
}
