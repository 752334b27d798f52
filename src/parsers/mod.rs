//! # 解析器模块
//!
//! 提供晶体结构文件与仪器探测器表的解析器。
//!
//! ## 依赖关系
//! - 被 `simulation/` 和 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: cif, symmetry, instrument

pub mod cif;
pub mod instrument;
pub mod symmetry;

use crate::error::{Result, SimError};
use crate::models::Crystal;
use std::path::Path;

/// 从文件路径推断格式并解析
pub fn parse_structure_file(path: &Path) -> Result<Crystal> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cif" => cif::parse_cif_file(path),
        _ => Err(SimError::UnsupportedFormat(format!(
            "Cannot determine format for: {} (expected .cif)",
            path.display()
        ))),
    }
}
