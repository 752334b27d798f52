//! # 仪器探测器表解析器
//!
//! 读取探测器像素位置表，用于构建仪器覆盖掩膜。
//!
//! ## 格式说明
//! ```text
//! id,x,y,z
//! 1,0.225,0.000,0.080
//! 2,0.225,0.003,0.080
//! ...
//! ```
//! 坐标单位为米，样品位于原点，入射束沿 +z。
//!
//! ## 依赖关系
//! - 被 `simulation/instrument.rs` 使用
//! - 使用 `csv` + `serde` 反序列化

use crate::error::{Result, SimError};

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 单个探测器像素
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DetectorPixel {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl DetectorPixel {
    /// 从样品指向像素的单位向量
    pub fn direction(&self) -> Option<[f64; 3]> {
        let r = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if r < 1e-12 || !r.is_finite() {
            None
        } else {
            Some([self.x / r, self.y / r, self.z / r])
        }
    }
}

/// 解析探测器表文件
pub fn parse_instrument_file(path: &Path) -> Result<Vec<DetectorPixel>> {
    if !path.is_file() {
        return Err(SimError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let content = fs::read_to_string(path).map_err(|e| SimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_instrument_content(&content, &path.display().to_string())
}

/// 解析探测器表文本，`name` 用于错误信息
pub fn parse_instrument_content(content: &str, name: &str) -> Result<Vec<DetectorPixel>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes());

    let mut pixels = Vec::new();
    for record in reader.deserialize() {
        let pixel: DetectorPixel = record.map_err(|e| SimError::ParseError {
            format: "instrument".to_string(),
            path: name.to_string(),
            reason: e.to_string(),
        })?;

        if pixel.direction().is_none() {
            return Err(SimError::ParseError {
                format: "instrument".to_string(),
                path: name.to_string(),
                reason: format!("detector {} sits at the sample position", pixel.id),
            });
        }
        pixels.push(pixel);
    }

    if pixels.is_empty() {
        return Err(SimError::ParseError {
            format: "instrument".to_string(),
            path: name.to_string(),
            reason: "no detector pixels".to_string(),
        });
    }

    Ok(pixels)
}
