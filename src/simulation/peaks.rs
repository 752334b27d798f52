//! # 峰列表
//!
//! 将通过掩膜门控的反射与 UB 矩阵打包，不做额外计算。
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 构建
//! - 被 `simulation/export.rs` 写出

use crate::crystal::{OrientationMatrix, Reflection};
use crate::error::{Result, SimError};

/// 观测峰列表（构造后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct PeakList {
    ub: OrientationMatrix,
    reflections: Vec<Reflection>,
}

impl PeakList {
    pub fn ub(&self) -> &OrientationMatrix {
        &self.ub
    }

    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    pub fn len(&self) -> usize {
        self.reflections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty()
    }
}

/// 峰列表构建器
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakListBuilder {
    require_peaks: bool,
}

impl PeakListBuilder {
    /// `require_peaks` 为真时空列表视为错误
    pub fn new(require_peaks: bool) -> Self {
        Self { require_peaks }
    }

    pub fn build(
        &self,
        filtered: Vec<Reflection>,
        ub: OrientationMatrix,
        crystal: &str,
    ) -> Result<PeakList> {
        if filtered.is_empty() {
            if self.require_peaks {
                return Err(SimError::EmptyPeakList {
                    crystal: crystal.to_string(),
                });
            }
            log::warn!("No peaks survived the instrument mask for '{}'", crystal);
        }

        Ok(PeakList {
            ub,
            reflections: filtered,
        })
    }
}
