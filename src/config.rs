//! # 模拟配置
//!
//! 从 JSON 文档读取模拟参数，一次性校验后生成不可变的 `SimulationConfig`，
//! 显式传递给每个组件。
//!
//! ## JSON 键
//! - `instrument_name`: 仪器名称
//! - `wavelength_range`: [min, max]
//! - `extents` / `md_extents`: [xmin, xmax, ymin, ymax, zmin, zmax] (Å⁻¹)
//! - `nbins`: 每个轴的分箱数（1..=`MAX_NBINS`）
//! - `temperature`: 温度 (K)
//! - `alpha` / `background_alpha`: Debye–Waller 系数
//! - 可选: `density_factor`, `peak_variance`, `count_scale`, `background_mean`,
//!   `background_std`, `dilation`, `seed`, `require_peaks`
//!
//! ## 依赖关系
//! - 被 `commands/` 加载
//! - 被 `simulation/` 所有组件读取
//! - 使用 `serde_json` 反序列化

use crate::error::{Result, SimError};
use crate::simulation::grid::Extents;
use crate::simulation::mask::Connectivity;

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 每轴分箱数上限；1024³ 个 f64 体素约 8 GiB
pub const MAX_NBINS: i64 = 1024;

/// 原始（未校验）配置，字段缺省值取自 SXD 默认参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub instrument_name: String,
    pub wavelength_range: Vec<f64>,
    #[serde(alias = "md_extents")]
    pub extents: Vec<f64>,
    pub nbins: i64,
    pub temperature: f64,
    #[serde(alias = "background_alpha")]
    pub alpha: f64,
    pub density_factor: f64,
    pub peak_variance: f64,
    pub count_scale: f64,
    pub background_mean: f64,
    pub background_std: f64,
    pub dilation: Connectivity,
    pub seed: Option<u64>,
    pub require_peaks: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            instrument_name: "SXD".to_string(),
            wavelength_range: vec![0.5, 10.0],
            extents: vec![-17.0, 17.0, -7.0, 17.0, 0.0, 33.0],
            nbins: 300,
            temperature: 50.0,
            alpha: 0.3e-3,
            density_factor: 0.1,
            peak_variance: 0.003,
            count_scale: 100.0,
            background_mean: 5.0,
            background_std: 3.0,
            dilation: Connectivity::Face,
            seed: None,
            require_peaks: false,
        }
    }
}

impl RawConfig {
    /// 从 JSON 文件读取
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SimError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| SimError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_json(&content).map_err(|e| match e {
            SimError::ParseError { format, reason, .. } => SimError::ParseError {
                format,
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// 从 JSON 字符串读取
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| SimError::ParseError {
            format: "config".to_string(),
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// 校验全部字段，返回不可变配置；一次性列出所有违反项
    pub fn validate(self) -> Result<SimulationConfig> {
        let mut violations = Vec::new();

        if self.instrument_name.trim().is_empty() {
            violations.push("instrument_name must not be empty".to_string());
        }

        let wavelength_range = match self.wavelength_range.as_slice() {
            [min, max] => {
                if !(min.is_finite() && max.is_finite()) || *min <= 0.0 || *max <= 0.0 {
                    violations.push(format!(
                        "wavelength_range values must be positive and finite (got [{}, {}])",
                        min, max
                    ));
                } else if min >= max {
                    violations.push(format!(
                        "wavelength_range must satisfy min < max (got [{}, {}])",
                        min, max
                    ));
                }
                (*min, *max)
            }
            other => {
                violations.push(format!(
                    "wavelength_range needs exactly 2 values (got {})",
                    other.len()
                ));
                (0.0, 0.0)
            }
        };

        let extents = match Extents::from_slice(&self.extents) {
            Ok(extents) => Some(extents),
            Err(reasons) => {
                violations.extend(reasons);
                None
            }
        };

        if self.nbins <= 0 {
            violations.push(format!("nbins must be a positive integer (got {})", self.nbins));
        } else if self.nbins > MAX_NBINS {
            violations.push(format!(
                "nbins must not exceed {} (got {})",
                MAX_NBINS, self.nbins
            ));
        }

        let mut non_negative = |name: &str, value: f64| {
            if !value.is_finite() || value < 0.0 {
                violations.push(format!("{} must be finite and >= 0 (got {})", name, value));
            }
        };
        non_negative("temperature", self.temperature);
        non_negative("alpha", self.alpha);
        non_negative("background_std", self.background_std);

        let mut positive = |name: &str, value: f64| {
            if !value.is_finite() || value <= 0.0 {
                violations.push(format!("{} must be finite and > 0 (got {})", name, value));
            }
        };
        positive("density_factor", self.density_factor);
        positive("peak_variance", self.peak_variance);
        positive("count_scale", self.count_scale);

        if !self.background_mean.is_finite() {
            violations.push(format!(
                "background_mean must be finite (got {})",
                self.background_mean
            ));
        }

        match extents {
            Some(extents) if violations.is_empty() => Ok(SimulationConfig {
                instrument_name: self.instrument_name,
                wavelength_range,
                extents,
                nbins: self.nbins as usize,
                temperature: self.temperature,
                alpha: self.alpha,
                density_factor: self.density_factor,
                peak_variance: self.peak_variance,
                count_scale: self.count_scale,
                background_mean: self.background_mean,
                background_std: self.background_std,
                dilation: self.dilation,
                seed: self.seed,
                require_peaks: self.require_peaks,
            }),
            _ => Err(SimError::ConfigValidation(violations)),
        }
    }
}

/// 校验后的不可变模拟配置
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    instrument_name: String,
    wavelength_range: (f64, f64),
    extents: Extents,
    nbins: usize,
    temperature: f64,
    alpha: f64,
    density_factor: f64,
    peak_variance: f64,
    count_scale: f64,
    background_mean: f64,
    background_std: f64,
    dilation: Connectivity,
    seed: Option<u64>,
    require_peaks: bool,
}

impl SimulationConfig {
    pub fn instrument_name(&self) -> &str {
        &self.instrument_name
    }

    /// 反射生成与掩膜构建使用的 (min, max) 范围
    pub fn wavelength_range(&self) -> (f64, f64) {
        self.wavelength_range
    }

    pub fn extents(&self) -> &Extents {
        &self.extents
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    /// 温度 (K)
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Debye–Waller 背景系数
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// 每单位 |F|² 的采样点数
    pub fn density_factor(&self) -> f64 {
        self.density_factor
    }

    /// 峰展宽（各向同性协方差对角元）
    pub fn peak_variance(&self) -> f64 {
        self.peak_variance
    }

    /// 直方图计数缩放
    pub fn count_scale(&self) -> f64 {
        self.count_scale
    }

    pub fn background_mean(&self) -> f64 {
        self.background_mean
    }

    pub fn background_std(&self) -> f64 {
        self.background_std
    }

    pub fn dilation(&self) -> Connectivity {
        self.dilation
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn require_peaks(&self) -> bool {
        self.require_peaks
    }
}
