//! # 反射生成器
//!
//! 给定晶体结构与 d 间距范围，枚举所有允许的 (hkl) 反射并计算 |F|²。
//!
//! ## 算法概述
//! 1. 由最小 d 间距确定 h, k, l 的搜索上限: |h| ≤ ⌈|a|/d_min⌉
//! 2. 按 h → k → l 顺序遍历，跳过 (0,0,0)
//! 3. 计算 d 间距并筛选 d_min ≤ d ≤ d_max
//! 4. 计算中子结构因子 F = Σ occ · b · exp(-8π²U·s²) · exp(2πi(hx+ky+lz))，s = 1/(2d)
//! 5. 丢弃 |F|² ≤ 0（系统消光）的反射
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 调用
//! - 使用 `models/structure.rs` 的 Crystal
//! - 使用 `crystal/scattering.rs` 获取散射长度

use crate::crystal::scattering;
use crate::error::{Result, SimError};
use crate::models::Crystal;

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 视为零的 |F|² 阈值（数值消光残差）
const ZERO_INTENSITY: f64 = 1e-10;

/// 单个 Bragg 反射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Miller 指数 (h, k, l)
    pub hkl: [i32; 3],
    /// |F|² (fm²)
    pub intensity: f64,
    /// d 间距（Å）
    pub d_spacing: f64,
}

impl Reflection {
    pub fn new(hkl: [i32; 3], intensity: f64, d_spacing: f64) -> Self {
        Self {
            hkl,
            intensity,
            d_spacing,
        }
    }
}

/// 反射来源：由晶体结构生成反射列表
pub trait ReflectionSource {
    /// 生成 `range` 范围内的所有 |F|² > 0 的反射
    fn generate(&self, crystal: &Crystal, range: (f64, f64)) -> Result<Vec<Reflection>>;
}

/// 基于运动学结构因子求和的反射生成器
#[derive(Debug, Clone, Default)]
pub struct StructureFactorGenerator;

impl StructureFactorGenerator {
    pub fn new() -> Self {
        Self
    }

    /// 计算单个反射的 |F|²
    fn structure_factor_squared(crystal: &Crystal, lengths: &[f64], hkl: [i32; 3], d: f64) -> f64 {
        let s_sq = 1.0 / (4.0 * d * d);
        let mut f_real = 0.0;
        let mut f_imag = 0.0;

        for (atom, b) in crystal.atoms.iter().zip(lengths) {
            let debye_waller = (-8.0 * PI * PI * atom.u_iso * s_sq).exp();
            let amplitude = atom.occupancy * b * debye_waller;

            let phase = 2.0
                * PI
                * (hkl[0] as f64 * atom.position[0]
                    + hkl[1] as f64 * atom.position[1]
                    + hkl[2] as f64 * atom.position[2]);

            f_real += amplitude * phase.cos();
            f_imag += amplitude * phase.sin();
        }

        f_real * f_real + f_imag * f_imag
    }
}

impl ReflectionSource for StructureFactorGenerator {
    fn generate(&self, crystal: &Crystal, range: (f64, f64)) -> Result<Vec<Reflection>> {
        let (d_min, d_max) = range;
        if !(d_min.is_finite() && d_max.is_finite()) || d_min <= 0.0 || d_max <= d_min {
            return Err(SimError::InvalidRange(format!(
                "({}, {}) (must be 0 < min < max)",
                d_min, d_max
            )));
        }

        if crystal.atoms.is_empty() {
            return Err(SimError::InvalidCrystal(format!(
                "'{}' has no atomic sites",
                crystal.name
            )));
        }

        if crystal.lattice.reciprocal().is_none() {
            return Err(SimError::InvalidCrystal(format!(
                "'{}' has a degenerate unit cell",
                crystal.name
            )));
        }

        // 预先查找散射长度，未知元素直接报错
        let lengths = crystal
            .atoms
            .iter()
            .map(|atom| {
                scattering::scattering_length(&atom.element).ok_or_else(|| {
                    SimError::InvalidCrystal(format!(
                        "No neutron scattering length for element '{}'",
                        atom.element
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let (a, b, c, _, _, _) = crystal.lattice.parameters();
        let limit = |len: f64| (len / d_min).ceil() as i32;
        let (h_max, k_max, l_max) = (limit(a), limit(b), limit(c));

        let mut reflections = Vec::new();

        for h in -h_max..=h_max {
            for k in -k_max..=k_max {
                for l in -l_max..=l_max {
                    let hkl = [h, k, l];
                    let d = match crystal.lattice.d_spacing(hkl) {
                        Some(d) => d,
                        None => continue,
                    };

                    if d < d_min || d > d_max {
                        continue;
                    }

                    let f_sq = Self::structure_factor_squared(crystal, &lengths, hkl, d);
                    if f_sq < ZERO_INTENSITY {
                        continue;
                    }

                    reflections.push(Reflection::new(hkl, f_sq, d));
                }
            }
        }

        log::debug!(
            "{}: {} reflections with d in [{}, {}] Å",
            crystal.name,
            reflections.len(),
            d_min,
            d_max
        );

        Ok(reflections)
    }
}
