//! # UB 取向矩阵
//!
//! UB 将 Miller 指数映射到实验室坐标系倒空间：Q_lab = 2π · UB · (h, k, l)ᵀ。
//! 默认取向 U = I，B 为 Busing–Levy 约定下的倒格矩阵。
//!
//! ## 依赖关系
//! - 使用 `models/structure.rs` 的 Lattice
//! - 被 `simulation/` 的光栅化、掩膜门控和导出使用

use crate::error::{Result, SimError};
use crate::models::Lattice;

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 3x3 取向矩阵（行主序）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationMatrix(pub [[f64; 3]; 3]);

impl OrientationMatrix {
    #[cfg(test)]
    pub fn identity() -> Self {
        OrientationMatrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// 由晶胞构造默认（未精修）UB：U = I，UB = B
    ///
    /// ```text
    /// B = | a*   b* cos γ*    c* cos β*          |
    ///     | 0    b* sin γ*   -c* sin β* cos α    |
    ///     | 0    0            1/c                |
    /// ```
    pub fn from_lattice(lattice: &Lattice) -> Result<Self> {
        let (_, _, c, alpha, _, _) = lattice.parameters();
        let (a_s, b_s, c_s, _, beta_s, gamma_s) = lattice
            .reciprocal_parameters()
            .ok_or_else(|| SimError::InvalidCrystal("Degenerate unit cell (zero volume)".into()))?;

        let (beta_s, gamma_s) = (beta_s.to_radians(), gamma_s.to_radians());
        let alpha = alpha.to_radians();

        let ub = [
            [a_s, b_s * gamma_s.cos(), c_s * beta_s.cos()],
            [0.0, b_s * gamma_s.sin(), -c_s * beta_s.sin() * alpha.cos()],
            [0.0, 0.0, 1.0 / c],
        ];

        if ub.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SimError::InvalidCrystal(
                "Unit cell parameters produce a non-finite UB matrix".into(),
            ));
        }

        Ok(OrientationMatrix(ub))
    }

    /// UB · hkl
    pub fn apply(&self, hkl: [i32; 3]) -> [f64; 3] {
        let m = &self.0;
        let v = [hkl[0] as f64, hkl[1] as f64, hkl[2] as f64];
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    /// 实验室坐标系动量转移 Q = 2π · UB · hkl (Å⁻¹)
    pub fn q_lab(&self, hkl: [i32; 3]) -> [f64; 3] {
        let v = self.apply(hkl);
        [2.0 * PI * v[0], 2.0 * PI * v[1], 2.0 * PI * v[2]]
    }

    /// 转置矩阵（ISAW 文件按列存储）
    pub fn transposed(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ]
    }
}
