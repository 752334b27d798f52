//! # 热背景合成
//!
//! 每个体素独立抽取高斯噪声，再乘以 Debye–Waller 型衰减权重：
//! `weight = exp(-(alpha · T · q²) / 2)`，q² 由各轴体素中心计算。
//!
//! ## 轴顺序
//! 体素 (i, j, k) 使用 `cx[i]² + cy[j]² + cz[k]²`，与信号体积对齐。
//! 以 (y, z, x) 顺序做 `xy` 网格再转置得到的正是这一顺序。
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 调用
//! - 使用 `rand_distr::Normal`

use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::simulation::grid::Grid;

use ndarray::Array3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// 背景合成器
#[derive(Debug, Clone, Copy)]
pub struct BackgroundSynthesizer {
    temperature: f64,
    alpha: f64,
    mean: f64,
    std_dev: f64,
}

impl BackgroundSynthesizer {
    pub fn new(temperature: f64, alpha: f64, mean: f64, std_dev: f64) -> Self {
        Self {
            temperature,
            alpha,
            mean,
            std_dev,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.temperature(),
            config.alpha(),
            config.background_mean(),
            config.background_std(),
        )
    }

    /// Debye–Waller 权重场
    pub fn weights(&self, grid: &Grid) -> Array3<f64> {
        let squares: Vec<Vec<f64>> = (0..3)
            .map(|axis| grid.centers(axis).iter().map(|c| c * c).collect())
            .collect();
        let factor = self.alpha * self.temperature;

        Array3::from_shape_fn(grid.shape(), |(i, j, k)| {
            let q_sq = squares[0][i] + squares[1][j] + squares[2][k];
            (-(factor * q_sq) / 2.0).exp()
        })
    }

    /// 生成背景体积；数值可为负
    pub fn synthesize<R: Rng + ?Sized>(&self, grid: &Grid, rng: &mut R) -> Result<Array3<f64>> {
        let noise_model = Normal::new(self.mean, self.std_dev).map_err(|e| {
            SimError::InvalidRange(format!(
                "background noise N({}, {}) is not usable: {}",
                self.mean, self.std_dev, e
            ))
        })?;

        let noise = Array3::from_shape_fn(grid.shape(), |_| noise_model.sample(rng));
        Ok(noise * &self.weights(grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::Extents;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid(bounds: [f64; 6], nbins: usize) -> Grid {
        Grid::new(Extents::from_slice(&bounds).unwrap(), nbins)
    }

    #[test]
    fn test_zero_temperature_returns_raw_noise() {
        let g = grid([-5.0, 5.0, -5.0, 5.0, 0.0, 10.0], 6);
        let synth = BackgroundSynthesizer::new(0.0, 0.3e-3, 5.0, 3.0);

        let background = synth.synthesize(&g, &mut StdRng::seed_from_u64(9)).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let normal = Normal::new(5.0, 3.0).unwrap();
        let raw = Array3::from_shape_fn((6, 6, 6), |_| normal.sample(&mut rng));

        assert!(synth.weights(&g).iter().all(|&w| w == 1.0));
        assert_eq!(background, raw);
    }

    #[test]
    fn test_weight_decreases_with_q() {
        let g = grid([-10.0, 10.0, -10.0, 10.0, -10.0, 10.0], 10);
        let w = BackgroundSynthesizer::new(300.0, 1e-3, 5.0, 3.0).weights(&g);

        assert!(w[[5, 5, 5]] > w[[7, 5, 5]]);
        assert!(w[[7, 5, 5]] > w[[9, 5, 5]]);
        assert!(w.iter().all(|&v| v > 0.0 && v <= 1.0));
    }

    #[test]
    fn test_weight_axes_follow_signal_order() {
        // 非对称范围：各轴中心不同，检查体素 (i, j, k) 对应 (x, y, z)
        let g = grid([0.0, 2.0, 10.0, 12.0, 20.0, 22.0], 2);
        let synth = BackgroundSynthesizer::new(1.0, 0.01, 0.0, 1.0);
        let w = synth.weights(&g);

        let (cx, cy, cz) = (g.center(0, 1), g.center(1, 0), g.center(2, 1));
        let expected = (-(0.01 * (cx * cx + cy * cy + cz * cz)) / 2.0).exp();
        assert!((w[[1, 0, 1]] - expected).abs() < 1e-15);
    }

    #[test]
    fn test_background_can_be_negative() {
        let g = grid([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0], 8);
        let synth = BackgroundSynthesizer::new(50.0, 0.3e-3, 0.0, 3.0);
        let background = synth.synthesize(&g, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(background.iter().any(|&v| v < 0.0));
    }

    #[test]
    fn test_invalid_std_is_rejected() {
        let g = grid([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0], 2);
        let synth = BackgroundSynthesizer::new(50.0, 0.3e-3, 5.0, -1.0);
        assert!(synth.synthesize(&g, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
