//! # 峰光栅化
//!
//! 用 Monte-Carlo 采样把反射列表转成三维 Q 空间直方图。
//!
//! ## 算法
//! 1. 每个反射 Q = 2π · UB · hkl
//! 2. 采样数 = ⌊density_factor · |F|²⌋，从以 Q 为中心、对角协方差
//!    `peak_variance` 的三维高斯分布抽样
//! 3. 全部样本按直方图语义分箱（超出范围的点丢弃）
//! 4. 乘以 `count_scale` 近似中子计数量级
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 调用
//! - 使用 `simulation/grid.rs` 分箱
//! - 使用 `rand` / `rand_distr` 抽样

use crate::config::SimulationConfig;
use crate::crystal::{OrientationMatrix, Reflection};
use crate::error::{Result, SimError};
use crate::simulation::grid::Grid;

use ndarray::Array3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// 单个反射的采样数上限
pub const MAX_SAMPLES_PER_REFLECTION: usize = 10_000_000;

/// 光栅化结果
#[derive(Debug, Clone)]
pub struct Raster {
    /// 信号体积（已缩放）
    pub volume: Array3<f64>,
    /// 抽取的样本总数
    pub samples_drawn: usize,
    /// 落入网格的样本数
    pub samples_binned: usize,
}

/// 峰光栅化器
#[derive(Debug, Clone, Copy)]
pub struct PeakRasterizer {
    density_factor: f64,
    peak_variance: f64,
    count_scale: f64,
}

impl PeakRasterizer {
    pub fn new(density_factor: f64, peak_variance: f64, count_scale: f64) -> Self {
        Self {
            density_factor,
            peak_variance,
            count_scale,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.density_factor(),
            config.peak_variance(),
            config.count_scale(),
        )
    }

    /// 单个反射的采样数，截断到 `MAX_SAMPLES_PER_REFLECTION`
    pub fn sample_size(&self, intensity: f64) -> usize {
        let n = (self.density_factor * intensity).floor();
        if n.is_nan() || n <= 0.0 {
            0
        } else if n >= MAX_SAMPLES_PER_REFLECTION as f64 {
            MAX_SAMPLES_PER_REFLECTION
        } else {
            n as usize
        }
    }

    /// 光栅化反射列表
    pub fn rasterize<R: Rng + ?Sized>(
        &self,
        reflections: &[Reflection],
        ub: &OrientationMatrix,
        grid: &Grid,
        rng: &mut R,
    ) -> Result<Raster> {
        if !(self.count_scale.is_finite() && self.count_scale > 0.0) {
            return Err(SimError::InvalidRange(format!(
                "count_scale must be positive (got {})",
                self.count_scale
            )));
        }
        let spread = Normal::new(0.0, self.peak_variance.sqrt()).map_err(|e| {
            SimError::InvalidRange(format!(
                "peak_variance {} is not usable: {}",
                self.peak_variance, e
            ))
        })?;

        let mut counts = Array3::<f64>::zeros(grid.shape());
        let mut samples_drawn = 0;
        let mut samples_binned = 0;

        for reflection in reflections {
            let n = self.sample_size(reflection.intensity);
            if n == 0 {
                continue;
            }
            if n == MAX_SAMPLES_PER_REFLECTION {
                log::warn!(
                    "Reflection {:?} (|F|² = {:e}) capped at {} samples",
                    reflection.hkl,
                    reflection.intensity,
                    MAX_SAMPLES_PER_REFLECTION
                );
            }

            let center = ub.q_lab(reflection.hkl);
            for _ in 0..n {
                let point = [
                    center[0] + spread.sample(rng),
                    center[1] + spread.sample(rng),
                    center[2] + spread.sample(rng),
                ];
                samples_drawn += 1;

                if let Some((i, j, k)) = grid.histogram_index(&point) {
                    counts[[i, j, k]] += 1.0;
                    samples_binned += 1;
                }
            }
        }

        log::debug!(
            "Rasterized {} reflections: {} samples drawn, {} binned",
            reflections.len(),
            samples_drawn,
            samples_binned
        );

        counts *= self.count_scale;

        Ok(Raster {
            volume: counts,
            samples_drawn,
            samples_binned,
        })
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

    fn rasterizer() -> PeakRasterizer {
        PeakRasterizer::new(0.1, 0.003, 100.0)
    }

    #[test]
    fn test_sample_size_floors() {
        let r = rasterizer();
        assert_eq!(r.sample_size(10.0), 1);
        assert_eq!(r.sample_size(9.99), 0);
        assert_eq!(r.sample_size(255.0), 25);
        assert_eq!(r.sample_size(0.0), 0);
        assert_eq!(r.sample_size(f64::NAN), 0);
    }

    #[test]
    fn test_sample_size_is_capped() {
        let r = PeakRasterizer::new(1e6, 0.003, 100.0);
        assert_eq!(r.sample_size(1e300), MAX_SAMPLES_PER_REFLECTION);
        assert_eq!(r.sample_size(f64::INFINITY), MAX_SAMPLES_PER_REFLECTION);
        assert_eq!(r.sample_size(9.0), 9_000_000);
    }

    #[test]
    fn test_out_of_extent_peak_leaves_empty_histogram() {
        // Q = (2π, 0, 0) 远在 [-1, 1]³ 之外
        let g = grid([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0], 2);
        let reflections = vec![Reflection::new([1, 0, 0], 10.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(7);

        let raster = rasterizer()
            .rasterize(&reflections, &OrientationMatrix::identity(), &g, &mut rng)
            .unwrap();

        assert_eq!(raster.samples_drawn, 1);
        assert_eq!(raster.samples_binned, 0);
        assert_eq!(raster.volume.shape(), &[2, 2, 2]);
        assert!(raster.volume.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_counts_are_conserved_inside_extents() {
        let g = grid([-10.0, 10.0, -10.0, 10.0, -10.0, 10.0], 20);
        let reflections = vec![
            Reflection::new([1, 0, 0], 120.0, 1.0),
            Reflection::new([0, 1, 0], 57.0, 1.0),
            Reflection::new([0, 0, -1], 3.0, 1.0),
        ];
        let mut rng = StdRng::seed_from_u64(11);

        let raster = rasterizer()
            .rasterize(&reflections, &OrientationMatrix::identity(), &g, &mut rng)
            .unwrap();

        assert_eq!(raster.samples_drawn, 12 + 5);
        assert_eq!(raster.samples_binned, raster.samples_drawn);
        assert_eq!(raster.volume.sum() / 100.0, raster.samples_binned as f64);
        assert!(raster.volume.iter().all(|&v| v >= 0.0 && v % 100.0 == 0.0));
    }

    #[test]
    fn test_partial_dropout_bounds_histogram() {
        // 只有 +x 方向的峰在范围内
        let g = grid([0.0, 10.0, -1.0, 1.0, -1.0, 1.0], 10);
        let reflections = vec![
            Reflection::new([1, 0, 0], 100.0, 1.0),
            Reflection::new([-1, 0, 0], 100.0, 1.0),
        ];
        let mut rng = StdRng::seed_from_u64(3);

        let raster = rasterizer()
            .rasterize(&reflections, &OrientationMatrix::identity(), &g, &mut rng)
            .unwrap();

        assert_eq!(raster.samples_drawn, 20);
        assert!(raster.samples_binned <= raster.samples_drawn);
        assert!(raster.samples_binned < 20);
        assert_eq!(raster.volume.sum(), raster.samples_binned as f64 * 100.0);
    }

    #[test]
    fn test_same_seed_same_volume() {
        let g = grid([-8.0, 8.0, -8.0, 8.0, -8.0, 8.0], 16);
        let reflections = vec![Reflection::new([1, 1, 0], 400.0, 1.0)];
        let ub = OrientationMatrix::identity();

        let a = rasterizer()
            .rasterize(&reflections, &ub, &g, &mut StdRng::seed_from_u64(5))
            .unwrap();
        let b = rasterizer()
            .rasterize(&reflections, &ub, &g, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a.volume, b.volume);
    }

    #[test]
    fn test_bad_variance_is_rejected() {
        let g = grid([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0], 2);
        let r = PeakRasterizer::new(0.1, f64::NAN, 100.0);
        let mut rng = StdRng::seed_from_u64(1);
        let result = r.rasterize(&[], &OrientationMatrix::identity(), &g, &mut rng);
        assert!(matches!(result, Err(SimError::InvalidRange(_))));
    }
}
