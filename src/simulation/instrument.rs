//! # 仪器覆盖掩膜构建
//!
//! 由探测器像素表构建 `MaskVolume`。
//!
//! ## 算法
//! 入射束沿 +z，像素方向为单位向量 d̂，散射矢量方向 s = ẑ − d̂。
//! 在波段 [λmin, λmax] 内扫描 k = 2π/λ，Q = k · s；相邻 Q 点间距不超过
//! 半个体素宽度，所有经过的体素置为开启。
//!
//! ## 依赖关系
//! - 被 `commands/mask.rs` 与 `commands/create.rs` 调用
//! - 使用 `parsers/instrument.rs` 的 DetectorPixel

use crate::error::{Result, SimError};
use crate::parsers::instrument::DetectorPixel;
use crate::simulation::grid::Grid;
use crate::simulation::mask::MaskVolume;

use std::f64::consts::PI;

/// 构建仪器掩膜
pub fn build_instrument_mask(
    pixels: &[DetectorPixel],
    grid: &Grid,
    wavelength_range: (f64, f64),
) -> Result<MaskVolume> {
    let (lambda_min, lambda_max) = wavelength_range;
    if !(lambda_min > 0.0 && lambda_min < lambda_max && lambda_max.is_finite()) {
        return Err(SimError::InvalidRange(format!(
            "wavelength band must satisfy 0 < min < max (got [{}, {}])",
            lambda_min, lambda_max
        )));
    }

    let k_min = 2.0 * PI / lambda_max;
    let k_max = 2.0 * PI / lambda_min;
    let half_voxel = 0.5
        * (0..3)
            .map(|axis| grid.bin_width(axis))
            .fold(f64::INFINITY, f64::min);

    let mut mask = MaskVolume::filled(grid.nbins(), false);
    let mut forward = 0;

    for pixel in pixels {
        let Some(d) = pixel.direction() else {
            continue;
        };
        let s = [-d[0], -d[1], 1.0 - d[2]];
        let s_norm = (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt();
        if s_norm < 1e-9 {
            // 沿入射束方向的像素只看到 Q = 0
            forward += 1;
            continue;
        }

        let steps = ((k_max - k_min) * s_norm / half_voxel).ceil().max(1.0) as usize;
        for step in 0..=steps {
            let k = k_min + (k_max - k_min) * step as f64 / steps as f64;
            let q = [k * s[0], k * s[1], k * s[2]];
            if let Some(index) = grid.histogram_index(&q) {
                mask.set(index);
            }
        }
    }

    if forward > 0 {
        log::warn!("{} detector pixels lie on the beam axis and were ignored", forward);
    }
    log::info!(
        "Instrument mask: {} pixels -> {} of {} voxels covered",
        pixels.len(),
        mask.count(),
        grid.nbins().pow(3)
    );

    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::Extents;

    fn pixel(id: u32, x: f64, y: f64, z: f64) -> DetectorPixel {
        DetectorPixel { id, x, y, z }
    }

    fn grid(bounds: [f64; 6], nbins: usize) -> Grid {
        Grid::new(Extents::from_slice(&bounds).unwrap(), nbins)
    }

    #[test]
    fn test_equatorial_pixel_traces_a_line() {
        // d̂ = +x：Q = k · (-1, 0, 1)
        let g = grid([-15.0, 0.0, -1.0, 1.0, 0.0, 15.0], 30);
        let mask = build_instrument_mask(&[pixel(1, 0.5, 0.0, 0.0)], &g, (0.5, 10.0)).unwrap();

        assert!(mask.count() > 0);
        let width = g.bin_width(0);
        for ((i, j, k), &on) in mask.data().indexed_iter() {
            if on {
                let (cx, cz) = (g.center(0, i), g.center(2, k));
                assert!((cx + cz).abs() <= 2.0 * width);
                assert_eq!(j, 15);
            }
        }
    }

    #[test]
    fn test_band_limits_covered_q() {
        // λ ∈ [2, 4] → |Q| = k·√2 ∈ [1.57·√2, 3.14·√2]
        let g = grid([-10.0, 0.0, -1.0, 1.0, 0.0, 10.0], 20);
        let mask = build_instrument_mask(&[pixel(1, 1.0, 0.0, 0.0)], &g, (2.0, 4.0)).unwrap();

        for ((i, _, k), &on) in mask.data().indexed_iter() {
            if on {
                let q = (g.center(0, i).powi(2) + g.center(2, k).powi(2)).sqrt();
                assert!(q > 1.0 && q < 5.5, "voxel at |Q| = {}", q);
            }
        }
    }

    #[test]
    fn test_forward_pixel_marks_nothing() {
        let g = grid([-5.0, 5.0, -5.0, 5.0, -5.0, 5.0], 10);
        let mask = build_instrument_mask(&[pixel(1, 0.0, 0.0, 2.0)], &g, (0.5, 10.0)).unwrap();
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn test_out_of_extent_coverage_is_dropped() {
        // 背散射像素的 Q 全在 z > 0 一侧，范围只覆盖 z < 0
        let g = grid([-5.0, 5.0, -5.0, 5.0, -5.0, -1.0], 10);
        let mask = build_instrument_mask(&[pixel(1, 0.0, 0.1, -1.0)], &g, (0.5, 10.0)).unwrap();
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn test_degenerate_band_is_rejected() {
        let g = grid([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0], 2);
        assert!(build_instrument_mask(&[pixel(1, 1.0, 0.0, 0.0)], &g, (3.0, 3.0)).is_err());
    }
}
