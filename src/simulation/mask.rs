//! # 仪器掩膜
//!
//! `MaskVolume` 是与网格同形状的布尔体积，标记仪器真实可观测的体素。
//! `MaskApplier` 持有共享的原始掩膜及其一次膨胀结果：
//! - `apply`: 将掩膜外体素置零
//! - `gate`: 用膨胀后的掩膜筛选反射（digitize 语义定位体素）
//!
//! ## 膨胀结构元
//! - `Face`: 6 邻域（默认，对应标准二值结构元）
//! - `Full`: 26 邻域
//!
//! 体积外的体素在膨胀时视为关闭。
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 使用
//! - 被 `simulation/instrument.rs` 构建、`simulation/export.rs` 读写
//! - 使用 `ndarray`

use crate::crystal::{OrientationMatrix, Reflection};
use crate::error::{Result, SimError};
use crate::simulation::grid::Grid;

use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 膨胀结构元连通性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// 6 邻域（共面）
    #[default]
    Face,
    /// 26 邻域（共面、共棱、共顶点）
    Full,
}

impl Connectivity {
    /// 结构元相对中心的偏移（不含中心）
    pub fn offsets(self) -> Vec<[isize; 3]> {
        match self {
            Connectivity::Face => vec![
                [-1, 0, 0],
                [1, 0, 0],
                [0, -1, 0],
                [0, 1, 0],
                [0, 0, -1],
                [0, 0, 1],
            ],
            Connectivity::Full => {
                let mut offsets = Vec::with_capacity(26);
                for di in -1..=1 {
                    for dj in -1..=1 {
                        for dk in -1..=1 {
                            if (di, dj, dk) != (0, 0, 0) {
                                offsets.push([di, dj, dk]);
                            }
                        }
                    }
                }
                offsets
            }
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Face => write!(f, "face"),
            Connectivity::Full => write!(f, "full"),
        }
    }
}

/// 立方布尔掩膜体积
#[derive(Debug, Clone, PartialEq)]
pub struct MaskVolume(Array3<bool>);

impl MaskVolume {
    /// 包装已有数组；非立方形状返回 `ShapeMismatch`
    pub fn new(data: Array3<bool>) -> Result<Self> {
        let shape = data.shape();
        if shape[0] != shape[1] || shape[1] != shape[2] {
            return Err(SimError::cube_mismatch(shape[0], shape));
        }
        Ok(MaskVolume(data))
    }

    /// 全开或全关的掩膜
    pub fn filled(nbins: usize, value: bool) -> Self {
        MaskVolume(Array3::from_elem((nbins, nbins, nbins), value))
    }

    pub fn nbins(&self) -> usize {
        self.0.shape()[0]
    }

    pub fn data(&self) -> &Array3<bool> {
        &self.0
    }

    pub fn is_set(&self, index: (usize, usize, usize)) -> bool {
        self.0.get([index.0, index.1, index.2]).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: (usize, usize, usize)) {
        if let Some(v) = self.0.get_mut([index.0, index.1, index.2]) {
            *v = true;
        }
    }

    /// 开启的体素数
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&v| v).count()
    }

    /// 校验掩膜与网格分箱数一致
    pub fn check_nbins(&self, nbins: usize) -> Result<()> {
        if self.nbins() != nbins {
            return Err(SimError::cube_mismatch(nbins, self.0.shape()));
        }
        Ok(())
    }

    /// 以给定结构元做一次形态学膨胀
    pub fn dilate(&self, connectivity: Connectivity) -> MaskVolume {
        let n = self.nbins() as isize;
        let offsets = connectivity.offsets();
        let mut dilated = self.0.clone();

        for ((i, j, k), &on) in self.0.indexed_iter() {
            if !on {
                continue;
            }
            for [di, dj, dk] in &offsets {
                let (x, y, z) = (i as isize + di, j as isize + dj, k as isize + dk);
                if (0..n).contains(&x) && (0..n).contains(&y) && (0..n).contains(&z) {
                    dilated[[x as usize, y as usize, z as usize]] = true;
                }
            }
        }

        MaskVolume(dilated)
    }
}

/// 掩膜应用器：原始掩膜共享只读，膨胀掩膜在构造时预计算一次
#[derive(Debug, Clone)]
pub struct MaskApplier {
    mask: Arc<MaskVolume>,
    dilated: MaskVolume,
}

impl MaskApplier {
    pub fn new(mask: Arc<MaskVolume>, connectivity: Connectivity) -> Self {
        let dilated = mask.dilate(connectivity);
        log::debug!(
            "Mask dilated ({}): {} -> {} voxels",
            connectivity,
            mask.count(),
            dilated.count()
        );

        Self { mask, dilated }
    }

    /// 将原始掩膜关闭处的体素置零
    pub fn apply(&self, mut volume: Array3<f64>) -> Result<Array3<f64>> {
        if volume.shape() != self.mask.data().shape() {
            return Err(SimError::cube_mismatch(self.mask.nbins(), volume.shape()));
        }

        Zip::from(&mut volume)
            .and(self.mask.data())
            .for_each(|v, &on| {
                if !on {
                    *v = 0.0;
                }
            });

        Ok(volume)
    }

    /// 保留 Q 落在膨胀掩膜开启体素内的反射
    pub fn gate(
        &self,
        reflections: &[Reflection],
        ub: &OrientationMatrix,
        grid: &Grid,
    ) -> Result<Vec<Reflection>> {
        gate_with_mask(reflections, ub, grid, &self.dilated)
    }
}

/// 用任意掩膜筛选反射；Q 超出网格边界的反射不保留
pub fn gate_with_mask(
    reflections: &[Reflection],
    ub: &OrientationMatrix,
    grid: &Grid,
    mask: &MaskVolume,
) -> Result<Vec<Reflection>> {
    mask.check_nbins(grid.nbins())?;

    Ok(reflections
        .iter()
        .filter(|r| {
            grid.digitize_index(&ub.q_lab(r.hkl))
                .is_some_and(|index| mask.is_set(index))
        })
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::Extents;
    use std::f64::consts::PI;

    fn grid(half: f64, nbins: usize) -> Grid {
        let extents = Extents::from_slice(&[-half, half, -half, half, -half, half]).unwrap();
        Grid::new(extents, nbins)
    }

    fn single_voxel(nbins: usize, index: (usize, usize, usize)) -> MaskVolume {
        let mut mask = MaskVolume::filled(nbins, false);
        mask.set(index);
        mask
    }

    fn reflection(hkl: [i32; 3]) -> Reflection {
        Reflection::new(hkl, 10.0, 1.0)
    }

    #[test]
    fn test_face_dilation_of_interior_voxel() {
        let mask = single_voxel(5, (2, 2, 2));
        let dilated = mask.dilate(Connectivity::Face);
        assert_eq!(dilated.count(), 7);
        assert!(dilated.is_set((1, 2, 2)));
        assert!(!dilated.is_set((1, 1, 2)));
    }

    #[test]
    fn test_full_dilation_of_interior_voxel() {
        let mask = single_voxel(5, (2, 2, 2));
        assert_eq!(mask.dilate(Connectivity::Full).count(), 27);
    }

    #[test]
    fn test_dilation_clips_at_volume_border() {
        let mask = single_voxel(4, (0, 0, 0));
        assert_eq!(mask.dilate(Connectivity::Face).count(), 4);
        assert_eq!(mask.dilate(Connectivity::Full).count(), 8);
    }

    #[test]
    fn test_non_cubic_mask_is_rejected() {
        let err = MaskVolume::new(Array3::from_elem((2, 3, 2), true)).unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_apply_zeroes_outside_and_is_idempotent() {
        let mask = Arc::new(single_voxel(3, (1, 1, 1)));
        let applier = MaskApplier::new(mask, Connectivity::Face);
        let volume = Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i + j + k) as f64 + 1.0);

        let once = applier.apply(volume).unwrap();
        assert_eq!(once[[1, 1, 1]], 4.0);
        assert_eq!(once.sum(), 4.0);

        let twice = applier.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_apply_shape_mismatch() {
        let applier = MaskApplier::new(Arc::new(MaskVolume::filled(3, true)), Connectivity::Face);
        let err = applier.apply(Array3::zeros((2, 2, 2))).unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_mask_blocks_everything() {
        let g = grid(10.0, 4);
        let applier = MaskApplier::new(Arc::new(MaskVolume::filled(4, false)), Connectivity::Full);

        let masked = applier.apply(Array3::from_elem((4, 4, 4), 7.5)).unwrap();
        assert!(masked.iter().all(|&v| v == 0.0));

        let reflections = vec![reflection([1, 0, 0]), reflection([0, 1, 1])];
        let kept = applier.gate(&reflections, &OrientationMatrix::identity(), &g).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_gate_excludes_out_of_range_q() {
        // Q = (2π, 0, 0) 在 [-1, 1]³ 之外
        let g = grid(1.0, 2);
        let applier = MaskApplier::new(Arc::new(MaskVolume::filled(2, true)), Connectivity::Face);
        let kept = applier
            .gate(&[reflection([1, 0, 0])], &OrientationMatrix::identity(), &g)
            .unwrap();
        assert!(kept.is_empty());

        // 扩大范围后保留
        let g = grid(7.0, 2);
        let kept = applier
            .gate(&[reflection([1, 0, 0])], &OrientationMatrix::identity(), &g)
            .unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_gate_is_monotone_in_dilation() {
        let g = grid(10.0, 10);
        let ub = OrientationMatrix::identity();
        let q_index = g.digitize_index(&ub.q_lab([1, 0, 0])).unwrap();
        let mask = single_voxel(10, (q_index.0 + 1, q_index.1, q_index.2));

        let reflections: Vec<Reflection> = [[1, 0, 0], [-1, 0, 0], [0, 1, 0], [1, 1, 0]]
            .iter()
            .map(|&hkl| reflection(hkl))
            .collect();

        let plain = gate_with_mask(&reflections, &ub, &g, &mask).unwrap();
        let applier = MaskApplier::new(Arc::new(mask), Connectivity::Face);
        let dilated = applier.gate(&reflections, &ub, &g).unwrap();

        assert!(plain.is_empty());
        assert_eq!(dilated, vec![reflection([1, 0, 0])]);
        assert!(plain.iter().all(|r| dilated.contains(r)));
    }

    #[test]
    fn test_gate_places_edge_reflection_in_higher_bin() {
        // nbins = 300，对称范围；Q_y = Q_z = 0 恰好落在第 150 条边界上
        let g = grid(15.0, 300);
        let ub = OrientationMatrix::identity();
        let ix = g.digitize_axis_index(0, 2.0 * PI).unwrap();
        assert_eq!(g.digitize_index(&ub.q_lab([1, 0, 0])), Some((ix, 150, 150)));

        let upper = single_voxel(300, (ix, 150, 150));
        let kept = gate_with_mask(&[reflection([1, 0, 0])], &ub, &g, &upper).unwrap();
        assert_eq!(kept.len(), 1);

        let lower = single_voxel(300, (ix, 149, 149));
        let kept = gate_with_mask(&[reflection([1, 0, 0])], &ub, &g, &lower).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_gate_shape_mismatch() {
        let g = grid(1.0, 3);
        let mask = MaskVolume::filled(2, true);
        let err = gate_with_mask(&[], &OrientationMatrix::identity(), &g, &mask).unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_connectivity_from_json() {
        let c: Connectivity = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(c, Connectivity::Full);
        assert_eq!(Connectivity::default(), Connectivity::Face);
    }
}
