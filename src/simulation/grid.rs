//! # 倒空间网格
//!
//! `Extents` 定义 Q 空间包围盒，`Grid` 将其划分为 nbins³ 个体素。
//!
//! ## 分箱约定
//! - `histogram_index`: 直方图语义，区间左闭右开，最后一个区间右端闭合
//! - `digitize_index`: digitize 语义，区间左闭右开；恰好落在内部边界上的值归入
//!   较高的区间，落在最后一条边界或之外视为越界
//!
//! ## 依赖关系
//! - 被 `config.rs` 校验范围
//! - 被 `simulation/` 所有组件使用

use serde::{Deserialize, Serialize};

/// Q 空间包围盒 [xmin, xmax, ymin, ymax, zmin, zmax] (Å⁻¹)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    bounds: [(f64, f64); 3],
}

impl Extents {
    /// 校验并构造；返回全部违反项
    pub fn from_slice(values: &[f64]) -> std::result::Result<Self, Vec<String>> {
        if values.len() != 6 {
            return Err(vec![format!(
                "extents needs exactly 6 values (got {})",
                values.len()
            )]);
        }

        let mut violations = Vec::new();
        let mut bounds = [(0.0, 0.0); 3];
        for (axis, pair) in values.chunks(2).enumerate() {
            let (lower, upper) = (pair[0], pair[1]);
            if !(lower.is_finite() && upper.is_finite()) {
                violations.push(format!("extents axis {} must be finite", axis));
            } else if lower >= upper {
                violations.push(format!(
                    "extents axis {} must satisfy min < max (got {} >= {})",
                    axis, lower, upper
                ));
            }
            bounds[axis] = (lower, upper);
        }

        if violations.is_empty() {
            Ok(Extents { bounds })
        } else {
            Err(violations)
        }
    }

    /// 单轴范围 (min, max)
    pub fn axis(&self, axis: usize) -> (f64, f64) {
        self.bounds[axis]
    }

    pub fn as_array(&self) -> [f64; 6] {
        let [(x0, x1), (y0, y1), (z0, z1)] = self.bounds;
        [x0, x1, y0, y1, z0, z1]
    }
}

/// 立方体素网格
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    extents: Extents,
    nbins: usize,
    edges: [Vec<f64>; 3],
}

impl Grid {
    /// 每轴 nbins + 1 条均匀分布的边界
    pub fn new(extents: Extents, nbins: usize) -> Self {
        let edges = [0, 1, 2].map(|axis| {
            let (lower, upper) = extents.axis(axis);
            linspace(lower, upper, nbins + 1)
        });

        Grid {
            extents,
            nbins,
            edges,
        }
    }

    pub fn extents(&self) -> &Extents {
        &self.extents
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nbins, self.nbins, self.nbins)
    }

    /// 某轴的全部边界
    #[cfg(test)]
    pub fn edges(&self, axis: usize) -> &[f64] {
        &self.edges[axis]
    }

    /// 某轴第 i 个体素的中心
    pub fn center(&self, axis: usize, i: usize) -> f64 {
        0.5 * (self.edges[axis][i] + self.edges[axis][i + 1])
    }

    /// 某轴全部体素中心
    pub fn centers(&self, axis: usize) -> Vec<f64> {
        (0..self.nbins).map(|i| self.center(axis, i)).collect()
    }

    /// 某轴体素宽度
    pub fn bin_width(&self, axis: usize) -> f64 {
        let (lower, upper) = self.extents.axis(axis);
        (upper - lower) / self.nbins as f64
    }

    /// 直方图语义的单轴索引
    pub fn histogram_axis_index(&self, axis: usize, value: f64) -> Option<usize> {
        let edges = &self.edges[axis];
        let last = edges[self.nbins];
        if value == last {
            return Some(self.nbins - 1);
        }
        self.digitize_axis_index(axis, value)
    }

    /// digitize 语义的单轴索引：edges[i] <= value < edges[i+1]
    pub fn digitize_axis_index(&self, axis: usize, value: f64) -> Option<usize> {
        let edges = &self.edges[axis];
        if !(value >= edges[0] && value < edges[self.nbins]) {
            return None;
        }
        // 第一个大于 value 的边界位置
        let upper = edges.partition_point(|&e| e <= value);
        Some(upper - 1)
    }

    /// 直方图语义的三维索引
    pub fn histogram_index(&self, q: &[f64; 3]) -> Option<(usize, usize, usize)> {
        Some((
            self.histogram_axis_index(0, q[0])?,
            self.histogram_axis_index(1, q[1])?,
            self.histogram_axis_index(2, q[2])?,
        ))
    }

    /// digitize 语义的三维索引
    pub fn digitize_index(&self, q: &[f64; 3]) -> Option<(usize, usize, usize)> {
        Some((
            self.digitize_axis_index(0, q[0])?,
            self.digitize_axis_index(1, q[1])?,
            self.digitize_axis_index(2, q[2])?,
        ))
    }
}

/// [start, stop] 上 n 个等距点（含两端）
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let span = stop - start;
            let last = (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + span * i as f64 / last).collect();
            values[n - 1] = stop;
            values
        }
    }
}
