//! # 晶体结构数据模型
//!
//! 定义晶体结构表示：晶格、原子位点（已按对称操作展开到 P1）。
//!
//! 晶格以行向量矩阵存储，a 沿 x，b 位于 xy 平面；倒格矢采用
//! 晶体学约定（不含 2π），与 UB 矩阵一致。
//!
//! ## 依赖关系
//! - 被 `parsers/cif.rs` 构造
//! - 被 `crystal/` 使用（结构因子、UB 矩阵）
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

type Vec3 = [f64; 3];

/// 晶格（行向量 a, b, c，单位 Å）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lattice {
    pub matrix: [Vec3; 3],
}

impl Lattice {
    /// 由晶胞参数构造，角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let (ca, cb) = (alpha.to_radians().cos(), beta.to_radians().cos());
        let (sg, cg) = gamma.to_radians().sin_cos();

        let cx = cb;
        let cy = (ca - cb * cg) / sg;
        let cz = (1.0 - cx * cx - cy * cy).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cg, b * sg, 0.0],
                [c * cx, c * cy, c * cz],
            ],
        }
    }

    pub fn from_vectors(matrix: [Vec3; 3]) -> Self {
        Lattice { matrix }
    }

    /// 晶胞参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [va, vb, vc] = &self.matrix;
        (
            norm(va),
            norm(vb),
            norm(vc),
            angle_deg(vb, vc),
            angle_deg(va, vc),
            angle_deg(va, vb),
        )
    }

    /// 有符号体积 a·(b×c)
    pub fn volume(&self) -> f64 {
        let [va, vb, vc] = &self.matrix;
        dot(va, &cross(vb, vc))
    }

    /// 倒格矢 a* = (b×c)/V 等（不含 2π）；体积为零时返回 `None`
    pub fn reciprocal(&self) -> Option<[Vec3; 3]> {
        let volume = self.volume();
        if !volume.is_finite() || volume.abs() < 1e-10 {
            return None;
        }

        let [va, vb, vc] = &self.matrix;
        Some([cross(vb, vc), cross(vc, va), cross(va, vb)].map(|v| v.map(|x| x / volume)))
    }

    /// 倒格参数 (a*, b*, c*, alpha*, beta*, gamma*)
    pub fn reciprocal_parameters(&self) -> Option<(f64, f64, f64, f64, f64, f64)> {
        self.reciprocal().map(|m| Lattice::from_vectors(m).parameters())
    }

    /// (hkl) 面间距 d = 1/|G|；hkl = 000 或晶格退化时返回 `None`
    pub fn d_spacing(&self, hkl: [i32; 3]) -> Option<f64> {
        let recip = self.reciprocal()?;
        let mut g = [0.0; 3];
        for (n, row) in hkl.iter().zip(recip.iter()) {
            for (gi, ri) in g.iter_mut().zip(row) {
                *gi += *n as f64 * ri;
            }
        }

        let len = norm(&g);
        (len > 1e-12).then(|| 1.0 / len)
    }
}

/// 原子位点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标
    pub position: Vec3,

    /// CIF 位点标签，如 `Na1`
    pub label: Option<String>,

    pub occupancy: f64,

    /// 各向同性位移参数 U_iso (Å²)
    pub u_iso: f64,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: Vec3) -> Self {
        Atom {
            element: element.into(),
            position,
            label: None,
            occupancy: 1.0,
            u_iso: 0.0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_occupancy(mut self, occupancy: f64) -> Self {
        self.occupancy = occupancy;
        self
    }

    pub fn with_u_iso(mut self, u_iso: f64) -> Self {
        self.u_iso = u_iso;
        self
    }
}

/// 晶体结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crystal {
    /// 名称（CIF 数据块名）
    pub name: String,

    pub lattice: Lattice,

    /// 原子位点（P1 展开后）
    pub atoms: Vec<Atom>,

    /// 空间群 H-M 符号
    pub space_group: Option<String>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
            space_group: None,
        }
    }

    /// 晶胞内容的 Hill 式化学式（含 C 时 C、H 在前，其余按字母序）
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_default() += 1;
        }

        let mut order: Vec<&str> = Vec::with_capacity(counts.len());
        if counts.contains_key("C") {
            order.push("C");
            if counts.contains_key("H") {
                order.push("H");
            }
        }
        let rest: Vec<&str> = counts
            .keys()
            .filter(|el| !order.contains(*el))
            .copied()
            .collect();
        order.extend(rest);

        let mut formula = String::new();
        for el in order {
            formula.push_str(el);
            match counts[el] {
                1 => {}
                n => formula.push_str(&n.to_string()),
            }
        }
        formula
    }
}

fn dot(u: &Vec3, v: &Vec3) -> f64 {
    u.iter().zip(v).map(|(a, b)| a * b).sum()
}

fn norm(v: &Vec3) -> f64 {
    dot(v, v).sqrt()
}

fn cross(u: &Vec3, v: &Vec3) -> Vec3 {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn angle_deg(u: &Vec3, v: &Vec3) -> f64 {
    (dot(u, v) / (norm(u) * norm(v))).clamp(-1.0, 1.0).acos().to_degrees()
}
