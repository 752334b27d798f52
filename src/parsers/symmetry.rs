//! # 对称操作解析与位点展开
//!
//! 解析 CIF 中的 Jones 记号对称操作（如 `-x+y, 1/2+z, -x`），
//! 并把不对称单元中的位点展开为 P1 原子列表。
//!
//! ## 依赖关系
//! - 被 `parsers/cif.rs` 使用
//! - 使用 `models/structure.rs` 的 Atom

use crate::models::Atom;

/// 分数坐标中的重合容差
const POSITION_TOLERANCE: f64 = 1e-4;

/// 对称操作 r' = R·r + t
#[derive(Debug, Clone, PartialEq)]
pub struct SymOp {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl SymOp {
    pub fn identity() -> Self {
        SymOp {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// 解析 Jones 记号，例如 `x, -y, z+1/2`
    pub fn parse(text: &str) -> Result<Self, String> {
        let components: Vec<&str> = text.trim().trim_matches('\'').split(',').collect();
        if components.len() != 3 {
            return Err(format!(
                "symmetry operation '{}' must have 3 components",
                text
            ));
        }

        let mut rotation = [[0.0; 3]; 3];
        let mut translation = [0.0; 3];
        for (i, component) in components.iter().enumerate() {
            let (row, shift) = parse_component(component)
                .map_err(|reason| format!("symmetry operation '{}': {}", text, reason))?;
            rotation[i] = row;
            translation[i] = shift;
        }

        Ok(SymOp {
            rotation,
            translation,
        })
    }

    /// 作用于分数坐标，结果折回 [0, 1)
    pub fn apply(&self, position: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, row) in self.rotation.iter().enumerate() {
            let v = row[0] * position[0]
                + row[1] * position[1]
                + row[2] * position[2]
                + self.translation[i];
            out[i] = wrap_unit(v);
        }
        out
    }
}

/// 解析单个分量，返回 (旋转矩阵行, 平移)
fn parse_component(component: &str) -> Result<([f64; 3], f64), String> {
    let chars: Vec<char> = component
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if chars.is_empty() {
        return Err("empty component".to_string());
    }

    let mut row = [0.0; 3];
    let mut shift = 0.0;
    let mut i = 0;

    while i < chars.len() {
        let mut sign = 1.0;
        while i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
            if chars[i] == '-' {
                sign = -sign;
            }
            i += 1;
        }
        if i >= chars.len() {
            return Err("dangling sign".to_string());
        }

        match chars[i] {
            'x' | 'y' | 'z' => {
                row[axis_index(chars[i])] += sign;
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '/')
                {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                let value = parse_number(&token)?;

                // 形如 "2x" 的系数写法
                if i < chars.len() && matches!(chars[i], 'x' | 'y' | 'z') {
                    row[axis_index(chars[i])] += sign * value;
                    i += 1;
                } else {
                    shift += sign * value;
                }
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok((row, shift))
}

fn axis_index(c: char) -> usize {
    match c {
        'x' => 0,
        'y' => 1,
        _ => 2,
    }
}

/// 解析整数、小数或分数 (如 "1/2")
fn parse_number(token: &str) -> Result<f64, String> {
    if let Some((num, den)) = token.split_once('/') {
        let num: f64 = num
            .parse()
            .map_err(|_| format!("invalid fraction '{}'", token))?;
        let den: f64 = den
            .parse()
            .map_err(|_| format!("invalid fraction '{}'", token))?;
        if den == 0.0 {
            return Err(format!("zero denominator in '{}'", token));
        }
        Ok(num / den)
    } else {
        token
            .parse()
            .map_err(|_| format!("invalid number '{}'", token))
    }
}

/// 折回 [0, 1)，消除 1.0 - ε 这类舍入残差
fn wrap_unit(v: f64) -> f64 {
    let w = v - v.floor();
    if w > 1.0 - POSITION_TOLERANCE * 1e-3 {
        0.0
    } else {
        w
    }
}

/// 周期边界下两个分数坐标是否重合
fn same_site(a: &[f64; 3], b: &[f64; 3]) -> bool {
    a.iter().zip(b).all(|(x, y)| {
        let d = (x - y).abs();
        d.min(1.0 - d) < POSITION_TOLERANCE
    })
}

/// 对每个不对称单元位点应用全部对称操作，去除重复位置
pub fn expand_sites(sites: &[Atom], operations: &[SymOp]) -> Vec<Atom> {
    let mut expanded = Vec::new();

    for site in sites {
        let mut positions: Vec<[f64; 3]> = Vec::new();
        for op in operations {
            let p = op.apply(site.position);
            if !positions.iter().any(|q| same_site(q, &p)) {
                positions.push(p);
            }
        }

        expanded.extend(positions.into_iter().map(|p| Atom {
            position: p,
            ..site.clone()
        }));
    }

    expanded
}
