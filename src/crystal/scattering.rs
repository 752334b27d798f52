//! # 中子相干散射长度数据库
//!
//! 提供元素的中子束缚相干散射长度 b_coh（单位 fm）。
//! 与 X 射线原子形状因子不同，中子散射长度与 sin(θ)/λ 无关。
//!
//! ## 数据来源
//! V. F. Sears, Neutron News 3 (1992) 26-37（天然同位素丰度，取实部）
//!
//! ## 依赖关系
//! - 被 `crystal/reflections.rs` 调用计算结构因子
//! - 纯静态数据，无外部依赖

use std::collections::HashMap;
use std::sync::LazyLock;

/// 中子相干散射长度表 (fm)
pub static SCATTERING_LENGTHS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("H", -3.7390),
        ("D", 6.671),
        ("He", 3.26),
        ("Li", -1.90),
        ("Be", 7.79),
        ("B", 5.30),
        ("C", 6.6460),
        ("N", 9.36),
        ("O", 5.803),
        ("F", 5.654),
        ("Ne", 4.566),
        ("Na", 3.63),
        ("Mg", 5.375),
        ("Al", 3.449),
        ("Si", 4.1491),
        ("P", 5.13),
        ("S", 2.847),
        ("Cl", 9.5770),
        ("Ar", 1.909),
        ("K", 3.67),
        ("Ca", 4.70),
        ("Sc", 12.29),
        ("Ti", -3.438),
        ("V", -0.3824),
        ("Cr", 3.635),
        ("Mn", -3.73),
        ("Fe", 9.45),
        ("Co", 2.49),
        ("Ni", 10.3),
        ("Cu", 7.718),
        ("Zn", 5.680),
        ("Ga", 7.288),
        ("Ge", 8.185),
        ("As", 6.58),
        ("Se", 7.970),
        ("Br", 6.795),
        ("Kr", 7.81),
        ("Rb", 7.09),
        ("Sr", 7.02),
        ("Y", 7.75),
        ("Zr", 7.16),
        ("Nb", 7.054),
        ("Mo", 6.715),
        ("Ru", 7.03),
        ("Rh", 5.88),
        ("Pd", 5.91),
        ("Ag", 5.922),
        ("Cd", 4.87),
        ("In", 4.065),
        ("Sn", 6.225),
        ("Sb", 5.57),
        ("Te", 5.80),
        ("I", 5.28),
        ("Xe", 4.92),
        ("Cs", 5.42),
        ("Ba", 5.07),
        ("La", 8.24),
        ("Ce", 4.84),
        ("Pr", 4.58),
        ("Nd", 7.69),
        ("Hf", 7.7),
        ("Ta", 6.91),
        ("W", 4.86),
        ("Re", 9.2),
        ("Os", 10.7),
        ("Ir", 10.6),
        ("Pt", 9.60),
        ("Au", 7.63),
        ("Hg", 12.692),
        ("Tl", 8.776),
        ("Pb", 9.405),
        ("Bi", 8.532),
        ("Th", 10.31),
        ("U", 8.417),
    ]
    .into_iter()
    .collect()
});

/// 从原子类型（如 "Na1+", "O2-", "Fe"）中提取元素符号
pub fn element_symbol(type_symbol: &str) -> String {
    let mut chars = type_symbol.trim().chars().skip_while(|c| !c.is_ascii_alphabetic());

    let mut symbol = String::new();
    if let Some(first) = chars.next() {
        symbol.push(first.to_ascii_uppercase());
        if let Some(second) = chars.next() {
            if second.is_ascii_lowercase() {
                symbol.push(second);
            }
        }
    }
    symbol
}

/// 获取元素的中子相干散射长度 (fm)
pub fn scattering_length(element: &str) -> Option<f64> {
    // 尝试直接匹配
    if let Some(b) = SCATTERING_LENGTHS.get(element) {
        return Some(*b);
    }

    // 去掉电荷、编号等后缀后再匹配（如 "Fe1", "Na1+"）
    let symbol = element_symbol(element);
    SCATTERING_LENGTHS.get(symbol.as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scattering_length_lookup() {
        assert_eq!(scattering_length("Na"), Some(3.63));
        assert_eq!(scattering_length("Cl"), Some(9.5770));
        assert_eq!(scattering_length("Xx"), None);
    }

    #[test]
    fn test_hydrogen_is_negative() {
        assert!(scattering_length("H").unwrap() < 0.0);
    }

    #[test]
    fn test_element_symbol_strips_charge_and_index() {
        assert_eq!(element_symbol("Na1+"), "Na");
        assert_eq!(element_symbol("O2-"), "O");
        assert_eq!(element_symbol("fe"), "Fe");
        assert_eq!(scattering_length("Cl1-"), Some(9.5770));
    }
}
