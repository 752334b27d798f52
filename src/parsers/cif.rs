//! # CIF 格式解析器
//!
//! 解析晶体学信息文件 (Crystallographic Information File) 的常用子集。
//!
//! ## 支持的数据项
//! ```text
//! data_NaCl
//! _cell_length_a    5.64(1)
//! _cell_angle_alpha 90
//! _symmetry_space_group_name_H-M 'F m -3 m'
//!
//! loop_
//! _symmetry_equiv_pos_as_xyz
//! 'x, y, z'
//! ...
//!
//! loop_
//! _atom_site_label
//! _atom_site_type_symbol
//! _atom_site_fract_x
//! _atom_site_fract_y
//! _atom_site_fract_z
//! _atom_site_occupancy
//! _atom_site_U_iso_or_equiv
//! Na1 Na 0 0 0 1.0 0.01
//! ```
//!
//! 不对称单元中的位点会按全部对称操作展开为 P1 原子列表。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `parsers/symmetry.rs` 展开位点
//! - 使用 `models/structure.rs`

use crate::crystal::scattering::element_symbol;
use crate::error::{Result, SimError};
use crate::models::{Atom, Crystal, Lattice};
use crate::parsers::symmetry::{self, SymOp};

use regex::Regex;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// 带可选标准不确定度的数值，如 `5.6402(3)`
static CIF_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)(?:\(\d+\))?$").unwrap()
});

const SYMOP_TAGS: [&str; 2] = [
    "_symmetry_equiv_pos_as_xyz",
    "_space_group_symop_operation_xyz",
];

const SPACE_GROUP_TAGS: [&str; 2] = [
    "_symmetry_space_group_name_h-m",
    "_space_group_name_h-m_alt",
];

/// 词法单元
#[derive(Debug, Clone)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        !self.quoted && self.text.to_lowercase().starts_with(keyword)
    }
}

/// loop_ 表格
#[derive(Debug, Default)]
struct CifLoop {
    tags: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }
}

/// 单个数据块
#[derive(Debug, Default)]
struct CifBlock {
    name: Option<String>,
    items: HashMap<String, String>,
    loops: Vec<CifLoop>,
}

impl CifBlock {
    fn find_loop(&self, tag: &str) -> Option<&CifLoop> {
        self.loops.iter().find(|l| l.column(tag).is_some())
    }
}

/// 解析 .cif 文件
pub fn parse_cif_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| SimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    parse_cif_content(&content, stem).map_err(|e| match e {
        SimError::ParseError { format, reason, .. } => SimError::ParseError {
            format,
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// 从字符串内容解析 CIF（取第一个数据块）
pub fn parse_cif_content(content: &str, default_name: &str) -> Result<Crystal> {
    let fail = |reason: String| SimError::ParseError {
        format: "cif".to_string(),
        path: default_name.to_string(),
        reason,
    };

    let tokens = tokenize(content).map_err(fail)?;
    let block = parse_block(&tokens).map_err(fail)?;

    // 晶胞参数
    let cell = |tag: &str| -> Result<f64> {
        let raw = block
            .items
            .get(tag)
            .ok_or_else(|| fail(format!("missing {}", tag)))?;
        parse_cif_number(raw).ok_or_else(|| fail(format!("invalid value '{}' for {}", raw, tag)))
    };
    let a = cell("_cell_length_a")?;
    let b = cell("_cell_length_b")?;
    let c = cell("_cell_length_c")?;
    let alpha = cell("_cell_angle_alpha")?;
    let beta = cell("_cell_angle_beta")?;
    let gamma = cell("_cell_angle_gamma")?;

    if a <= 0.0 || b <= 0.0 || c <= 0.0 {
        return Err(fail(format!(
            "cell lengths must be positive (got {}, {}, {})",
            a, b, c
        )));
    }
    let lattice = Lattice::from_parameters(a, b, c, alpha, beta, gamma);

    let space_group = SPACE_GROUP_TAGS
        .iter()
        .find_map(|tag| block.items.get(*tag))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "?" && s != ".");

    let operations = parse_operations(&block, space_group.as_deref()).map_err(fail)?;
    let sites = parse_sites(&block).map_err(fail)?;
    if sites.is_empty() {
        return Err(fail("no _atom_site_fract_x loop found".to_string()));
    }

    let atoms = symmetry::expand_sites(&sites, &operations);

    let name = block.name.unwrap_or_else(|| default_name.to_string());
    let mut crystal = Crystal::new(name, lattice, atoms);
    crystal.space_group = space_group;

    Ok(crystal)
}

/// 解析带不确定度的 CIF 数值；`?` 和 `.` 视为缺省
fn parse_cif_number(raw: &str) -> Option<f64> {
    CIF_NUMBER
        .captures(raw.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 词法分析：处理注释、引号字符串和分号文本域
fn tokenize(content: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        // 分号文本域：整体作为一个值
        if let Some(rest) = line.strip_prefix(';') {
            let mut text = rest.to_string();
            let mut closed = false;
            for next in lines.by_ref() {
                if next.starts_with(';') {
                    closed = true;
                    break;
                }
                text.push('\n');
                text.push_str(next);
            }
            if !closed {
                return Err("unterminated ';' text field".to_string());
            }
            tokens.push(Token {
                text: text.trim().to_string(),
                quoted: true,
            });
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c == '#' {
                break;
            } else if c == '\'' || c == '"' {
                // 引号仅在其后为空白或行尾时闭合
                let start = i + 1;
                let mut end = start;
                while end < chars.len()
                    && !(chars[end] == c
                        && chars.get(end + 1).map_or(true, |n| n.is_whitespace()))
                {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(format!("unterminated quoted string in line '{}'", line));
                }
                tokens.push(Token {
                    text: chars[start..end].iter().collect(),
                    quoted: true,
                });
                i = end + 1;
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                tokens.push(Token {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                });
            }
        }
    }

    Ok(tokens)
}

/// 语法分析：读取第一个数据块的单值项和 loop_ 表
fn parse_block(tokens: &[Token]) -> std::result::Result<CifBlock, String> {
    let mut block = CifBlock::default();
    let mut seen_data = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        if token.is_keyword("data_") {
            if seen_data {
                break;
            }
            seen_data = true;
            let name = &token.text[5..];
            if !name.is_empty() {
                block.name = Some(name.to_string());
            }
            i += 1;
        } else if token.is_keyword("loop_") {
            i += 1;
            let mut cif_loop = CifLoop::default();
            while i < tokens.len() && tokens[i].is_tag() {
                cif_loop.tags.push(tokens[i].text.to_lowercase());
                i += 1;
            }
            if cif_loop.tags.is_empty() {
                return Err("loop_ without tags".to_string());
            }

            let mut values = Vec::new();
            while i < tokens.len()
                && !tokens[i].is_tag()
                && !tokens[i].is_keyword("loop_")
                && !tokens[i].is_keyword("data_")
            {
                values.push(tokens[i].text.clone());
                i += 1;
            }
            if values.len() % cif_loop.tags.len() != 0 {
                return Err(format!(
                    "loop starting with {} has {} values for {} columns",
                    cif_loop.tags[0],
                    values.len(),
                    cif_loop.tags.len()
                ));
            }
            cif_loop.rows = values
                .chunks(cif_loop.tags.len())
                .map(|row| row.to_vec())
                .collect();
            block.loops.push(cif_loop);
        } else if token.is_tag() {
            let value = tokens
                .get(i + 1)
                .filter(|v| !v.is_tag())
                .ok_or_else(|| format!("tag {} has no value", token.text))?;
            block
                .items
                .insert(token.text.to_lowercase(), value.text.clone());
            i += 2;
        } else {
            // 全局 / save_ 等不支持的结构，跳过
            i += 1;
        }
    }

    Ok(block)
}

/// 读取对称操作；无对称操作时仅允许 P 1
fn parse_operations(
    block: &CifBlock,
    space_group: Option<&str>,
) -> std::result::Result<Vec<SymOp>, String> {
    for tag in SYMOP_TAGS {
        if let Some(cif_loop) = block.find_loop(tag) {
            let col = cif_loop.column(tag).unwrap_or(0);
            return cif_loop
                .rows
                .iter()
                .map(|row| SymOp::parse(&row[col]))
                .collect();
        }
        // 单个操作写成单值项
        if let Some(op) = block.items.get(tag) {
            return Ok(vec![SymOp::parse(op)?]);
        }
    }

    match space_group {
        None => Ok(vec![SymOp::identity()]),
        Some(sg) if sg.replace(' ', "").eq_ignore_ascii_case("P1") => {
            Ok(vec![SymOp::identity()])
        }
        Some(sg) => Err(format!(
            "space group '{}' given without symmetry operations",
            sg
        )),
    }
}

/// 读取不对称单元位点
fn parse_sites(block: &CifBlock) -> std::result::Result<Vec<Atom>, String> {
    let cif_loop = match block.find_loop("_atom_site_fract_x") {
        Some(l) => l,
        None => return Ok(Vec::new()),
    };

    let required = |tag: &str| {
        cif_loop
            .column(tag)
            .ok_or_else(|| format!("atom site loop lacks {}", tag))
    };
    let col_x = required("_atom_site_fract_x")?;
    let col_y = required("_atom_site_fract_y")?;
    let col_z = required("_atom_site_fract_z")?;
    let col_label = cif_loop.column("_atom_site_label");
    let col_type = cif_loop.column("_atom_site_type_symbol");
    let col_occ = cif_loop.column("_atom_site_occupancy");
    let col_u = cif_loop.column("_atom_site_u_iso_or_equiv");
    let col_b = cif_loop.column("_atom_site_b_iso_or_equiv");

    if col_label.is_none() && col_type.is_none() {
        return Err("atom site loop needs _atom_site_label or _atom_site_type_symbol".into());
    }

    let mut sites = Vec::with_capacity(cif_loop.rows.len());
    for row in &cif_loop.rows {
        let coord = |col: usize| {
            parse_cif_number(&row[col])
                .ok_or_else(|| format!("invalid fractional coordinate '{}'", row[col]))
        };
        let position = [coord(col_x)?, coord(col_y)?, coord(col_z)?];

        let label = col_label.map(|c| row[c].clone());
        let element = col_type
            .map(|c| element_symbol(&row[c]))
            .or_else(|| label.as_deref().map(element_symbol))
            .unwrap_or_default();
        if element.is_empty() {
            return Err(format!("cannot determine element for site {:?}", label));
        }

        let optional = |col: Option<usize>| col.and_then(|c| parse_cif_number(&row[c]));
        let occupancy = optional(col_occ).unwrap_or(1.0);
        let u_iso = optional(col_u)
            .or_else(|| optional(col_b).map(|b| b / (8.0 * PI * PI)))
            .unwrap_or(0.0);

        let mut atom = Atom::new(element, position)
            .with_occupancy(occupancy)
            .with_u_iso(u_iso);
        if let Some(label) = label {
            atom = atom.with_label(label);
        }
        sites.push(atom);
    }

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NACL_CIF: &str = r#"
# Rock salt
data_NaCl
_cell_length_a    5.6402(3)
_cell_length_b    5.6402(3)
_cell_length_c    5.6402(3)
_cell_angle_alpha 90
_cell_angle_beta  90
_cell_angle_gamma 90
_symmetry_space_group_name_H-M 'F m -3 m'

loop_
_symmetry_equiv_pos_as_xyz
'x, y, z'
'-x, -y, -z'
'x, y+1/2, z+1/2'
'x+1/2, y, z+1/2'
'x+1/2, y+1/2, z'

loop_
_atom_site_label
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_occupancy
_atom_site_B_iso_or_equiv
Na1 Na1+ 0.0 0.0 0.0 1.0 0.0
Cl1 Cl1- 0.5 0.5 0.5 1.0 0.0
"#;

    #[test]
    fn test_parse_nacl_expands_sites() {
        let crystal = parse_cif_content(NACL_CIF, "fallback").unwrap();

        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.space_group.as_deref(), Some("F m -3 m"));
        assert_eq!(crystal.atoms.len(), 8);

        let (a, _, _, alpha, _, _) = crystal.lattice.parameters();
        assert!((a - 5.6402).abs() < 1e-9);
        assert!((alpha - 90.0).abs() < 1e-9);

        let na = crystal.atoms.iter().filter(|a| a.element == "Na").count();
        assert_eq!(na, 4);
    }

    #[test]
    fn test_parse_u_from_b_iso() {
        let content = NACL_CIF.replace(
            "Cl1 Cl1- 0.5 0.5 0.5 1.0 0.0",
            "Cl1 Cl1- 0.5 0.5 0.5 1.0 0.8",
        );
        let crystal = parse_cif_content(&content, "x").unwrap();
        let cl = crystal.atoms.iter().find(|a| a.element == "Cl").unwrap();
        assert!((cl.u_iso - 0.8 / (8.0 * PI * PI)).abs() < 1e-12);
    }

    #[test]
    fn test_p1_without_symmetry_loop() {
        let content = r#"
data_
_cell_length_a 4.0
_cell_length_b 4.0
_cell_length_c 4.0
_cell_angle_alpha 90.0
_cell_angle_beta 90.0
_cell_angle_gamma 90.0
_symmetry_space_group_name_H-M 'P 1'
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe1 0 0 0
Fe2 0.5 0.5 0.5
"#;
        let crystal = parse_cif_content(content, "bcc-fe").unwrap();
        assert_eq!(crystal.name, "bcc-fe");
        assert_eq!(crystal.atoms.len(), 2);
        assert_eq!(crystal.atoms[0].element, "Fe");
        assert_eq!(crystal.atoms[0].label.as_deref(), Some("Fe1"));
        assert_eq!(crystal.atoms[0].occupancy, 1.0);
        assert_eq!(crystal.formula(), "Fe2");
    }

    #[test]
    fn test_space_group_without_operations_is_error() {
        let content = NACL_CIF.replace("_symmetry_equiv_pos_as_xyz", "_symmetry_unrelated_tag");
        let err = parse_cif_content(&content, "x").unwrap_err();
        assert!(matches!(err, SimError::ParseError { .. }));
    }

    #[test]
    fn test_missing_cell_is_error() {
        let content = NACL_CIF.replace("_cell_length_b    5.6402(3)\n", "");
        let err = parse_cif_content(&content, "x").unwrap_err();
        assert!(err.to_string().contains("_cell_length_b"));
    }

    #[test]
    fn test_ragged_loop_is_error() {
        let content = NACL_CIF.replace("Cl1 Cl1- 0.5 0.5 0.5 1.0 0.0", "Cl1 Cl1- 0.5 0.5");
        assert!(parse_cif_content(&content, "x").is_err());
    }

    #[test]
    fn test_semicolon_text_field_is_skipped() {
        let content = format!(
            "{}\n_publ_section_title\n;\nA multi-line\ntitle with _fake_tag\n;\n",
            NACL_CIF
        );
        let crystal = parse_cif_content(&content, "x").unwrap();
        assert_eq!(crystal.atoms.len(), 8);
    }

    #[test]
    fn test_parse_cif_number() {
        assert_eq!(parse_cif_number("5.64(2)"), Some(5.64));
        assert_eq!(parse_cif_number("-0.125"), Some(-0.125));
        assert_eq!(parse_cif_number("1e-3"), Some(1e-3));
        assert_eq!(parse_cif_number("?"), None);
        assert_eq!(parse_cif_number("."), None);
    }
}
