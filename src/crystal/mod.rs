//! # 晶体学计算模块
//!
//! 由晶体结构导出模拟所需的反射与取向矩阵。
//!
//! ## 子模块
//! - `scattering`: 中子相干散射长度数据库
//! - `reflections`: 反射枚举与 |F|² 计算（ReflectionSource）
//! - `orientation`: 默认 UB 取向矩阵
//!
//! ## 依赖关系
//! - 被 `simulation/` 使用
//! - 使用 `models/structure.rs`

pub mod orientation;
pub mod reflections;
pub mod scattering;

pub use orientation::OrientationMatrix;
pub use reflections::{Reflection, ReflectionSource, StructureFactorGenerator};
