//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `create`: 由 CIF 文件生成模拟数据集
//! - `mask`: 由探测器像素表构建仪器掩膜
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: create, mask

pub mod create;
pub mod mask;

use clap::{Parser, Subcommand};

/// scdsim - 单晶中子衍射倒空间数据模拟器
#[derive(Parser)]
#[command(name = "scdsim")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(
    about = "Simulate single-crystal neutron diffraction data in reciprocal space",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate Q-space volumes, peak lists and UB matrices from CIF files
    Create(create::CreateArgs),

    /// Build an instrument coverage mask from a detector pixel table
    Mask(mask::MaskArgs),
}
