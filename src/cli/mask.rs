//! # mask 子命令 CLI 定义
//!
//! 由探测器像素表构建仪器覆盖掩膜并保存为掩膜文件。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/mask.rs`

use clap::Args;
use std::path::PathBuf;

/// mask 子命令参数
#[derive(Args, Debug)]
pub struct MaskArgs {
    /// JSON configuration file (extents, nbins, wavelength_range)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Detector pixel table (CSV: id,x,y,z in metres)
    #[arg(short, long = "instrument-file")]
    pub input: PathBuf,

    /// Output mask file
    #[arg(short, long = "output-file")]
    pub output: PathBuf,

    /// Number of bins per axis; overrides the config
    #[arg(long)]
    pub nbins: Option<usize>,
}
