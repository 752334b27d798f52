//! # create 子命令 CLI 定义
//!
//! 由 CIF 文件批量生成模拟数据（信号体积、峰列表、UB 矩阵）。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/create.rs`

use crate::simulation::Connectivity;

use clap::{ArgGroup, Args, ValueEnum};
use std::path::PathBuf;

/// 掩膜膨胀结构元
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DilationArg {
    /// 6-neighbour (face) connectivity
    Face,
    /// 26-neighbour (full) connectivity
    Full,
}

impl From<DilationArg> for Connectivity {
    fn from(arg: DilationArg) -> Self {
        match arg {
            DilationArg::Face => Connectivity::Face,
            DilationArg::Full => Connectivity::Full,
        }
    }
}

/// create 子命令参数
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mask_source").required(true).args(["mask", "instrument_file"])))]
pub struct CreateArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Input CIF files or directories containing CIF files
    #[arg(short, long = "input", num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory (must exist)
    #[arg(short, long)]
    pub output: PathBuf,

    /// File name prefix for generated artifacts ({prefix}_{i}_MD.bin, ...)
    #[arg(short, long, default_value = "SXD")]
    pub prefix: String,

    /// Precomputed instrument mask artifact (from `scdsim mask`)
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Detector pixel table to build the mask on the fly
    #[arg(long)]
    pub instrument_file: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // 批量处理参数
    // ─────────────────────────────────────────────────────────────
    /// Glob pattern for files inside input directories (e.g., "*.cif,*.CIF")
    #[arg(long, default_value = "*.cif")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    // ─────────────────────────────────────────────────────────────
    // 配置覆盖
    // ─────────────────────────────────────────────────────────────
    /// Base random seed (crystal i uses seed + i); overrides the config
    #[arg(long)]
    pub seed: Option<u64>,

    /// Treat an empty peak list as a per-crystal failure
    #[arg(long, default_value_t = false)]
    pub require_peaks: bool,

    /// Mask dilation connectivity; overrides the config
    #[arg(long, value_enum)]
    pub dilation: Option<DilationArg>,
}
