//! # scdsim - 单晶中子衍射数据模拟器
//!
//! 由晶体结构文件批量生成带仪器覆盖掩膜、热背景与高斯峰展宽的
//! 三维倒易空间直方图，以及配套的峰表与 UB 矩阵。
//!
//! ## 子命令
//! - `create` - 对一组 CIF 文件运行模拟流水线
//! - `mask`   - 由探测器像素表构建并保存仪器覆盖掩膜
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── config.rs   (配置读取与校验)
//!   │     ├── batch/      (文件收集与并行调度)
//!   │     └── simulation/ (模拟流水线各阶段)
//!   │           ├── crystal/ (反射生成与 UB 矩阵)
//!   │           ├── parsers/ (CIF 与探测器表解析)
//!   │           └── models/  (数据模型)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod config;
mod crystal;
mod error;
mod models;
mod parsers;
mod simulation;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
