//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `config.rs`, `simulation/`, `utils/`
//! - 子模块: create, mask

pub mod create;
pub mod mask;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Create(args) => create::execute(args),
        Commands::Mask(args) => mask::execute(args),
    }
}
