//! # 批量处理模块
//!
//! 提供统一的文件批量处理能力。
//!
//! ## 功能
//! - 收集文件与目录输入
//! - 并行处理，结果保持输入顺序
//! - 致命错误时粗粒度取消剩余队列
//! - 进度反馈与统计
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 和 `commands/create.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
