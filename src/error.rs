//! # 统一错误处理模块
//!
//! 定义 scdsim 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 错误分类
//! - 输入错误（文件/目录缺失）：直接报告，进程退出码 1
//! - 解析错误（CIF / 配置 / 掩膜文件格式错误）：仅中止当前晶体
//! - 形状不匹配：整个运行致命
//! - 配置校验错误：在任何处理开始前致命，列出全部违反项
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// scdsim 统一错误类型
#[derive(Error, Debug)]
pub enum SimError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 晶体 / 衍射错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid crystal structure: {0}")]
    InvalidCrystal(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("No peaks survived the instrument mask for '{crystal}'")]
    EmptyPeakList { crystal: String },

    // ─────────────────────────────────────────────────────────────
    // 网格 / 配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    ConfigValidation(Vec<String>),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

impl SimError {
    /// 构造形状不匹配错误（三维立方网格）
    pub fn cube_mismatch(expected: usize, found: &[usize]) -> Self {
        SimError::ShapeMismatch {
            expected: format!("({0}, {0}, {0})", expected),
            found: format!("{:?}", found),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, SimError>;
