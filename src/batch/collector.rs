//! # 文件收集器
//!
//! 根据输入路径列表和模式收集待处理的结构文件。
//!
//! ## 功能
//! - 支持单文件和目录混合输入，保持给定顺序
//! - glob 模式匹配（逗号分隔多模式）
//! - 递归目录搜索
//! - 缺失输入直接报错
//!
//! ## 依赖关系
//! - 被 `commands/create.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{Result, SimError};

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    inputs: Vec<PathBuf>,
    /// 匹配模式列表
    patterns: Vec<glob::Pattern>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器，默认匹配 `*.cif`
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            patterns: vec![glob::Pattern::new("*.cif").unwrap()],
            recursive: false,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let patterns = pattern
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                glob::Pattern::new(s).map_err(|e| {
                    SimError::Other(format!("Invalid pattern '{}': {}", s, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if !patterns.is_empty() {
            self.patterns = patterns;
        }
        Ok(self)
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有匹配的文件；显式给出的文件不受模式限制
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in &self.inputs {
            if input.is_file() {
                files.push(input.clone());
            } else if input.is_dir() {
                files.extend(self.collect_dir(input));
            } else {
                return Err(SimError::FileNotFound {
                    path: input.display().to_string(),
                });
            }
        }

        Ok(files)
    }

    fn collect_dir(&self, dir: &Path) -> Vec<PathBuf> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|entry| self.matches_patterns(entry.path()))
            .map(|e| e.path().to_path_buf())
            .collect();

        files.sort();
        files
    }

    /// 检查文件是否匹配任一模式
    fn matches_patterns(&self, path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        self.patterns.iter().any(|p| p.matches(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collects_files_and_directories_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.cif"), "").unwrap();
        fs::write(dir.path().join("a.cif"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.cif"), "").unwrap();

        let explicit = dir.path().join("notes.txt");
        let files = FileCollector::new(vec![explicit.clone(), dir.path().to_path_buf()])
            .collect()
            .unwrap();

        assert_eq!(
            files,
            vec![explicit, dir.path().join("a.cif"), dir.path().join("b.cif")]
        );

        let files = FileCollector::new(vec![dir.path().to_path_buf()])
            .recursive(true)
            .collect()
            .unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_custom_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("NaCl.cif"), "").unwrap();
        fs::write(dir.path().join("KCl.CIF"), "").unwrap();

        let files = FileCollector::new(vec![dir.path().to_path_buf()])
            .with_pattern("*.cif, *.CIF")
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(files.len(), 2);

        assert!(FileCollector::new(vec![]).with_pattern("[").is_err());
    }

    #[test]
    fn test_missing_input_is_error() {
        let err = FileCollector::new(vec![PathBuf::from("/nonexistent/x.cif")])
            .collect()
            .unwrap_err();
        assert!(matches!(err, SimError::FileNotFound { .. }));
    }
}
