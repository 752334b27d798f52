//! # 批量执行器
//!
//! 在 rayon 线程池上执行逐项处理任务。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，结果保持输入顺序
//! - 进度条显示
//! - 致命错误时设置中止标志，尚未开始的项目记为取消
//! - 错误收集与汇总报告
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{Result, SimError};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// 单项处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// 处理成功
    Success(String),
    /// 处理失败，仅影响该项
    Failed(String, String), // (输入, 错误信息)
    /// 致命错误，中止剩余队列
    Fatal(String, String),
    /// 因中止而未执行
    Cancelled(String),
}

/// 批量处理结果统计
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 成功数量
    pub success: usize,
    /// 失败数量
    pub failed: usize,
    /// 取消数量
    pub cancelled: usize,
    /// 失败详情
    pub failures: Vec<(String, String)>,
    /// 首个致命错误
    pub fatal: Option<(String, String)>,
    /// 按输入顺序的全部结果
    pub outcomes: Vec<ProcessResult>,
}

impl BatchResult {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult) {
        match &result {
            ProcessResult::Success(_) => self.success += 1,
            ProcessResult::Failed(input, err) => {
                self.failed += 1;
                self.failures.push((input.clone(), err.clone()));
            }
            ProcessResult::Fatal(input, err) => {
                self.failed += 1;
                if self.fatal.is_none() {
                    self.fatal = Some((input.clone(), err.clone()));
                }
            }
            ProcessResult::Cancelled(_) => self.cancelled += 1,
        }
        self.outcomes.push(result);
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
}

impl BatchRunner {
    /// 创建新的批量执行器；0 表示使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self { jobs }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理文件列表；处理函数接收输入序号与文件路径
    pub fn run<F>(&self, files: Vec<PathBuf>, processor: F) -> Result<BatchResult>
    where
        F: Fn(usize, &PathBuf) -> ProcessResult + Sync + Send,
    {
        let pb = progress::create_progress_bar(files.len() as u64, "Simulating");
        let abort = AtomicBool::new(false);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| SimError::Other(format!("Failed to build thread pool: {}", e)))?;

        let results: Vec<ProcessResult> = pool.install(|| {
            files
                .par_iter()
                .enumerate()
                .map(|(index, file)| {
                    if abort.load(Ordering::SeqCst) {
                        return ProcessResult::Cancelled(file.display().to_string());
                    }

                    let result = processor(index, file);
                    if matches!(result, ProcessResult::Fatal(..)) {
                        abort.store(true, Ordering::SeqCst);
                    }

                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }

        Ok(batch_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("item{}.cif", i))).collect()
    }

    #[test]
    fn test_results_keep_input_order() {
        let runner = BatchRunner::new(4);
        let result = runner
            .run(files(20), |index, file| {
                ProcessResult::Success(format!("{}:{}", index, file.display()))
            })
            .unwrap();

        assert_eq!(result.success, 20);
        assert_eq!(
            result.outcomes[7],
            ProcessResult::Success("7:item7.cif".to_string())
        );
    }

    #[test]
    fn test_failures_are_collected() {
        let runner = BatchRunner::new(1);
        let result = runner
            .run(files(3), |index, file| {
                let name = file.display().to_string();
                if index == 1 {
                    ProcessResult::Failed(name, "bad input".to_string())
                } else {
                    ProcessResult::Success(name)
                }
            })
            .unwrap();

        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(
            result.failures,
            vec![("item1.cif".to_string(), "bad input".to_string())]
        );
        assert!(result.fatal.is_none());
        assert_eq!(result.outcomes.len(), 3);
    }

    #[test]
    fn test_fatal_cancels_remaining_queue() {
        let runner = BatchRunner::new(1);
        let calls = AtomicUsize::new(0);

        let result = runner
            .run(files(10), |index, file| {
                calls.fetch_add(1, Ordering::SeqCst);
                let name = file.display().to_string();
                if index == 2 {
                    ProcessResult::Fatal(name, "shape mismatch".to_string())
                } else {
                    ProcessResult::Success(name)
                }
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.success, 2);
        assert_eq!(result.cancelled, 7);
        assert_eq!(
            result.fatal,
            Some(("item2.cif".to_string(), "shape mismatch".to_string()))
        );
    }
}
