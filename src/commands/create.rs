//! # create 命令实现
//!
//! 对每个输入 CIF 文件运行模拟流水线，写出 `{prefix}_{i}_MD.bin`,
//! `{prefix}_{i}_peaks.csv`, `{prefix}_{i}_UB.mat`。
//!
//! ## 功能
//! - 文件与目录混合输入
//! - 掩膜来自已保存的掩膜文件或现场由探测器表构建
//! - 命令行覆盖 seed / require_peaks / dilation 后统一校验配置
//! - 并行处理（`--jobs`）
//! - 汇总表格输出
//!
//! ## 依赖关系
//! - 使用 `cli/create.rs` 定义的 CreateArgs
//! - 使用 `batch/`, `config.rs`, `simulation/`
//! - 使用 `commands/mask.rs` 构建掩膜

use crate::batch::{BatchResult, FileCollector, ProcessResult};
use crate::cli::create::CreateArgs;
use crate::commands::mask::build_from_instrument;
use crate::config::{RawConfig, SimulationConfig};
use crate::error::{Result, SimError};
use crate::simulation::{export, FileSink, MaskVolume, SimulationPipeline};
use crate::utils::output;

use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};

/// 执行 create 命令
pub fn execute(args: CreateArgs) -> Result<()> {
    output::print_header("Single-Crystal Diffraction Simulation");

    if !args.output.is_dir() {
        return Err(SimError::DirectoryNotFound {
            path: args.output.display().to_string(),
        });
    }

    let files = FileCollector::new(args.inputs.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;
    if files.is_empty() {
        return Err(SimError::NoFilesFound {
            pattern: args.pattern.clone(),
        });
    }
    output::print_info(&format!("Found {} structure files", files.len()));

    let config = load_config(&args)?;
    output::print_info(&format!(
        "Instrument: {}, grid: {}³ bins over {:?}, T = {} K",
        config.instrument_name(),
        config.nbins(),
        config.extents().as_array(),
        config.temperature()
    ));

    let base_seed = config.seed().unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        log::info!("No seed configured, drew base seed {}", seed);
        seed
    });

    let mask = Arc::new(obtain_mask(&args, &config)?);
    output::print_info(&format!(
        "Mask: {} of {} voxels covered",
        mask.count(),
        config.nbins().pow(3)
    ));

    let pipeline = SimulationPipeline::new(config, mask)?;
    let sink = FileSink::new(&args.output);
    let result = pipeline.run(files.clone(), &sink, &args.prefix, base_seed, args.jobs)?;

    print_summary(&files, &result);
    if result.failed > 0 {
        output::print_warning(&format!(
            "{} crystals failed and produced no artifacts",
            result.failed
        ));
    }
    output::print_separator();
    output::print_done(&format!(
        "{} simulated, {} failed, {} cancelled (base seed {})",
        result.success, result.failed, result.cancelled, base_seed
    ));

    if let Some((input, err)) = result.fatal {
        return Err(SimError::Other(format!(
            "Run aborted while processing {}: {}",
            input, err
        )));
    }

    Ok(())
}

/// 读取配置文件，应用命令行覆盖后校验
fn load_config(args: &CreateArgs) -> Result<SimulationConfig> {
    let mut raw = RawConfig::from_file(&args.config)?;

    if args.seed.is_some() {
        raw.seed = args.seed;
    }
    if args.require_peaks {
        raw.require_peaks = true;
    }
    if let Some(dilation) = args.dilation {
        raw.dilation = dilation.into();
    }

    raw.validate()
}

/// 读取掩膜文件或由探测器表构建掩膜
fn obtain_mask(args: &CreateArgs, config: &SimulationConfig) -> Result<MaskVolume> {
    match (&args.mask, &args.instrument_file) {
        (Some(path), _) => {
            output::print_info(&format!("Loading mask from '{}'", path.display()));
            export::load_mask(path, config.nbins())
        }
        (None, Some(path)) => {
            output::print_info(&format!(
                "Building mask from detector table '{}'",
                path.display()
            ));
            build_from_instrument(path, config)
        }
        (None, None) => Err(SimError::Other(
            "Either --mask or --instrument-file is required".to_string(),
        )),
    }
}

/// 打印逐晶体结果表
fn print_summary(files: &[PathBuf], result: &BatchResult) {
    #[derive(Tabled)]
    struct OutcomeRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "Input")]
        input: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Detail")]
        detail: String,
    }

    let rows: Vec<OutcomeRow> = files
        .iter()
        .zip(&result.outcomes)
        .enumerate()
        .map(|(index, (file, outcome))| {
            let (status, detail) = match outcome {
                ProcessResult::Success(msg) => ("OK", msg.clone()),
                ProcessResult::Failed(_, err) => ("FAILED", err.clone()),
                ProcessResult::Fatal(_, err) => ("FATAL", err.clone()),
                ProcessResult::Cancelled(_) => ("CANCELLED", String::new()),
            };
            OutcomeRow {
                index,
                input: file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.display().to_string()),
                status: status.to_string(),
                detail,
            }
        })
        .collect();

    if !rows.is_empty() {
        output::print_header("Simulation Summary");
        println!("{}", Table::new(&rows));
    }
}
