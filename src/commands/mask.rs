//! # mask 命令实现
//!
//! 由探测器像素表构建仪器覆盖掩膜并保存。掩膜只需构建一次，
//! 之后可被使用相同 extents / nbins 的 `create` 运行复用。
//!
//! ## 依赖关系
//! - 使用 `cli/mask.rs` 定义的参数
//! - 使用 `parsers/instrument.rs`, `simulation/instrument.rs`, `simulation/export.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::cli::mask::MaskArgs;
use crate::config::{RawConfig, SimulationConfig};
use crate::error::{Result, SimError};
use crate::parsers::instrument::parse_instrument_file;
use crate::simulation::export;
use crate::simulation::instrument::build_instrument_mask;
use crate::simulation::{Grid, MaskVolume};
use crate::utils::{output, progress};

use std::path::Path;

/// 执行 mask 命令
pub fn execute(args: MaskArgs) -> Result<()> {
    output::print_header("Building Instrument Mask");

    if !args.input.is_file() {
        return Err(SimError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }
    ensure_parent_dir(&args.output)?;

    let mut raw = RawConfig::from_file(&args.config)?;
    if let Some(nbins) = args.nbins {
        raw.nbins = nbins as i64;
    }
    let config = raw.validate()?;

    output::print_info(&format!(
        "Instrument: {}, grid: {}³ bins over {:?}",
        config.instrument_name(),
        config.nbins(),
        config.extents().as_array()
    ));

    let spinner = progress::create_spinner("Tracing detector pixels through Q-space...");
    let mask = build_from_instrument(&args.input, &config);
    spinner.finish_and_clear();
    let mask = mask?;

    export::save_mask(&args.output, &mask)?;

    output::print_success(&format!(
        "Mask saved to '{}' ({} of {} voxels covered)",
        args.output.display(),
        mask.count(),
        config.nbins().pow(3)
    ));

    Ok(())
}

/// 读取像素表并按配置的网格与波段构建掩膜
pub fn build_from_instrument(path: &Path, config: &SimulationConfig) -> Result<MaskVolume> {
    let pixels = parse_instrument_file(path)?;
    log::info!("Loaded {} detector pixels from {}", pixels.len(), path.display());

    let grid = Grid::new(*config.extents(), config.nbins());
    build_instrument_mask(&pixels, &grid, config.wavelength_range())
}

/// 输出文件所在目录必须已存在
fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(SimError::DirectoryNotFound {
                path: parent.display().to_string(),
            })
        }
        _ => Ok(()),
    }
}
