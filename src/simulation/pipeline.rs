//! # 模拟流水线
//!
//! 对每个输入晶体依次执行：
//! LoadCrystal → DeriveUB → GenerateReflections → Rasterize → SynthesizeBackground
//! → Merge → Mask → BuildPeakList → Emit
//!
//! ## 错误策略
//! - LoadCrystal / DeriveUB / GenerateReflections / BuildPeakList / Emit 失败：
//!   仅跳过当前晶体
//! - Rasterize / SynthesizeBackground / Merge / Mask 失败：整个运行中止
//!
//! ## 确定性
//! 第 i 个晶体使用 `StdRng::seed_from_u64(base_seed + i)`（回绕加法），
//! 结果与工作线程数无关。
//!
//! ## 依赖关系
//! - 被 `commands/create.rs` 调用
//! - 使用 `batch/` 执行逐晶体循环
//! - 使用 `simulation/` 其余组件与 `crystal/` 反射生成

use crate::batch::{BatchResult, BatchRunner, ProcessResult};
use crate::config::SimulationConfig;
use crate::crystal::{OrientationMatrix, ReflectionSource, StructureFactorGenerator};
use crate::error::{Result, SimError};
use crate::models::{Crystal, Lattice};
use crate::parsers;
use crate::simulation::background::BackgroundSynthesizer;
use crate::simulation::export::PersistenceSink;
use crate::simulation::grid::{Extents, Grid};
use crate::simulation::mask::{MaskApplier, MaskVolume};
use crate::simulation::peaks::{PeakList, PeakListBuilder};
use crate::simulation::rasterizer::PeakRasterizer;

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// 逐晶体处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadCrystal,
    DeriveUB,
    GenerateReflections,
    Rasterize,
    SynthesizeBackground,
    Merge,
    Mask,
    BuildPeakList,
    Emit,
}

impl Stage {
    /// 该阶段失败是否中止整个运行
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Stage::Rasterize | Stage::SynthesizeBackground | Stage::Merge | Stage::Mask
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadCrystal => "load crystal",
            Stage::DeriveUB => "derive UB",
            Stage::GenerateReflections => "generate reflections",
            Stage::Rasterize => "rasterize",
            Stage::SynthesizeBackground => "synthesize background",
            Stage::Merge => "merge",
            Stage::Mask => "mask",
            Stage::BuildPeakList => "build peak list",
            Stage::Emit => "emit",
        };
        write!(f, "{}", name)
    }
}

/// 带阶段信息的错误
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: SimError,
}

/// 为 `Result` 标注所处阶段
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

/// 单个晶体的模拟产物
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub crystal: String,
    pub lattice: Lattice,
    pub extents: Extents,
    pub volume: Array3<f64>,
    pub peaks: PeakList,
    pub reflections_generated: usize,
    pub samples_drawn: usize,
    pub samples_binned: usize,
}

/// 模拟流水线
pub struct SimulationPipeline<S = StructureFactorGenerator> {
    config: SimulationConfig,
    grid: Grid,
    masker: MaskApplier,
    source: S,
    rasterizer: PeakRasterizer,
    background: BackgroundSynthesizer,
    peak_builder: PeakListBuilder,
}

impl SimulationPipeline<StructureFactorGenerator> {
    /// 使用结构因子反射生成器
    pub fn new(config: SimulationConfig, mask: Arc<MaskVolume>) -> Result<Self> {
        Self::with_source(config, mask, StructureFactorGenerator::new())
    }
}

impl<S: ReflectionSource + Sync> SimulationPipeline<S> {
    /// 初始化：校验掩膜形状并预计算网格与膨胀掩膜
    pub fn with_source(config: SimulationConfig, mask: Arc<MaskVolume>, source: S) -> Result<Self> {
        mask.check_nbins(config.nbins())?;

        let grid = Grid::new(*config.extents(), config.nbins());
        let masker = MaskApplier::new(mask, config.dilation());

        Ok(Self {
            rasterizer: PeakRasterizer::from_config(&config),
            background: BackgroundSynthesizer::from_config(&config),
            peak_builder: PeakListBuilder::new(config.require_peaks()),
            config,
            grid,
            masker,
            source,
        })
    }

    /// 从已加载的晶体开始模拟（DeriveUB 之后的全部阶段，不含 Emit）
    pub fn simulate_crystal(
        &self,
        crystal: &Crystal,
        rng: &mut StdRng,
    ) -> std::result::Result<SimulationOutput, StageError> {
        let ub = OrientationMatrix::from_lattice(&crystal.lattice).at(Stage::DeriveUB)?;
        log::debug!("[{}] UB = {:?}", crystal.name, ub.0);

        let reflections = self
            .source
            .generate(crystal, self.config.wavelength_range())
            .at(Stage::GenerateReflections)?;

        let raster = self
            .rasterizer
            .rasterize(&reflections, &ub, &self.grid, rng)
            .at(Stage::Rasterize)?;

        let background = self
            .background
            .synthesize(&self.grid, rng)
            .at(Stage::SynthesizeBackground)?;

        let merged = merge(raster.volume, &background).at(Stage::Merge)?;
        drop(background);

        let volume = self.masker.apply(merged).at(Stage::Mask)?;
        let observed = self
            .masker
            .gate(&reflections, &ub, &self.grid)
            .at(Stage::Mask)?;

        log::debug!(
            "[{}] {} of {} reflections inside the dilated mask",
            crystal.name,
            observed.len(),
            reflections.len()
        );

        let peaks = self
            .peak_builder
            .build(observed, ub, &crystal.name)
            .at(Stage::BuildPeakList)?;

        Ok(SimulationOutput {
            crystal: crystal.name.clone(),
            lattice: crystal.lattice.clone(),
            extents: *self.grid.extents(),
            volume,
            peaks,
            reflections_generated: reflections.len(),
            samples_drawn: raster.samples_drawn,
            samples_binned: raster.samples_binned,
        })
    }

    /// 从结构文件开始模拟
    pub fn simulate_file(
        &self,
        path: &Path,
        seed: u64,
    ) -> std::result::Result<SimulationOutput, StageError> {
        let crystal = parsers::parse_structure_file(path).at(Stage::LoadCrystal)?;
        log::debug!(
            "Loaded '{}' ({}, {} atoms) from {}",
            crystal.name,
            crystal.formula(),
            crystal.atoms.len(),
            path.display()
        );

        let mut rng = StdRng::seed_from_u64(seed);
        self.simulate_crystal(&crystal, &mut rng)
    }

    /// 批量运行：第 i 个输入输出为 `{prefix}_{i}`
    pub fn run<P: PersistenceSink + Sync>(
        &self,
        inputs: Vec<PathBuf>,
        sink: &P,
        prefix: &str,
        base_seed: u64,
        jobs: usize,
    ) -> Result<BatchResult> {
        let runner = BatchRunner::new(jobs);
        log::info!(
            "Simulating {} crystals on {} threads (base seed {})",
            inputs.len(),
            runner.jobs(),
            base_seed
        );

        runner.run(inputs, |index, path| {
            let name = format!("{}_{}", prefix, index);
            let seed = base_seed.wrapping_add(index as u64);
            let input = path.display().to_string();

            let outcome = self.simulate_file(path, seed).and_then(|output| {
                sink.emit(&name, &output)
                    .at(Stage::Emit)
                    .map(|_| output)
            });

            match outcome {
                Ok(output) => ProcessResult::Success(format!(
                    "{} -> {}: {} peaks of {} reflections, {} of {} samples binned",
                    output.crystal,
                    name,
                    output.peaks.len(),
                    output.reflections_generated,
                    output.samples_binned,
                    output.samples_drawn
                )),
                Err(e) if e.stage.is_fatal() => {
                    log::error!("Fatal error on {}: {}", input, e);
                    ProcessResult::Fatal(input, e.to_string())
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", input, e);
                    ProcessResult::Failed(input, e.to_string())
                }
            }
        })
    }
}

/// 信号与背景逐体素相加
fn merge(signal: Array3<f64>, background: &Array3<f64>) -> Result<Array3<f64>> {
    if signal.shape() != background.shape() {
        return Err(SimError::ShapeMismatch {
            expected: format!("{:?}", signal.shape()),
            found: format!("{:?}", background.shape()),
        });
    }
    Ok(signal + background)
}
