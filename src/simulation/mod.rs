//! # 倒空间模拟模块
//!
//! 单晶中子衍射数据的正向模拟核心。
//!
//! ## 子模块
//! - `grid`: Q 空间包围盒与体素网格
//! - `rasterizer`: 反射 → 信号直方图（PeakRasterizer）
//! - `background`: Debye–Waller 加权热背景（BackgroundSynthesizer）
//! - `mask`: 仪器掩膜、膨胀与门控（MaskApplier）
//! - `instrument`: 由探测器像素表构建掩膜
//! - `peaks`: 观测峰列表（PeakListBuilder）
//! - `pipeline`: 逐晶体流水线（SimulationPipeline）
//! - `export`: 产物持久化
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `crystal/`, `parsers/`, `batch/`, `config.rs`

pub mod background;
pub mod export;
pub mod grid;
pub mod instrument;
pub mod mask;
pub mod peaks;
pub mod pipeline;
pub mod rasterizer;

pub use export::FileSink;
pub use grid::Grid;
pub use mask::{Connectivity, MaskVolume};
pub use pipeline::SimulationPipeline;
