//! # 模拟结果持久化
//!
//! 每个晶体写出三个文件，基名为 `{dir}/{prefix}_{i}`：
//! - `_MD.bin`: 三维信号体积（`SCDVOL01` 魔数 + u32 LE 头长度 + JSON 头 + f64 LE 数据，C 序）
//! - `_peaks.csv`: `h,k,l,qx,qy,qz,d_spacing,intensity`
//! - `_UB.mat`: ISAW 风格文本（UBᵀ 三行、晶胞参数 + 体积、零误差行、注释）
//!
//! 任一文件写入失败时，已写出的文件作为孤儿文件以警告报告，错误继续上抛。
//!
//! 另提供掩膜文件读写：`SCDMASK1` 魔数 + u64 LE nbins + nbins³ 字节（0/1）。
//!
//! ## 依赖关系
//! - 被 `simulation/pipeline.rs` 与 `commands/` 调用
//! - 使用 `serde_json` 写体积头，`csv` 写峰列表

use crate::crystal::OrientationMatrix;
use crate::error::{Result, SimError};
use crate::models::Lattice;
use crate::simulation::mask::MaskVolume;
use crate::simulation::peaks::PeakList;
use crate::simulation::pipeline::SimulationOutput;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const VOLUME_MAGIC: &[u8; 8] = b"SCDVOL01";
const MASK_MAGIC: &[u8; 8] = b"SCDMASK1";

/// 三个产物的文件名后缀
pub const ARTIFACT_SUFFIXES: [&str; 3] = ["_MD.bin", "_peaks.csv", "_UB.mat"];

/// 持久化接收端
pub trait PersistenceSink {
    /// 写出一个晶体的全部产物，返回写出的路径
    fn emit(&self, name: &str, output: &SimulationOutput) -> Result<Vec<PathBuf>>;
}

/// 写入目录的文件接收端
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 产物路径
    pub fn artifact_path(&self, name: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, suffix))
    }
}

impl PersistenceSink for FileSink {
    fn emit(&self, name: &str, output: &SimulationOutput) -> Result<Vec<PathBuf>> {
        let header = VolumeHeader::new(output);
        let writers: [&dyn Fn(&Path) -> Result<()>; 3] = [
            &|path: &Path| write_volume(path, &header, &output.volume),
            &|path: &Path| write_peaks_csv(path, &output.peaks),
            &|path: &Path| write_isaw_ub(path, output.peaks.ub(), &output.lattice),
        ];

        let mut written = Vec::with_capacity(writers.len());
        for (suffix, write) in ARTIFACT_SUFFIXES.iter().zip(writers) {
            let path = self.artifact_path(name, suffix);
            if let Err(e) = write(path.as_path()) {
                if !written.is_empty() {
                    let orphans: Vec<String> =
                        written.iter().map(|p: &PathBuf| p.display().to_string()).collect();
                    log::warn!(
                        "Orphaned artifacts for '{}' after failed write: {}",
                        name,
                        orphans.join(", ")
                    );
                }
                return Err(e);
            }
            written.push(path);
        }

        log::debug!("Wrote {} artifacts for '{}'", written.len(), name);
        Ok(written)
    }
}

// ─────────────────────────────────────────────────────────────
// 信号体积
// ─────────────────────────────────────────────────────────────

/// 体积文件 JSON 头
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeHeader {
    pub crystal: String,
    pub dimensions: Vec<String>,
    pub units: String,
    pub extents: [f64; 6],
    pub nbins: usize,
    pub signal_count: usize,
    pub encoding: String,
}

impl VolumeHeader {
    pub fn new(output: &SimulationOutput) -> Self {
        Self {
            crystal: output.crystal.clone(),
            dimensions: vec!["Q_lab_x".into(), "Q_lab_y".into(), "Q_lab_z".into()],
            units: "A^-1".to_string(),
            extents: output.extents.as_array(),
            nbins: output.volume.shape()[0],
            signal_count: output.volume.len(),
            encoding: "f64-le".to_string(),
        }
    }
}

/// 写出信号体积
pub fn write_volume(path: &Path, header: &VolumeHeader, volume: &Array3<f64>) -> Result<()> {
    let header_json = serde_json::to_vec(header)?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| SimError::Other("Volume header too large".to_string()))?;

    let write = || -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(VOLUME_MAGIC)?;
        w.write_all(&header_len.to_le_bytes())?;
        w.write_all(&header_json)?;
        for value in volume.iter() {
            w.write_all(&value.to_le_bytes())?;
        }
        w.flush()
    };

    write().map_err(|e| SimError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取信号体积
#[cfg(test)]
pub fn read_volume(path: &Path) -> Result<(VolumeHeader, Array3<f64>)> {
    let bytes = read_bytes(path)?;
    let bad = |reason: &str| SimError::ParseError {
        format: "volume".to_string(),
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < 12 || &bytes[..8] != VOLUME_MAGIC {
        return Err(bad("missing SCDVOL01 magic"));
    }
    let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let data_start = 12 + header_len;
    if bytes.len() < data_start {
        return Err(bad("truncated header"));
    }

    let header: VolumeHeader = serde_json::from_slice(&bytes[12..data_start])?;
    let n = header.nbins;
    if bytes.len() - data_start != n * n * n * 8 {
        return Err(bad("signal length does not match nbins"));
    }

    let values: Vec<f64> = bytes[data_start..]
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect();
    let volume = Array3::from_shape_vec((n, n, n), values).map_err(|e| bad(&e.to_string()))?;

    Ok((header, volume))
}

// ─────────────────────────────────────────────────────────────
// 峰列表
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PeakRecord {
    h: i32,
    k: i32,
    l: i32,
    qx: f64,
    qy: f64,
    qz: f64,
    d_spacing: f64,
    intensity: f64,
}

/// 写出峰列表 CSV
pub fn write_peaks_csv(path: &Path, peaks: &PeakList) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    // 空列表也写表头
    if peaks.is_empty() {
        wtr.write_record([
            "h", "k", "l", "qx", "qy", "qz", "d_spacing", "intensity",
        ])?;
    }

    for reflection in peaks.reflections() {
        let q = peaks.ub().q_lab(reflection.hkl);
        wtr.serialize(PeakRecord {
            h: reflection.hkl[0],
            k: reflection.hkl[1],
            l: reflection.hkl[2],
            qx: q[0],
            qy: q[1],
            qz: q[2],
            d_spacing: reflection.d_spacing,
            intensity: reflection.intensity,
        })?;
    }

    wtr.flush().map_err(|e| SimError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────
// UB 矩阵（ISAW 格式）
// ─────────────────────────────────────────────────────────────

/// 写出 ISAW 风格 UB 文件
pub fn write_isaw_ub(path: &Path, ub: &OrientationMatrix, lattice: &Lattice) -> Result<()> {
    let mut content = String::new();
    for row in ub.transposed() {
        content.push_str(&format!("{:14.8} {:14.8} {:14.8}\n", row[0], row[1], row[2]));
    }

    let (a, b, c, alpha, beta, gamma) = lattice.parameters();
    content.push_str(&format!(
        "{:10.4} {:10.4} {:10.4} {:10.4} {:10.4} {:10.4} {:12.4}\n",
        a,
        b,
        c,
        alpha,
        beta,
        gamma,
        lattice.volume().abs()
    ));
    content.push_str(&format!(
        "{:10.4} {:10.4} {:10.4} {:10.4} {:10.4} {:10.4} {:12.4}\n",
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0
    ));
    content.push('\n');
    content.push_str("The above matrix is the transpose of the UB matrix. UB maps the column\n");
    content.push_str("vector (h, k, l) to the column vector (Qx, Qy, Qz) with |Q| = 1/d.\n");
    content.push_str("Default orientation: U = identity, B in the Busing-Levy convention.\n");

    fs::write(path, content).map_err(|e| SimError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取 ISAW 风格 UB 文件
#[cfg(test)]
pub fn read_isaw_ub(path: &Path) -> Result<OrientationMatrix> {
    let content = fs::read_to_string(path).map_err(|e| SimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut transposed = [[0.0; 3]; 3];
    let mut lines = content.lines();
    for row in transposed.iter_mut() {
        let values: Vec<f64> = lines
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SimError::ParseError {
                format: "UB".to_string(),
                path: path.display().to_string(),
                reason: format!("{}", e),
            })?;
        if values.len() != 3 {
            return Err(SimError::ParseError {
                format: "UB".to_string(),
                path: path.display().to_string(),
                reason: format!("expected 3 values per matrix row, found {}", values.len()),
            });
        }
        row.copy_from_slice(&values);
    }

    Ok(OrientationMatrix(OrientationMatrix(transposed).transposed()))
}

// ─────────────────────────────────────────────────────────────
// 掩膜
// ─────────────────────────────────────────────────────────────

/// 保存掩膜产物
pub fn save_mask(path: &Path, mask: &MaskVolume) -> Result<()> {
    let write = || -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(MASK_MAGIC)?;
        w.write_all(&(mask.nbins() as u64).to_le_bytes())?;
        let bytes: Vec<u8> = mask.data().iter().map(|&on| u8::from(on)).collect();
        w.write_all(&bytes)?;
        w.flush()
    };

    write().map_err(|e| SimError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取掩膜产物并校验分箱数
pub fn load_mask(path: &Path, expected_nbins: usize) -> Result<MaskVolume> {
    let bytes = read_bytes(path)?;
    let bad = |reason: String| SimError::ParseError {
        format: "mask".to_string(),
        path: path.display().to_string(),
        reason,
    };

    if bytes.len() < 16 || &bytes[..8] != MASK_MAGIC {
        return Err(bad("missing SCDMASK1 magic".to_string()));
    }

    let mut nbins_bytes = [0u8; 8];
    nbins_bytes.copy_from_slice(&bytes[8..16]);
    let nbins = u64::from_le_bytes(nbins_bytes) as usize;
    if nbins != expected_nbins {
        return Err(SimError::cube_mismatch(expected_nbins, &[nbins, nbins, nbins]));
    }

    let payload = &bytes[16..];
    let voxels = nbins
        .checked_mul(nbins)
        .and_then(|v| v.checked_mul(nbins))
        .ok_or_else(|| bad(format!("nbins {} is too large", nbins)))?;
    if payload.len() != voxels {
        return Err(bad(format!(
            "expected {} voxels, found {} bytes",
            voxels,
            payload.len()
        )));
    }
    if let Some(v) = payload.iter().find(|&&b| b > 1) {
        return Err(bad(format!("voxel value {} is not 0 or 1", v)));
    }

    let voxels: Vec<bool> = payload.iter().map(|&b| b == 1).collect();
    let data = Array3::from_shape_vec((nbins, nbins, nbins), voxels)
        .map_err(|e| bad(e.to_string()))?;
    MaskVolume::new(data)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(SimError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    fs::read(path).map_err(|e| SimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::Reflection;
    use crate::simulation::grid::Extents;
    use crate::simulation::peaks::PeakListBuilder;
    use tempfile::TempDir;

    fn sample_output() -> SimulationOutput {
        let ub = OrientationMatrix([[0.2, 0.0, 0.0], [0.0, 0.25, 0.0], [0.01, 0.0, 0.1]]);
        let peaks = PeakListBuilder::new(false)
            .build(
                vec![
                    Reflection::new([1, 0, 0], 12.5, 5.0),
                    Reflection::new([0, -1, 2], 3.25, 2.0),
                ],
                ub,
                "test",
            )
            .unwrap();

        SimulationOutput {
            crystal: "test".to_string(),
            lattice: Lattice::from_parameters(5.0, 4.0, 10.0, 90.0, 90.0, 90.0),
            extents: Extents::from_slice(&[-1.0, 1.0, -2.0, 2.0, 0.0, 3.0]).unwrap(),
            volume: Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i * 9 + j * 3 + k) as f64 - 4.5),
            peaks,
            reflections_generated: 5,
            samples_drawn: 2,
            samples_binned: 1,
        }
    }

    #[test]
    fn test_emit_writes_three_artifacts() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let output = sample_output();

        let written = sink.emit("SXD_0", &output).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("SXD_0_MD.bin").is_file());
        assert!(dir.path().join("SXD_0_peaks.csv").is_file());
        assert!(dir.path().join("SXD_0_UB.mat").is_file());

        let (header, volume) = read_volume(&dir.path().join("SXD_0_MD.bin")).unwrap();
        assert_eq!(header.nbins, 3);
        assert_eq!(header.extents, [-1.0, 1.0, -2.0, 2.0, 0.0, 3.0]);
        assert_eq!(header.dimensions[2], "Q_lab_z");
        assert_eq!(volume, output.volume);
        assert_eq!(volume[[0, 1, 2]], 0.5);
    }

    #[test]
    fn test_peaks_csv_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peaks.csv");
        let output = sample_output();
        write_peaks_csv(&path, &output.peaks).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["h", "k", "l", "qx", "qy", "qz", "d_spacing", "intensity"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][1], "-1");
        assert_eq!(&rows[1][7], "3.25");
    }

    #[test]
    fn test_empty_peaks_csv_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        let peaks = PeakListBuilder::new(false)
            .build(Vec::new(), OrientationMatrix::identity(), "empty")
            .unwrap();
        write_peaks_csv(&path, &peaks).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "h,k,l,qx,qy,qz,d_spacing,intensity");
    }

    #[test]
    fn test_isaw_ub_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_UB.mat");
        let output = sample_output();
        write_isaw_ub(&path, output.peaks.ub(), &output.lattice).unwrap();

        let ub = read_isaw_ub(&path).unwrap();
        for (row, expected) in ub.0.iter().zip(output.peaks.ub().0.iter()) {
            for (a, b) in row.iter().zip(expected) {
                assert!((a - b).abs() < 1e-8);
            }
        }

        let content = fs::read_to_string(&path).unwrap();
        let first: Vec<&str> = content.lines().next().unwrap().split_whitespace().collect();
        // 第一行是 UB 的第一列
        assert_eq!(first, vec!["0.20000000", "0.00000000", "0.01000000"]);
        assert!(content.lines().nth(3).unwrap().contains("200.0000"));
    }

    #[test]
    fn test_mask_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.bin");
        let mut mask = MaskVolume::filled(4, false);
        mask.set((0, 1, 2));
        mask.set((3, 3, 3));

        save_mask(&path, &mask).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 16 + 64);
        assert_eq!(load_mask(&path, 4).unwrap(), mask);
    }

    #[test]
    fn test_mask_with_wrong_nbins_is_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.bin");
        save_mask(&path, &MaskVolume::filled(2, true)).unwrap();

        let err = load_mask(&path, 300).unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_truncated_mask_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.bin");
        let mut bytes = MASK_MAGIC.to_vec();
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&[1, 0, 1]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(load_mask(&path, 2), Err(SimError::ParseError { .. })));
        assert!(matches!(
            load_mask(&dir.path().join("missing.bin"), 2),
            Err(SimError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_failed_artifact_reports_error() {
        let dir = TempDir::new().unwrap();
        // 目标目录不存在
        let sink = FileSink::new(dir.path().join("missing"));
        let err = sink.emit("SXD_0", &sample_output()).unwrap_err();
        assert!(matches!(err, SimError::FileWriteError { .. }));
    }

    #[test]
    fn test_failed_later_artifact_leaves_earlier_ones() {
        let dir = TempDir::new().unwrap();
        // 以同名目录占位，峰列表无法创建
        fs::create_dir(dir.path().join("SXD_0_peaks.csv")).unwrap();

        let sink = FileSink::new(dir.path());
        let result = sink.emit("SXD_0", &sample_output());

        assert!(result.is_err());
        assert!(dir.path().join("SXD_0_MD.bin").is_file());
        assert!(dir.path().join("SXD_0_peaks.csv").is_dir());
        assert!(!dir.path().join("SXD_0_UB.mat").exists());
    }
}
