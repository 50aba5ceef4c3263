//! Accelerator memory probing.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstudio_core::runtime::Precision;

use crate::error::RuntimeError;

const MIB: u64 = 1024 * 1024;

/// One accelerator as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorInfo {
    pub index: u32,
    pub name: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
    /// CUDA compute capability `(major, minor)`, when known.
    pub compute_capability: Option<(u32, u32)>,
}

impl AcceleratorInfo {
    /// bfloat16 needs compute capability 8.0 (Ampere) or newer.
    pub fn supports_bf16(&self) -> bool {
        matches!(self.compute_capability, Some((major, _)) if major >= 8)
    }
}

/// Point-in-time view of the accelerators visible to this process. An
/// empty list means no accelerator (CPU host or hosted runtime).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub accelerators: Vec<AcceleratorInfo>,
}

impl ResourceSnapshot {
    pub fn single_device(free_bytes: u64, compute_capability: (u32, u32)) -> Self {
        Self {
            accelerators: vec![AcceleratorInfo {
                index: 0,
                name: "device-0".to_string(),
                total_bytes: free_bytes,
                free_bytes,
                compute_capability: Some(compute_capability),
            }],
        }
    }

    pub fn free_bytes(&self) -> u64 {
        self.accelerators.iter().map(|a| a.free_bytes).sum()
    }

    pub fn device_count(&self) -> u32 {
        self.accelerators.len() as u32
    }

    /// Whether every device can compute in `precision`.
    pub fn supports(&self, precision: Precision) -> bool {
        match precision {
            Precision::Float32 | Precision::Float16 => true,
            Precision::BFloat16 => {
                !self.accelerators.is_empty() && self.accelerators.iter().all(AcceleratorInfo::supports_bf16)
            }
        }
    }
}

/// Reports currently available accelerator memory.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn probe(&self) -> Result<ResourceSnapshot, RuntimeError>;
}

/// Probe backed by `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    binary: PathBuf,
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("nvidia-smi"),
        }
    }
}

impl NvidiaSmiProbe {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ResourceProbe for NvidiaSmiProbe {
    async fn probe(&self) -> Result<ResourceSnapshot, RuntimeError> {
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "--query-gpu=index,name,memory.total,memory.free,compute_cap",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .await
            .map_err(|e| RuntimeError::Probe(format!("{}: {e}", self.binary.display())))?;

        if !output.status.success() {
            return Err(RuntimeError::Probe(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let accelerators = parse_nvidia_smi(&stdout)?;
        debug!(
            devices = accelerators.len(),
            free_bytes = accelerators.iter().map(|a| a.free_bytes).sum::<u64>(),
            "probed accelerators"
        );
        Ok(ResourceSnapshot { accelerators })
    }
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` output for the columns
/// `index, name, memory.total, memory.free, compute_cap`. Memory is in MiB.
pub fn parse_nvidia_smi(output: &str) -> Result<Vec<AcceleratorInfo>, RuntimeError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<AcceleratorInfo, RuntimeError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [index, name, total, free, cap] = fields.as_slice() else {
        return Err(RuntimeError::Probe(format!("unexpected nvidia-smi line: {line}")));
    };

    let number = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| RuntimeError::Probe(format!("not a number in nvidia-smi output: {s}")))
    };

    Ok(AcceleratorInfo {
        index: number(*index)? as u32,
        name: name.to_string(),
        total_bytes: number(*total)? * MIB,
        free_bytes: number(*free)? * MIB,
        compute_capability: parse_compute_cap(cap),
    })
}

fn parse_compute_cap(cap: &str) -> Option<(u32, u32)> {
    let (major, minor) = cap.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Probe that reports a configured snapshot. Used on hosts without
/// accelerators and in tests; the snapshot can be replaced between probes.
#[derive(Debug, Default)]
pub struct FixedProbe {
    snapshot: Mutex<ResourceSnapshot>,
}

impl FixedProbe {
    pub fn new(snapshot: ResourceSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    /// A single device with `free_bytes` free.
    pub fn single_device(free_bytes: u64, compute_capability: (u32, u32)) -> Self {
        Self::new(ResourceSnapshot::single_device(free_bytes, compute_capability))
    }

    pub fn set(&self, snapshot: ResourceSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

#[async_trait]
impl ResourceProbe for FixedProbe {
    async fn probe(&self) -> Result<ResourceSnapshot, RuntimeError> {
        // The snapshot is replaced whole, so a panicked writer cannot leave it torn.
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
