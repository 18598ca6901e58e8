//! Compute device selection
//!
//! Detects accelerator hardware and decides where the dream kernels run.
//! All kernels in this crate currently execute on the host, so selecting an
//! accelerator records what was found and falls back to the host.

use std::fmt;
use std::process::Command;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Information about a detected accelerator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorInfo {
    /// GPU name/model
    pub name: String,
    /// Total memory in GB
    pub memory_total_gb: f32,
    /// Free memory in GB
    pub memory_available_gb: f32,
    /// Driver version
    pub driver_version: String,
}

impl AcceleratorInfo {
    /// Detect accelerator information from the system
    ///
    /// Currently supports NVIDIA GPUs via nvidia-smi.
    /// Returns None if no compatible device is found.
    pub fn detect() -> Option<Self> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=name,memory.total,memory.free,driver_version",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        Self::parse_query_line(String::from_utf8_lossy(&output.stdout).lines().next()?)
    }

    /// Parse one `name, total MB, free MB, driver` CSV line
    fn parse_query_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
        if parts.len() < 4 {
            return None;
        }

        let memory_total_mb: f32 = parts[1].parse().ok()?;
        let memory_free_mb: f32 = parts[2].parse().ok()?;

        Some(Self {
            name: parts[0].to_string(),
            memory_total_gb: memory_total_mb / 1024.0,
            memory_available_gb: memory_free_mb / 1024.0,
            driver_version: parts[3].to_string(),
        })
    }
}

/// Where tensors live while an octave is optimized
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ComputeDevice {
    #[default]
    Host,
    /// Detected accelerator; kernels still run on the host
    Accelerator(AcceleratorInfo),
}

impl ComputeDevice {
    /// Pick a device for a run
    ///
    /// Without `use_accelerator` this is always the host. With it, the
    /// detected accelerator is reported and execution falls back to the host.
    pub fn select(use_accelerator: bool) -> Self {
        if !use_accelerator {
            return Self::Host;
        }
        match AcceleratorInfo::detect() {
            Some(gpu) => {
                info!(
                    "Accelerator detected: {} ({:.1}GB available)",
                    gpu.name, gpu.memory_available_gb
                );
                warn!("Dream kernels run on the host; accelerator {} left idle", gpu.name);
                Self::Accelerator(gpu)
            }
            None => {
                warn!("No compatible accelerator detected, using host");
                Self::Host
            }
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }

    /// Hand a tensor to this device's kernels
    ///
    /// A no-op on every variant: kernels only run on the host, so the
    /// tensor is returned unchanged and no memory is copied.
    pub fn to_device(&self, tensor: Tensor) -> Tensor {
        tensor
    }

    /// Take a tensor back from this device's kernels
    ///
    /// A no-op, like [`ComputeDevice::to_device`].
    pub fn to_host(&self, tensor: Tensor) -> Tensor {
        tensor
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        match self {
            Self::Host => "host".to_string(),
            Self::Accelerator(gpu) => format!(
                "{} ({:.1}GB total, {:.1}GB available, driver {})",
                gpu.name, gpu.memory_total_gb, gpu.memory_available_gb, gpu.driver_version
            ),
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_when_not_requested() {
        assert!(ComputeDevice::select(false).is_host());
    }

    #[test]
    fn test_select_with_accelerator_always_returns_a_device() {
        // Falls back to the host when nvidia-smi is missing
        let device = ComputeDevice::select(true);
        assert!(!device.summary().is_empty());
    }

    #[test]
    fn test_parse_query_line() {
        let gpu = AcceleratorInfo::parse_query_line("NVIDIA A10, 24576, 20480, 535.104").unwrap();
        assert_eq!(gpu.name, "NVIDIA A10");
        assert_eq!(gpu.memory_total_gb, 24.0);
        assert_eq!(gpu.memory_available_gb, 20.0);
        assert!(AcceleratorInfo::parse_query_line("garbage").is_none());
    }

    #[test]
    fn test_transfers_preserve_data() {
        let device = ComputeDevice::Host;
        let t = Tensor::from_fn(1, 2, 2, |_, y, x| (y * 2 + x) as f32);
        let back = device.to_host(device.to_device(t.clone()));
        assert_eq!(back, t);
    }
}
