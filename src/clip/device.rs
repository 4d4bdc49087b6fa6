//! Hardware acceleration detection for model introspection.

use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccelerationInfo {
    pub cuda_available: bool,
    pub cuda_device_count: usize,
}

impl AccelerationInfo {
    /// Look for a loaded NVIDIA driver and count its device nodes.
    pub fn detect() -> Self {
        Self::detect_at(Path::new("/proc/driver/nvidia"), Path::new("/dev"))
    }

    fn detect_at(driver_dir: &Path, dev_dir: &Path) -> Self {
        if !driver_dir.exists() {
            return Self::default();
        }

        let cuda_device_count = std::fs::read_dir(dev_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| is_gpu_node(&e.file_name().to_string_lossy()))
                    .count()
            })
            .unwrap_or(0);

        Self {
            cuda_available: cuda_device_count > 0,
            cuda_device_count,
        }
    }
}

/// `nvidia0`, `nvidia1`, ... but not `nvidiactl` or `nvidia-uvm`
fn is_gpu_node(name: &str) -> bool {
    name.strip_prefix("nvidia")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}
