//! Free memory readings.
//!
//! The firmware image is downloaded into /tmp, which is RAM-backed on the
//! router, so the download needs the image size plus a margin of free memory.

use sysinfo::System;

/// Source of the free-memory figure
pub trait MemoryProbe {
    /// Free memory in bytes
    fn free_bytes(&self) -> Result<u64, String>;
}

/// Reads the kernel's memory accounting through sysinfo
#[derive(Debug, Default)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn free_bytes(&self) -> Result<u64, String> {
        let mut sys = System::new();
        sys.refresh_memory();

        if sys.total_memory() == 0 {
            return Err("memory accounting unavailable".to_string());
        }
        Ok(sys.free_memory())
    }
}

/// Bytes needed to download an image of `size`
pub fn required_bytes(size: u64, margin: u64) -> u64 {
    size.saturating_add(margin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_bytes_saturates() {
        assert_eq!(required_bytes(1024, 2048), 3072);
        assert_eq!(required_bytes(u64::MAX, 1), u64::MAX);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_system_memory_reads_something() {
        let free = SystemMemory.free_bytes().unwrap();
        assert!(free > 0);
    }
}
