use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStats {
    /// Capacity of the filesystem in bytes
    pub total: u64,

    /// Bytes in use, including blocks reserved for root
    pub used: u64,

    /// Bytes available to unprivileged users
    pub free: u64,
}

impl DiskStats {
    pub fn percentage(&self) -> f32 {
        if self.total > 0 {
            (self.used as f32 / self.total as f32) * 100.0
        } else {
            0.0
        }
    }
}

/// Usage of the filesystem containing `path`, straight from `statvfs(2)`.
#[cfg(unix)]
pub fn disk_usage(path: &Path) -> Result<DiskStats> {
    let stat = rustix::fs::statvfs(path).map_err(|e| Error::Metrics {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    let fragment = stat.f_frsize;
    let total = stat.f_blocks * fragment;
    let used = stat.f_blocks.saturating_sub(stat.f_bfree) * fragment;
    let free = stat.f_bavail * fragment;

    Ok(DiskStats { total, used, free })
}

/// Usage of the disk mounted exactly at `path`, as reported by sysinfo.
#[cfg(not(unix))]
pub fn disk_usage(path: &Path) -> Result<DiskStats> {
    use std::io;
    use sysinfo::Disks;

    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == path)
        .ok_or_else(|| Error::Metrics {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "no disk mounted at path"),
        })?;

    let total = disk.total_space();
    let free = disk.available_space();
    Ok(DiskStats {
        total,
        used: total.saturating_sub(free),
        free,
    })
}
