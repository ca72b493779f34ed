use super::{RawCounters, ResourceSnapshot, SampleOptions, Unit};
use crate::error::Result;
use crate::utils::disk;
use std::path::{Path, PathBuf};
use sysinfo::{Networks, System};
use tracing::debug;

/// Where raw counters come from.
pub trait MetricsSource {
    fn read(&mut self) -> Result<RawCounters>;
}

/// Live host counters via sysinfo, with disk usage from the filesystem at
/// `disk_path`.
///
/// CPU usage is the average since the previous read; the first read has no
/// baseline and reports 0.0.
pub struct SysinfoSource {
    system: System,
    networks: Networks,
    disk_path: PathBuf,
    cpu_baseline: bool,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self::with_disk_path("/")
    }

    pub fn with_disk_path(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            disk_path: disk_path.into(),
            cpu_baseline: false,
        }
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }
}

impl MetricsSource for SysinfoSource {
    fn read(&mut self) -> Result<RawCounters> {
        let disk = disk::disk_usage(&self.disk_path)?;

        self.system.refresh_memory();
        self.system.refresh_cpu_usage();
        self.networks.refresh_list();

        let cpu_percent = if self.cpu_baseline {
            self.system.global_cpu_info().cpu_usage()
        } else {
            self.cpu_baseline = true;
            0.0
        };

        let (network_sent, network_received) = self
            .networks
            .list()
            .values()
            .fold((0u64, 0u64), |(sent, received), data| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    received.saturating_add(data.total_received()),
                )
            });

        Ok(RawCounters {
            cpu_percent,
            memory_used: self.system.used_memory(),
            memory_total: self.system.total_memory(),
            disk_used: disk.used,
            disk_total: disk.total,
            network_sent,
            network_received,
        })
    }
}

/// Reads a metrics source and converts it into snapshots.
pub struct ResourceSampler<S = SysinfoSource> {
    source: S,
}

impl Default for ResourceSampler<SysinfoSource> {
    fn default() -> Self {
        Self::new(SysinfoSource::new())
    }
}

impl<S: MetricsSource> ResourceSampler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sample with `unit` and `round`, truncating.
    pub fn sample(&mut self, unit: Unit, round: u32) -> Result<ResourceSnapshot> {
        self.sample_with(&SampleOptions::new(unit, round))
    }

    pub fn sample_with(&mut self, options: &SampleOptions) -> Result<ResourceSnapshot> {
        let raw = self.source.read()?;
        debug!("Raw resource counters: {:?}", raw);
        Ok(ResourceSnapshot::from_raw(&raw, options))
    }
}
