//! The data model served by the manager: specs, stats samples and the combined
//! [`ContainerInfo`] returned by queries.
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::container::ContainerReference;

/// Number of samples returned when a request does not say otherwise.
pub const DEFAULT_NUM_STATS: usize = 60;

const DEFAULT_CPU_PERIOD_USEC: u64 = 100_000;

/// CPU limits, as configured in `cpu.max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSpec {
    /// Allowed CPU time per period. `None` means unlimited.
    pub quota_usec: Option<u64>,
    pub period_usec: u64,
}

impl Default for CpuSpec {
    fn default() -> Self {
        Self {
            quota_usec: None,
            period_usec: DEFAULT_CPU_PERIOD_USEC,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpec {
    /// `None` means unlimited.
    pub limit_bytes: Option<u64>,
}

/// Mostly static description of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub creation_time: Option<SystemTime>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub image: Option<String>,
    pub has_cpu: bool,
    pub cpu: CpuSpec,
    pub has_memory: bool,
    pub memory: MemorySpec,
}

/// CPU usage counters from `cpu.stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    pub nr_periods: u64,
    pub nr_throttled: u64,
    pub throttled_usec: u64,
}

/// Memory usage from `memory.current` and `memory.stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub usage_bytes: u64,
    pub anon: u64,
    pub file: u64,
    pub kernel_stack: u64,
    pub slab: u64,
    pub sock: u64,
    pub shmem: u64,
    pub file_mapped: u64,
}

/// A single point-in-time sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub timestamp: SystemTime,
    pub cpu: Option<CpuStats>,
    pub memory: Option<MemoryStats>,
}

impl ContainerStats {
    pub fn new(timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            cpu: None,
            memory: None,
        }
    }

    /// Returns whether the sample lies inside the inclusive `[start, end]` window.
    /// Unset bounds are open.
    pub fn is_within(&self, start: Option<SystemTime>, end: Option<SystemTime>) -> bool {
        start.is_none_or(|start| self.timestamp >= start)
            && end.is_none_or(|end| self.timestamp <= end)
    }
}

/// Spec, recent stats and direct children of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(flatten)]
    pub reference: ContainerReference,
    pub subcontainers: Vec<ContainerReference>,
    pub spec: ContainerSpec,
    pub stats: Vec<ContainerStats>,
}

impl ContainerInfo {
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

/// Parameters of a container info query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfoRequest {
    /// Maximum number of samples to return, newest kept. `None` returns every retained
    /// sample inside the window.
    pub num_stats: Option<usize>,
    pub start: Option<SystemTime>,
    pub end: Option<SystemTime>,
    /// Overrides the manager's handler timeout for this request.
    pub timeout: Option<Duration>,
}

impl Default for ContainerInfoRequest {
    fn default() -> Self {
        Self {
            num_stats: Some(DEFAULT_NUM_STATS),
            start: None,
            end: None,
            timeout: None,
        }
    }
}

impl ContainerInfoRequest {
    pub fn with_num_stats(num_stats: usize) -> Self {
        Self {
            num_stats: Some(num_stats),
            ..Default::default()
        }
    }
}

/// Static facts about the host the manager runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub machine_id: String,
    pub hostname: String,
    pub num_cores: usize,
    pub memory_capacity_bytes: u64,
}
