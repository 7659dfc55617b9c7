//! Memory sampling, pressure classification and optimization.

pub mod governor;
pub mod sampler;

pub use governor::{
    LeakMetric, LeakReport, LeakSeverity, MonitorHandle, OptimizationReport, ResourceGovernor,
};
pub use sampler::{MemorySampler, ScriptedSampler, SystemSampler};

use serde::Serialize;
use std::time::SystemTime;

/// A bounded in-process structure the governor may empty under pressure
pub trait Reclaimable: Send + Sync {
    fn name(&self) -> &str;

    /// Rough size of the memory held, in bytes
    fn estimated_bytes(&self) -> u64;

    /// Drop everything held and return the estimated bytes released
    fn reclaim(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryPressure::Low => write!(f, "low"),
            MemoryPressure::Medium => write!(f, "medium"),
            MemoryPressure::High => write!(f, "high"),
        }
    }
}

/// One memory reading. All sizes are bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Memory in use system-wide
    pub used_memory: u64,
    pub total_memory: u64,
    /// Resident set size of this process
    pub rss: u64,
    pub taken_at: SystemTime,
}

impl UsageSnapshot {
    pub fn new(used_memory: u64, total_memory: u64, rss: u64) -> Self {
        Self {
            used_memory,
            total_memory,
            rss,
            taken_at: SystemTime::now(),
        }
    }

    pub fn used_ratio(&self) -> f64 {
        if self.total_memory == 0 {
            0.0
        } else {
            self.used_memory as f64 / self.total_memory as f64
        }
    }

    pub fn rss_mb(&self) -> u64 {
        self.rss / (1024 * 1024)
    }
}
