use parking_lot::Mutex;
use std::collections::VecDeque;
use sysinfo::{Pid, System};

use super::UsageSnapshot;

/// Source of memory readings
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> UsageSnapshot;
}

/// Reads system memory and this process's resident size through sysinfo
pub struct SystemSampler {
    system: Mutex<System>,
    process_id: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            process_id: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SystemSampler {
    fn sample(&self) -> UsageSnapshot {
        let mut system = self.system.lock();
        system.refresh_memory();

        let rss = self
            .process_id
            .and_then(|pid| {
                system.refresh_process(pid);
                system.process(pid).map(|p| p.memory())
            })
            .unwrap_or(0);

        UsageSnapshot::new(system.used_memory(), system.total_memory(), rss)
    }
}

/// Replays a fixed sequence of readings, repeating the last one when exhausted
pub struct ScriptedSampler {
    readings: Mutex<VecDeque<UsageSnapshot>>,
    last: Mutex<UsageSnapshot>,
}

impl ScriptedSampler {
    pub fn new(readings: impl IntoIterator<Item = UsageSnapshot>) -> Self {
        let readings: VecDeque<_> = readings.into_iter().collect();
        let last = readings
            .front()
            .copied()
            .unwrap_or_else(|| UsageSnapshot::new(0, 0, 0));
        Self {
            readings: Mutex::new(readings),
            last: Mutex::new(last),
        }
    }

    /// A sampler that always reports the same usage
    pub fn constant(used_memory: u64, total_memory: u64, rss: u64) -> Self {
        Self::new([UsageSnapshot::new(used_memory, total_memory, rss)])
    }
}

impl MemorySampler for ScriptedSampler {
    fn sample(&self) -> UsageSnapshot {
        let mut last = self.last.lock();
        if let Some(next) = self.readings.lock().pop_front() {
            *last = next;
        }
        UsageSnapshot {
            taken_at: std::time::SystemTime::now(),
            ..*last
        }
    }
}
