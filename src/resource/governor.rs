use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sampler::{MemorySampler, SystemSampler};
use super::{MemoryPressure, Reclaimable, UsageSnapshot};
use crate::config::ResourceConfig;

/// What `optimize` did. Reclaimed bytes are an estimate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationReport {
    pub actions: Vec<String>,
    pub estimated_reclaimed_bytes: u64,
    pub rss_before: u64,
    pub rss_after: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakMetric {
    Rss,
    UsedMemory,
}

/// Result of the leak heuristic. Advisory only: steady growth across a window is
/// consistent with a leak but also with a legitimately growing working set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeakReport {
    pub detected: bool,
    pub severity: Option<LeakSeverity>,
    pub metric: Option<LeakMetric>,
    pub growth_bytes: u64,
    pub samples: usize,
}

/// Samples memory, classifies pressure and releases registered caches.
pub struct ResourceGovernor {
    config: ResourceConfig,
    sampler: Arc<dyn MemorySampler>,
    history: Mutex<VecDeque<UsageSnapshot>>,
    reclaimables: RwLock<Vec<Arc<dyn Reclaimable>>>,
    optimizations: AtomicU64,
}

impl std::fmt::Debug for ResourceGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGovernor")
            .field("config", &self.config)
            .field("history", &self.history.lock().len())
            .field("reclaimables", &self.reclaimables.read().len())
            .finish()
    }
}

impl ResourceGovernor {
    pub fn new(config: ResourceConfig) -> Self {
        Self::with_sampler(config, Arc::new(SystemSampler::new()))
    }

    pub fn with_sampler(config: ResourceConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        Self {
            config,
            sampler,
            history: Mutex::new(VecDeque::new()),
            reclaimables: RwLock::new(Vec::new()),
            optimizations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Register a cache that `optimize` may clear
    pub fn register(&self, item: Arc<dyn Reclaimable>) {
        self.reclaimables.write().push(item);
    }

    /// Take a reading and append it to the bounded history
    pub fn sample_usage(&self) -> UsageSnapshot {
        let snapshot = self.sampler.sample();
        let mut history = self.history.lock();
        history.push_back(snapshot);
        while history.len() > self.config.history_capacity.max(1) {
            history.pop_front();
        }
        snapshot
    }

    pub fn history(&self) -> Vec<UsageSnapshot> {
        self.history.lock().iter().copied().collect()
    }

    fn classify_ratio(ratio: f64, medium: f64, high: f64) -> MemoryPressure {
        if ratio >= high {
            MemoryPressure::High
        } else if ratio >= medium {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }

    /// The higher of the system used/total classification and the rss/ceiling one
    pub fn classify_pressure(&self, snapshot: &UsageSnapshot) -> MemoryPressure {
        let system = Self::classify_ratio(
            snapshot.used_ratio(),
            self.config.used_ratio_medium,
            self.config.used_ratio_high,
        );

        let ceiling = self.config.memory_limit_bytes();
        let rss_ratio = if ceiling == 0 {
            0.0
        } else {
            snapshot.rss as f64 / ceiling as f64
        };
        let process = Self::classify_ratio(
            rss_ratio,
            self.config.rss_ratio_medium,
            self.config.rss_ratio_high,
        );

        system.max(process)
    }

    pub fn check_pressure(&self) -> (UsageSnapshot, MemoryPressure) {
        let snapshot = self.sample_usage();
        let pressure = self.classify_pressure(&snapshot);
        (snapshot, pressure)
    }

    /// Release what can be released.
    ///
    /// A native process has no collector to ask, so this empties the registered
    /// bounded caches and reports the estimated bytes they held.
    pub fn optimize(&self) -> OptimizationReport {
        let rss_before = self.sample_usage().rss;
        let mut report = OptimizationReport {
            rss_before,
            actions: vec!["garbage collection not available in a native process".to_string()],
            ..OptimizationReport::default()
        };

        for item in self.reclaimables.read().iter() {
            let freed = item.reclaim();
            report.estimated_reclaimed_bytes += freed;
            report
                .actions
                .push(format!("cleared {} (~{} bytes)", item.name(), freed));
        }

        report.rss_after = self.sample_usage().rss;
        self.optimizations.fetch_add(1, Ordering::Relaxed);
        info!(
            reclaimed = report.estimated_reclaimed_bytes,
            rss_before = report.rss_before,
            rss_after = report.rss_after,
            "Memory optimization finished"
        );
        report
    }

    pub fn optimization_count(&self) -> u64 {
        self.optimizations.load(Ordering::Relaxed)
    }

    /// Look for monotonic growth over the last `leak_window` samples.
    pub fn detect_leak(&self, history: &[UsageSnapshot]) -> LeakReport {
        let window = self.config.leak_window.max(2);
        if history.len() < window {
            return LeakReport {
                samples: history.len(),
                ..LeakReport::default()
            };
        }

        let recent = &history[history.len() - window..];
        let threshold = self.config.leak_threshold_bytes().max(1);

        let growth = |metric: fn(&UsageSnapshot) -> u64| -> Option<u64> {
            let monotonic = recent.windows(2).all(|w| metric(&w[1]) >= metric(&w[0]));
            let grown = metric(&recent[window - 1]).saturating_sub(metric(&recent[0]));
            (monotonic && grown >= threshold).then_some(grown)
        };

        let candidates = [
            (LeakMetric::Rss, growth(|s| s.rss)),
            (LeakMetric::UsedMemory, growth(|s| s.used_memory)),
        ];
        let worst = candidates
            .into_iter()
            .filter_map(|(metric, grown)| grown.map(|g| (metric, g)))
            .max_by_key(|&(_, g)| g);

        match worst {
            Some((metric, grown)) => {
                let multiple = grown / threshold;
                let severity = match multiple {
                    0..=1 => LeakSeverity::Low,
                    2..=3 => LeakSeverity::Medium,
                    _ => LeakSeverity::High,
                };
                LeakReport {
                    detected: true,
                    severity: Some(severity),
                    metric: Some(metric),
                    growth_bytes: grown,
                    samples: window,
                }
            }
            None => LeakReport {
                samples: window,
                ..LeakReport::default()
            },
        }
    }

    /// Sample on a timer in the background until the handle is dropped.
    pub fn start_monitoring(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let governor = Arc::clone(self);
        let ticks = Arc::new(AtomicU64::new(0));
        let tick_counter = Arc::clone(&ticks);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let sampled = Arc::clone(&governor);
                let Ok((snapshot, pressure)) =
                    tokio::task::spawn_blocking(move || sampled.check_pressure()).await
                else {
                    break;
                };
                tick_counter.fetch_add(1, Ordering::Relaxed);
                debug!(rss = snapshot.rss, %pressure, "Memory sample");

                if pressure == MemoryPressure::High {
                    warn!(rss_mb = snapshot.rss_mb(), "High memory pressure, optimizing");
                    governor.optimize();
                }

                let leak = governor.detect_leak(&governor.history());
                if leak.detected {
                    warn!(
                        growth_bytes = leak.growth_bytes,
                        severity = ?leak.severity,
                        metric = ?leak.metric,
                        "Possible memory leak (advisory)"
                    );
                }
            }
        });

        MonitorHandle { handle, ticks }
    }
}

/// Running background monitor; stops when dropped
pub struct MonitorHandle {
    handle: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
}

impl MonitorHandle {
    /// Number of samples taken so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ScriptedSampler;

    const MB: u64 = 1024 * 1024;

    fn governor_with(sampler: ScriptedSampler, config: ResourceConfig) -> ResourceGovernor {
        ResourceGovernor::with_sampler(config, Arc::new(sampler))
    }

    fn config() -> ResourceConfig {
        ResourceConfig {
            memory_limit_mb: 100,
            leak_window: 4,
            leak_threshold_mb: 10,
            ..ResourceConfig::default()
        }
    }

    struct Counting(std::sync::atomic::AtomicU64);

    impl Reclaimable for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn estimated_bytes(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
        fn reclaim(&self) -> u64 {
            self.0.swap(0, Ordering::Relaxed)
        }
    }

    #[test]
    fn test_pressure_is_max_of_both_classifications() {
        let governor = governor_with(ScriptedSampler::constant(0, 1, 0), config());

        let low = UsageSnapshot::new(50, 100, 10 * MB);
        assert_eq!(governor.classify_pressure(&low), MemoryPressure::Low);

        let system_medium = UsageSnapshot::new(80, 100, 10 * MB);
        assert_eq!(governor.classify_pressure(&system_medium), MemoryPressure::Medium);

        let rss_high = UsageSnapshot::new(10, 100, 90 * MB);
        assert_eq!(governor.classify_pressure(&rss_high), MemoryPressure::High);

        let both = UsageSnapshot::new(95, 100, 72 * MB);
        assert_eq!(governor.classify_pressure(&both), MemoryPressure::High);
    }

    #[test]
    fn test_optimize_reclaims_registered_items() {
        let governor = governor_with(ScriptedSampler::constant(1, 10, 5 * MB), config());
        governor.register(Arc::new(Counting(AtomicU64::new(4096))));

        let report = governor.optimize();
        assert_eq!(report.estimated_reclaimed_bytes, 4096);
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.rss_before, 5 * MB);
        assert_eq!(governor.optimization_count(), 1);

        assert_eq!(governor.optimize().estimated_reclaimed_bytes, 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let governor = governor_with(
            ScriptedSampler::constant(1, 10, 1),
            ResourceConfig {
                history_capacity: 3,
                ..config()
            },
        );
        for _ in 0..10 {
            governor.sample_usage();
        }
        assert_eq!(governor.history().len(), 3);
    }

    fn series(rss_mb: &[u64]) -> Vec<UsageSnapshot> {
        rss_mb
            .iter()
            .map(|&r| UsageSnapshot::new(1, 100, r * MB))
            .collect()
    }

    #[test]
    fn test_leak_requires_monotonic_growth_beyond_threshold() {
        let governor = governor_with(ScriptedSampler::constant(0, 1, 0), config());

        let leak = governor.detect_leak(&series(&[100, 104, 108, 115]));
        assert!(leak.detected);
        assert_eq!(leak.metric, Some(LeakMetric::Rss));
        assert_eq!(leak.severity, Some(LeakSeverity::Low));
        assert_eq!(leak.growth_bytes, 15 * MB);

        assert!(!governor.detect_leak(&series(&[100, 120, 110, 130])).detected);
        assert!(!governor.detect_leak(&series(&[100, 101, 102, 103])).detected);
        assert!(!governor.detect_leak(&series(&[100, 200])).detected);
    }

    #[test]
    fn test_leak_severity_scales_with_growth() {
        let governor = governor_with(ScriptedSampler::constant(0, 1, 0), config());
        let medium = governor.detect_leak(&series(&[0, 0, 10, 25]));
        assert_eq!(medium.severity, Some(LeakSeverity::Medium));
        let high = governor.detect_leak(&series(&[5, 100, 200, 400]));
        assert_eq!(high.severity, Some(LeakSeverity::High));
    }

    #[test]
    fn test_leak_window_uses_most_recent_samples() {
        let governor = governor_with(ScriptedSampler::constant(0, 1, 0), config());
        let leak = governor.detect_leak(&series(&[500, 10, 20, 30, 40]));
        assert!(leak.detected);
        assert_eq!(leak.growth_bytes, 30 * MB);
    }

    #[tokio::test]
    async fn test_monitor_optimizes_under_high_pressure() {
        let governor = Arc::new(governor_with(
            ScriptedSampler::constant(10, 100, 95 * MB),
            config(),
        ));
        let handle = governor.start_monitoring(Duration::from_millis(5));

        tokio::time::timeout(Duration::from_secs(5), async {
            while governor.optimization_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(handle.ticks() >= 1);

        // dropping the handle aborts the task
        let ticks = Arc::clone(&handle.ticks);
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = ticks.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::Relaxed), stopped_at);
    }
}
