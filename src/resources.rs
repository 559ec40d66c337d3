//! Host pressure sampling and the proportional backoff derived from it.

use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub memory_percent: f64,
    pub cpu_percent: f64,
}

/// Per-batch scheduling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    pub concurrency: usize,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleLimits {
    pub max_concurrency: usize,
    pub min_concurrency: usize,
    pub base_delay: Duration,
    pub memory_ceiling: f64,
    pub cpu_ceiling: f64,
}

impl ThrottleLimits {
    pub fn baseline(&self) -> Throttle {
        Throttle {
            concurrency: self.max_concurrency,
            delay: self.base_delay,
        }
    }

    /// Fraction by which the worse of the two readings exceeds its ceiling,
    /// on a 0..=1 scale. Zero when both are within bounds.
    pub fn overload(&self, usage: ResourceUsage) -> f64 {
        let memory_over = (usage.memory_percent - self.memory_ceiling).max(0.0);
        let cpu_over = (usage.cpu_percent - self.cpu_ceiling).max(0.0);
        memory_over.max(cpu_over) / 100.0
    }

    pub fn throttle_for(&self, overload: f64) -> Throttle {
        if overload <= 0.0 {
            return self.baseline();
        }
        let scaled = (self.max_concurrency as f64 * (1.0 - overload)).floor().max(0.0) as usize;
        Throttle {
            concurrency: scaled.max(self.min_concurrency),
            delay: self.base_delay.mul_f64(1.0 + overload),
        }
    }

    pub fn throttle(&self, usage: ResourceUsage) -> Throttle {
        self.throttle_for(self.overload(usage))
    }
}

#[async_trait]
pub trait ResourceProbe: Send {
    async fn usage(&mut self) -> ResourceUsage;
}

/// Reads memory instantly and CPU as an average over a fixed window.
pub struct SystemProbe {
    system: System,
    cpu_window: Duration,
}

impl SystemProbe {
    pub fn new(cpu_window: Duration) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_all();

        Self {
            system,
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

#[async_trait]
impl ResourceProbe for SystemProbe {
    async fn usage(&mut self) -> ResourceUsage {
        self.system.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total > 0 {
            self.system.used_memory() as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        ResourceUsage {
            memory_percent,
            cpu_percent: self.system.global_cpu_usage() as f64,
        }
    }
}

/// Fixed readings, for runs that should never throttle and for tests.
pub struct StaticProbe(pub ResourceUsage);

#[async_trait]
impl ResourceProbe for StaticProbe {
    async fn usage(&mut self) -> ResourceUsage {
        self.0
    }
}

pub struct ResourceMonitor {
    probe: Box<dyn ResourceProbe>,
    limits: ThrottleLimits,
}

impl ResourceMonitor {
    pub fn new(probe: Box<dyn ResourceProbe>, limits: ThrottleLimits) -> Self {
        Self { probe, limits }
    }

    pub async fn sample(&mut self) -> Throttle {
        let usage = self.probe.usage().await;
        let throttle = self.limits.throttle(usage);
        if throttle != self.limits.baseline() {
            log::warn!(
                "System overload detected (CPU: {:.1}%, RAM: {:.1}%). Reducing concurrency to {}, delay to {:.1}s",
                usage.cpu_percent,
                usage.memory_percent,
                throttle.concurrency,
                throttle.delay.as_secs_f64()
            );
        }
        throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ThrottleLimits {
        ThrottleLimits {
            max_concurrency: 8,
            min_concurrency: 2,
            base_delay: Duration::from_secs(3),
            memory_ceiling: 70.0,
            cpu_ceiling: 80.0,
        }
    }

    #[test]
    fn test_baseline_when_within_ceilings() {
        let usage = ResourceUsage {
            memory_percent: 69.9,
            cpu_percent: 80.0,
        };
        assert_eq!(limits().throttle(usage), limits().baseline());
    }

    #[test]
    fn test_uses_worse_of_memory_and_cpu() {
        let usage = ResourceUsage {
            memory_percent: 95.0,
            cpu_percent: 90.0,
        };
        let limits = limits();
        assert!((limits.overload(usage) - 0.25).abs() < 1e-9);
        let throttle = limits.throttle(usage);
        assert_eq!(throttle.concurrency, 6);
        assert_eq!(throttle.delay, Duration::from_secs_f64(3.75));
    }

    #[test]
    fn test_concurrency_never_below_floor() {
        let throttle = limits().throttle_for(1.0);
        assert_eq!(throttle.concurrency, 2);
        assert_eq!(throttle.delay, Duration::from_secs(6));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let limits = limits();
        let mut previous = limits.throttle_for(0.0);
        for step in 1..=100 {
            let current = limits.throttle_for(step as f64 / 100.0);
            assert!(current.concurrency <= previous.concurrency);
            assert!(current.delay >= previous.delay);
            assert!(current.concurrency >= limits.min_concurrency);
            previous = current;
        }
    }

    #[tokio::test]
    async fn test_monitor_applies_probe_readings() {
        let probe = StaticProbe(ResourceUsage {
            memory_percent: 100.0,
            cpu_percent: 0.0,
        });
        let mut monitor = ResourceMonitor::new(Box::new(probe), limits());
        let throttle = monitor.sample().await;
        assert_eq!(throttle.concurrency, 5);
    }
}
