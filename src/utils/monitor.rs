//! Resource usage of a sweep, sampled at phase boundaries, plus a digest of
//! the finished trials.

use crate::domain::model::{TrialRecord, TrialStatus};
use std::fmt;
use std::time::Duration;

/// Points of a sweep at which resources are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Start,
    Extract,
    Transform,
    Trials,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SweepPhase::Start => "start",
            SweepPhase::Extract => "dataset loaded",
            SweepPhase::Transform => "regulators diffused",
            SweepPhase::Trials => "trials finished",
        };
        f.write_str(label)
    }
}

/// Counts and timings over the trials of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialDigest {
    pub completed: usize,
    pub failed: usize,
    pub mean_secs: f64,
    /// `(lam, seconds)` of the longest trial.
    pub slowest: Option<(f64, f64)>,
}

impl TrialDigest {
    pub fn from_records(records: &[TrialRecord]) -> Self {
        let completed = records
            .iter()
            .filter(|r| r.status == TrialStatus::Completed)
            .count();
        let mean_secs = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.elapsed_secs).sum::<f64>() / records.len() as f64
        };
        let slowest = records
            .iter()
            .max_by(|a, b| a.elapsed_secs.total_cmp(&b.elapsed_secs))
            .map(|r| (r.lam, r.elapsed_secs));
        Self {
            completed,
            failed: records.len() - completed,
            mean_secs,
            slowest,
        }
    }
}

/// Time spent between consecutive phase marks, labelled by the later mark.
pub fn phase_durations(marks: &[(SweepPhase, Duration)]) -> Vec<(SweepPhase, Duration)> {
    marks
        .windows(2)
        .map(|w| (w[1].0, w[1].1.saturating_sub(w[0].1)))
        .collect()
}

#[cfg(feature = "cli")]
pub use sampling::{total_memory_bytes, ResourceSample, SweepMonitor};

#[cfg(feature = "cli")]
mod sampling {
    use super::{phase_durations, SweepPhase, TrialDigest};
    use crate::domain::model::TrialRecord;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use sysinfo::{Pid, ProcessesToUpdate, System};

    #[derive(Debug, Clone)]
    pub struct ResourceSample {
        pub cpu_percent: f32,
        pub rss_mib: u64,
        pub rss_percent: f32,
        pub elapsed: Duration,
    }

    struct State {
        system: System,
        peak_rss_mib: u64,
        marks: Vec<(SweepPhase, Duration)>,
    }

    /// Samples this process at each [`SweepPhase`] when enabled. A disabled
    /// monitor never touches sysinfo.
    pub struct SweepMonitor {
        state: Mutex<State>,
        pid: Option<Pid>,
        started: Instant,
        enabled: bool,
    }

    impl SweepMonitor {
        pub fn new(enabled: bool) -> Self {
            let mut system = System::new();
            if enabled {
                system.refresh_memory();
            }
            Self {
                state: Mutex::new(State {
                    system,
                    peak_rss_mib: 0,
                    marks: Vec::new(),
                }),
                pid: sysinfo::get_current_pid().ok(),
                started: Instant::now(),
                enabled,
            }
        }

        pub fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn sample_locked(&self, state: &mut State) -> Option<ResourceSample> {
            let pid = self.pid?;
            state
                .system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let process = state.system.process(pid)?;
            let rss_mib = process.memory() / 1024 / 1024;
            let total_mib = state.system.total_memory() / 1024 / 1024;
            state.peak_rss_mib = state.peak_rss_mib.max(rss_mib);
            Some(ResourceSample {
                cpu_percent: process.cpu_usage(),
                rss_mib,
                rss_percent: if total_mib > 0 {
                    rss_mib as f32 / total_mib as f32 * 100.0
                } else {
                    0.0
                },
                elapsed: self.started.elapsed(),
            })
        }

        /// Marks the end of `phase` and logs a resource sample for it.
        pub fn mark(&self, phase: SweepPhase) {
            if !self.enabled {
                return;
            }
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.marks.push((phase, self.started.elapsed()));
            if let Some(sample) = self.sample_locked(&mut state) {
                tracing::info!(
                    "📊 {} - CPU: {:.1}%, RSS: {}MiB ({:.1}%), Peak: {}MiB, Time: {:.2?}",
                    phase,
                    sample.cpu_percent,
                    sample.rss_mib,
                    sample.rss_percent,
                    state.peak_rss_mib,
                    sample.elapsed
                );
            }
        }

        /// Phase boundaries recorded so far.
        pub fn marks(&self) -> Vec<(SweepPhase, Duration)> {
            self.state
                .lock()
                .map(|state| state.marks.clone())
                .unwrap_or_default()
        }

        /// Logs the per-trial digest, the time per phase and the peak RSS.
        pub fn finish(&self, records: &[TrialRecord]) {
            if !self.enabled {
                return;
            }
            let digest = TrialDigest::from_records(records);
            tracing::info!(
                "📊 Trials - completed: {}, failed: {}, mean: {:.2}s",
                digest.completed,
                digest.failed,
                digest.mean_secs
            );
            if let Some((lam, secs)) = digest.slowest {
                tracing::info!("📊 Slowest trial: lam {} took {:.2}s", lam, secs);
            }
            for (phase, spent) in phase_durations(&self.marks()) {
                tracing::debug!("📊 {} after {:.2?}", phase, spent);
            }
            let peak = self.state.lock().map(|s| s.peak_rss_mib).unwrap_or(0);
            tracing::info!(
                "📊 Final Stats - Total Time: {:.2?}, Peak RSS: {}MiB",
                self.started.elapsed(),
                peak
            );
        }
    }

    impl Default for SweepMonitor {
        fn default() -> Self {
            Self::new(false)
        }
    }

    /// Total physical memory in bytes, if the platform reports it.
    pub fn total_memory_bytes() -> Option<u64> {
        let mut system = System::new();
        system.refresh_memory();
        match system.total_memory() {
            0 => None,
            bytes => Some(bytes),
        }
    }
}

// 非 CLI 建置的空實現
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SweepMonitor;

#[cfg(not(feature = "cli"))]
impl SweepMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn mark(&self, _phase: SweepPhase) {}

    pub fn marks(&self) -> Vec<(SweepPhase, Duration)> {
        Vec::new()
    }

    pub fn finish(&self, _records: &[TrialRecord]) {}
}

#[cfg(not(feature = "cli"))]
pub fn total_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(lam: f64, status: TrialStatus, secs: f64) -> TrialRecord {
        TrialRecord {
            lam,
            status,
            iterations: 10,
            final_loss: None,
            early_stopped: false,
            elapsed_secs: secs,
            finished_at: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn test_trial_digest() {
        let digest = TrialDigest::from_records(&[
            record(0.1, TrialStatus::Completed, 1.0),
            record(1.0, TrialStatus::Errored, 4.0),
            record(10.0, TrialStatus::Completed, 1.0),
        ]);
        assert_eq!(digest.completed, 2);
        assert_eq!(digest.failed, 1);
        assert!((digest.mean_secs - 2.0).abs() < 1e-12);
        assert_eq!(digest.slowest, Some((1.0, 4.0)));

        let empty = TrialDigest::from_records(&[]);
        assert_eq!(empty.mean_secs, 0.0);
        assert_eq!(empty.slowest, None);
    }

    #[test]
    fn test_phase_durations() {
        let marks = [
            (SweepPhase::Start, Duration::from_millis(5)),
            (SweepPhase::Extract, Duration::from_millis(30)),
            (SweepPhase::Transform, Duration::from_millis(40)),
            (SweepPhase::Trials, Duration::from_millis(140)),
        ];
        assert_eq!(
            phase_durations(&marks),
            vec![
                (SweepPhase::Extract, Duration::from_millis(25)),
                (SweepPhase::Transform, Duration::from_millis(10)),
                (SweepPhase::Trials, Duration::from_millis(100)),
            ]
        );
        assert!(phase_durations(&marks[..1]).is_empty());
        assert_eq!(SweepPhase::Transform.to_string(), "regulators diffused");
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = SweepMonitor::new(false);
        monitor.mark(SweepPhase::Start);
        monitor.finish(&[record(0.1, TrialStatus::Completed, 1.0)]);
        assert!(!monitor.is_enabled());
        assert!(monitor.marks().is_empty());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_enabled_monitor_keeps_phase_order() {
        let monitor = SweepMonitor::new(true);
        for phase in [SweepPhase::Start, SweepPhase::Extract, SweepPhase::Transform] {
            monitor.mark(phase);
        }
        let marks = monitor.marks();
        let phases: Vec<SweepPhase> = marks.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            phases,
            vec![SweepPhase::Start, SweepPhase::Extract, SweepPhase::Transform]
        );
        assert!(marks.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
