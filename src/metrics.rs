//! Metrics collection and the end-of-run report

use serde::{Deserialize, Serialize};

use crate::types::{PolicyKind, SimTime};

/// Recovery samples at or below this length are float noise, not recoveries
pub const RECOVERY_EPSILON: SimTime = 1e-6;

/// Append-only run statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    wait_times: Vec<SimTime>,
    recovery_times: Vec<SimTime>,
    total_downtime: SimTime,
    admitted: u64,
    completed: u64,
    lost: u64,
    preemptions: u64,
    catastrophes: u64,
    restorations: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admission(&mut self) {
        self.admitted += 1;
    }

    /// Record the wait of a process at its first CPU grant
    pub fn record_wait(&mut self, wait: SimTime) {
        debug_assert!(wait >= 0.0, "negative wait time {}", wait);
        self.wait_times.push(wait);
    }

    pub fn record_completion(&mut self) {
        self.completed += 1;
    }

    /// Record processes discarded by a catastrophe
    pub fn record_lost(&mut self, count: u64) {
        self.lost += count;
    }

    pub fn record_preemption(&mut self) {
        self.preemptions += 1;
    }

    pub fn record_catastrophe(&mut self) {
        self.catastrophes += 1;
    }

    /// Record a finished repair of length `downtime`
    pub fn record_restoration(&mut self, downtime: SimTime) {
        debug_assert!(downtime >= 0.0);
        self.total_downtime += downtime;
        self.restorations += 1;
    }

    /// Record a recovery window; returns `false` if it was too short to count
    pub fn record_recovery(&mut self, duration: SimTime) -> bool {
        debug_assert!(duration >= 0.0, "recovery window closed before restoration");
        if duration <= RECOVERY_EPSILON {
            return false;
        }
        self.recovery_times.push(duration);
        true
    }

    pub fn wait_times(&self) -> &[SimTime] {
        &self.wait_times
    }

    pub fn recovery_times(&self) -> &[SimTime] {
        &self.recovery_times
    }

    pub fn total_downtime(&self) -> SimTime {
        self.total_downtime
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    pub fn catastrophes(&self) -> u64 {
        self.catastrophes
    }

    pub fn restorations(&self) -> u64 {
        self.restorations
    }

    /// Summarize the run over a horizon of `total_time`
    pub fn report(&self, policy: PolicyKind, total_time: SimTime) -> Report {
        Report {
            policy,
            total_time,
            average_wait: mean(&self.wait_times),
            availability: availability(total_time, self.total_downtime),
            mttr: mean(&self.recovery_times),
            total_downtime: self.total_downtime,
            processes_admitted: self.admitted,
            processes_started: self.wait_times.len() as u64,
            processes_completed: self.completed,
            processes_lost: self.lost,
            preemptions: self.preemptions,
            catastrophes: self.catastrophes,
            restorations: self.restorations,
            recovery_samples: self.recovery_times.len() as u64,
        }
    }
}

fn mean(samples: &[SimTime]) -> Option<SimTime> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<SimTime>() / samples.len() as SimTime)
    }
}

/// Percentage of `total_time` the system was up
pub fn availability(total_time: SimTime, downtime: SimTime) -> f64 {
    if total_time <= 0.0 {
        return 100.0;
    }
    ((total_time - downtime) / total_time * 100.0).clamp(0.0, 100.0)
}

/// Final statistics of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub policy: PolicyKind,
    pub total_time: SimTime,
    /// Mean wait over processes that reached the CPU
    pub average_wait: Option<SimTime>,
    /// Uptime percentage in `[0, 100]`
    pub availability: f64,
    /// Mean time to recovery
    pub mttr: Option<SimTime>,
    pub total_downtime: SimTime,
    pub processes_admitted: u64,
    pub processes_started: u64,
    pub processes_completed: u64,
    pub processes_lost: u64,
    pub preemptions: u64,
    pub catastrophes: u64,
    pub restorations: u64,
    pub recovery_samples: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = Metrics::new().report(PolicyKind::Fcfs, 100.0);
        assert_eq!(report.average_wait, None);
        assert_eq!(report.mttr, None);
        assert_eq!(report.availability, 100.0);
        assert_eq!(report.processes_started, 0);
    }

    #[test]
    fn test_report_math() {
        let mut metrics = Metrics::new();
        metrics.record_wait(1.0);
        metrics.record_wait(3.0);
        metrics.record_restoration(25.0);
        assert!(metrics.record_recovery(0.5));
        assert!(metrics.record_recovery(1.5));

        let report = metrics.report(PolicyKind::Sjf, 100.0);
        assert_eq!(report.average_wait, Some(2.0));
        assert_eq!(report.availability, 75.0);
        assert_eq!(report.mttr, Some(1.0));
        assert_eq!(report.restorations, 1);
        assert_eq!(report.recovery_samples, 2);
    }

    #[test]
    fn test_tiny_recovery_discarded() {
        let mut metrics = Metrics::new();
        assert!(!metrics.record_recovery(0.0));
        assert!(!metrics.record_recovery(RECOVERY_EPSILON));
        assert!(metrics.recovery_times().is_empty());
    }

    #[test]
    fn test_availability_bounds() {
        assert_eq!(availability(10.0, 0.0), 100.0);
        assert_eq!(availability(10.0, 10.0), 0.0);
        assert_eq!(availability(10.0, 2.5), 75.0);
    }
}
