//! Core types and data structures for faultsched

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Simulated time, in abstract time units
pub type SimTime = f64;

/// Process identifier - monotonically increasing per workload generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u64);

impl Pid {
    /// Create a PID from a raw value
    pub fn from_raw(raw: u64) -> Self {
        Pid(raw)
    }

    /// Get the raw PID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process priority in `[1, 10]`; 1 is the highest priority.
///
/// Ordering follows the numeric level, so the `min` of a set of priorities
/// is the most urgent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Highest priority level
    pub const HIGHEST: Priority = Priority(1);
    /// Lowest priority level
    pub const LOWEST: Priority = Priority(10);

    /// Create a priority, rejecting levels outside `[1, 10]`
    pub fn new(level: u8) -> Option<Self> {
        if (Self::HIGHEST.0..=Self::LOWEST.0).contains(&level) {
            Some(Priority(level))
        } else {
            None
        }
    }

    /// Numeric level (1 = highest)
    pub fn level(self) -> u8 {
        self.0
    }

    /// Whether `self` is strictly more urgent than `other`
    pub fn outranks(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::new(level).ok_or_else(|| format!("priority {} outside [1, 10]", level))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> u8 {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work competing for the CPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pid: Pid,
    arrival_time: SimTime,
    initial_demand: SimTime,
    remaining_demand: SimTime,
    priority: Priority,
    /// Time of the first CPU grant, if any
    first_service: Option<SimTime>,
}

impl Process {
    /// Create a process admitted at `arrival_time` needing `demand` units of CPU
    pub fn new(pid: Pid, arrival_time: SimTime, demand: SimTime, priority: Priority) -> Self {
        debug_assert!(demand >= 0.0, "service demand must be non-negative");
        Process {
            pid,
            arrival_time,
            initial_demand: demand,
            remaining_demand: demand,
            priority,
            first_service: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn arrival_time(&self) -> SimTime {
        self.arrival_time
    }

    pub fn initial_demand(&self) -> SimTime {
        self.initial_demand
    }

    pub fn remaining_demand(&self) -> SimTime {
        self.remaining_demand
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the process has never been granted the CPU
    pub fn is_fresh(&self) -> bool {
        self.first_service.is_none()
    }

    /// Record a CPU grant at `now`.
    ///
    /// Returns the wait time on the first grant and `None` afterwards, so a
    /// process contributes exactly one wait sample however often it resumes.
    pub fn mark_granted(&mut self, now: SimTime) -> Option<SimTime> {
        if self.first_service.is_some() {
            return None;
        }
        self.first_service = Some(now);
        let wait = now - self.arrival_time;
        debug_assert!(wait >= 0.0, "process {} granted before arrival", self.pid);
        Some(wait)
    }

    /// Deduct `served` units of executed time from the remaining demand.
    ///
    /// Float drift below zero is clamped; anything larger is a bookkeeping bug.
    pub fn consume(&mut self, served: SimTime) {
        debug_assert!(served >= 0.0, "negative service slice {}", served);
        debug_assert!(
            served <= self.remaining_demand + 1e-9,
            "process {} served {} with only {} remaining",
            self.pid,
            served,
            self.remaining_demand
        );
        self.remaining_demand = (self.remaining_demand - served).max(0.0);
    }

    /// Mark the remaining demand as fully served
    pub fn finish(&mut self) {
        self.remaining_demand = 0.0;
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_demand <= 0.0
    }
}

/// Scheduling policy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    /// First-come, first-served
    #[serde(rename = "FCFS", alias = "fcfs")]
    Fcfs,
    /// Shortest job first (non-preemptive)
    #[serde(rename = "SJF", alias = "sjf")]
    Sjf,
    /// Round-robin with a fixed time quantum
    #[serde(rename = "RoundRobin", alias = "round-robin", alias = "rr")]
    RoundRobin,
    /// Preemptive fixed priority
    #[serde(rename = "PreemptivePriority", alias = "preemptive-priority", alias = "priority")]
    PreemptivePriority,
}

impl PolicyKind {
    /// Every policy, in presentation order
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Fcfs,
        PolicyKind::Sjf,
        PolicyKind::RoundRobin,
        PolicyKind::PreemptivePriority,
    ];

    /// Whether running work can be displaced before it finishes
    pub fn is_preemptive(self) -> bool {
        matches!(self, PolicyKind::RoundRobin | PolicyKind::PreemptivePriority)
    }
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::RoundRobin
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Fcfs => write!(f, "FCFS"),
            PolicyKind::Sjf => write!(f, "SJF"),
            PolicyKind::RoundRobin => write!(f, "RoundRobin"),
            PolicyKind::PreemptivePriority => write!(f, "PreemptivePriority"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fcfs" => Ok(PolicyKind::Fcfs),
            "sjf" => Ok(PolicyKind::Sjf),
            "rr" | "roundrobin" | "round-robin" => Ok(PolicyKind::RoundRobin),
            "priority" | "preemptivepriority" | "preemptive-priority" => {
                Ok(PolicyKind::PreemptivePriority)
            }
            other => Err(format!("unknown scheduling policy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_bounds() {
        assert!(Priority::new(0).is_none());
        assert!(Priority::new(11).is_none());
        assert_eq!(Priority::new(1), Some(Priority::HIGHEST));
        assert_eq!(Priority::new(10), Some(Priority::LOWEST));
        assert!(Priority::HIGHEST.outranks(Priority::LOWEST));
        assert!(!Priority::LOWEST.outranks(Priority::LOWEST));
    }

    #[test]
    fn test_process_wait_recorded_once() {
        let mut process = Process::new(Pid(1), 2.0, 1.5, Priority::HIGHEST);
        assert!(process.is_fresh());
        assert_eq!(process.mark_granted(3.5), Some(1.5));
        assert!(!process.is_fresh());
        assert_eq!(process.mark_granted(7.0), None);
    }

    #[test]
    fn test_process_consume() {
        let mut process = Process::new(Pid(1), 0.0, 1.0, Priority::LOWEST);
        process.consume(0.3);
        assert!((process.remaining_demand() - 0.7).abs() < 1e-12);
        assert_eq!(process.initial_demand(), 1.0);
        process.consume(0.7);
        assert!(process.is_finished());
        assert_eq!(process.remaining_demand(), 0.0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fcfs".parse::<PolicyKind>(), Ok(PolicyKind::Fcfs));
        assert_eq!("SJF".parse::<PolicyKind>(), Ok(PolicyKind::Sjf));
        assert_eq!("rr".parse::<PolicyKind>(), Ok(PolicyKind::RoundRobin));
        assert_eq!(
            "preemptive-priority".parse::<PolicyKind>(),
            Ok(PolicyKind::PreemptivePriority)
        );
        assert!("lottery".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::RoundRobin.to_string(), "RoundRobin");
    }

    #[test]
    fn test_preemptive_policies() {
        let preemptive: Vec<_> = PolicyKind::ALL
            .into_iter()
            .filter(|policy| policy.is_preemptive())
            .collect();
        assert_eq!(preemptive, vec![PolicyKind::RoundRobin, PolicyKind::PreemptivePriority]);
    }
}
