//! Scheduling policies
//!
//! Every policy owns a ready structure, a CPU resource and a run loop, and
//! answers to the same [`Scheduler`] interface: the workload generator hands
//! it processes, the fault injector tells it about catastrophes and
//! restorations. The set of policies is closed; [`build`] picks one.

pub mod non_preemptive;
pub mod priority;
pub mod round_robin;
pub mod store;

use std::cell::Cell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::context::SimContext;
use crate::events::EventKind;
use crate::runtime::Cpu;
use crate::types::{PolicyKind, Process, SimTime};

pub use non_preemptive::NonPreemptive;
pub use priority::PreemptivePriority;
pub use round_robin::RoundRobin;
pub use store::ReadyStore;

/// Common interface of the scheduling policies
pub trait Scheduler {
    /// Which policy this is
    fn policy(&self) -> PolicyKind;

    /// Admit a process
    fn add_process(&self, process: Process);

    /// The policy's run loop; spawn it once per simulation
    fn run(self: Rc<Self>) -> LocalBoxFuture<'static, ()>;

    /// Interrupt in-flight service, drop queued work, cancel any open
    /// recovery window
    fn handle_catastrophe(&self);

    /// Open a recovery window; called right after a restoration
    fn begin_recovery(&self);

    /// Processes waiting in the ready structure
    fn queued(&self) -> usize;

    /// The CPU this policy schedules onto
    fn cpu(&self) -> &Cpu;

    /// Whether a recovery window is open
    fn is_recovering(&self) -> bool;
}

/// Timing knobs shared by the run loops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollIntervals {
    /// How often a run loop re-checks a downed system
    pub down: SimTime,
    /// How often round-robin re-checks an empty ready queue
    pub idle: SimTime,
}

impl Default for PollIntervals {
    fn default() -> Self {
        PollIntervals { down: 0.1, idle: 0.01 }
    }
}

/// Build the scheduler for `policy`
pub fn build(
    policy: PolicyKind,
    ctx: Rc<SimContext>,
    quantum: SimTime,
    polls: PollIntervals,
) -> Rc<dyn Scheduler> {
    match policy {
        PolicyKind::Fcfs => Rc::new(NonPreemptive::fcfs(ctx, polls)),
        PolicyKind::Sjf => Rc::new(NonPreemptive::sjf(ctx, polls)),
        PolicyKind::RoundRobin => Rc::new(RoundRobin::new(ctx, quantum, polls)),
        PolicyKind::PreemptivePriority => Rc::new(PreemptivePriority::new(ctx, polls)),
    }
}

/// Recovery window bookkeeping.
///
/// Opened at restoration, closed the first time the run loop sees the CPU
/// idle with nothing queued. Closing records `now - last_restoration` as one
/// recovery sample, so each restoration yields at most one sample.
#[derive(Debug, Default)]
pub struct RecoveryWindow {
    open: Cell<bool>,
}

impl RecoveryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.set(true);
    }

    pub fn cancel(&self) {
        self.open.set(false);
    }

    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Close the window if the system has drained; returns whether it closed
    pub fn try_close(&self, ctx: &SimContext, cpu_idle: bool, queue_empty: bool) -> bool {
        if !self.open.get() || !cpu_idle || !queue_empty {
            return false;
        }
        let duration = ctx.now() - ctx.last_restoration();
        debug_assert!(duration >= 0.0, "restoration recorded after the current time");
        if ctx.with_metrics(|m| m.record_recovery(duration)) {
            ctx.emit(EventKind::Recovery { duration });
        }
        self.open.set(false);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::runtime::{CpuMode, Sim};

    #[test]
    fn test_recovery_window_closes_once() {
        let sim = Sim::new();
        let ctx = SimContext::new(sim.clone(), Box::new(NullSink));
        let window = RecoveryWindow::new();

        sim.run_until(5.0).unwrap();
        ctx.fail();
        ctx.restore(5.0);
        window.open();

        sim.run_until(7.5).unwrap();
        assert!(!window.try_close(&ctx, false, true));
        assert!(!window.try_close(&ctx, true, false));
        assert!(window.try_close(&ctx, true, true));
        assert!(!window.try_close(&ctx, true, true));
        assert_eq!(ctx.metrics().recovery_times(), &[2.5]);
    }

    #[test]
    fn test_only_priority_scheduling_uses_preemptive_cpu() {
        for policy in PolicyKind::ALL {
            let sim = Sim::new();
            let ctx = Rc::new(SimContext::new(sim.clone(), Box::new(NullSink)));
            let scheduler = build(policy, ctx, 0.3, PollIntervals::default());
            let expected = match policy {
                PolicyKind::PreemptivePriority => CpuMode::Preemptive,
                _ => CpuMode::Exclusive,
            };
            assert_eq!(scheduler.policy(), policy);
            assert_eq!(scheduler.cpu().mode(), expected, "{}", policy);
        }
    }

    #[test]
    fn test_recovery_window_discards_noise() {
        let sim = Sim::new();
        let ctx = SimContext::new(sim.clone(), Box::new(NullSink));
        let window = RecoveryWindow::new();

        ctx.restore(1.0);
        window.open();
        assert!(window.try_close(&ctx, true, true));
        assert!(!window.is_open());
        assert!(ctx.metrics().recovery_times().is_empty());
    }
}
