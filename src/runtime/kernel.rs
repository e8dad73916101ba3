//! Virtual clock and event engine
//!
//! The kernel owns simulated time and a min-ordered queue of pending
//! resumptions keyed by `(time, insertion sequence)`. Activities are plain
//! futures; the kernel polls exactly one of them at a time, so shared state
//! touched between suspension points needs no locking.
//!
//! Invariants:
//! - Time never moves backwards; it jumps to the next due resumption.
//! - Resumptions due at the same instant run in the order they were scheduled.
//! - Every resumption carries the task's resume token at scheduling time.
//!   A task's token advances each time it is polled, so wakeups left behind
//!   by an abandoned wait (a timer that lost to an interrupt, say) are
//!   discarded instead of resuming the task spuriously.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;

use crate::error::{SimError, SimResult};
use crate::runtime::activity::{Interrupt, InterruptCause, JoinHandle, TaskId, Timeout};
use crate::types::SimTime;

/// A pending resumption
#[derive(Debug, Clone, Copy)]
struct Resumption {
    at: SimTime,
    seq: u64,
    task: TaskId,
    token: u64,
}

impl PartialEq for Resumption {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Resumption {}

impl PartialOrd for Resumption {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so flip both keys to pop the earliest first
impl Ord for Resumption {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-task bookkeeping
struct TaskSlot {
    label: String,
    /// `None` while the task is being polled
    future: Option<LocalBoxFuture<'static, ()>>,
    token: u64,
    interrupts: VecDeque<Interrupt>,
    joiners: Vec<TaskId>,
}

struct Kernel {
    now: SimTime,
    next_seq: u64,
    next_task: u64,
    queue: BinaryHeap<Resumption>,
    tasks: HashMap<TaskId, TaskSlot>,
    current: Option<TaskId>,
    polls: u64,
}

impl Kernel {
    fn push(&mut self, at: SimTime, task: TaskId, token: u64) {
        debug_assert!(at >= self.now, "resumption scheduled in the past");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Resumption { at, seq, task, token });
    }

    /// Schedule `task` at `at` with whatever token it currently holds
    fn wake_at(&mut self, task: TaskId, at: SimTime) {
        if let Some(token) = self.tasks.get(&task).map(|slot| slot.token) {
            self.push(at, task, token);
        }
    }
}

/// Handle to a simulation kernel.
///
/// Cheap to clone; every activity holds one to reach the clock.
#[derive(Clone)]
pub struct Sim {
    inner: Rc<RefCell<Kernel>>,
}

impl Sim {
    /// Create a kernel with the clock at zero
    pub fn new() -> Self {
        Sim {
            inner: Rc::new(RefCell::new(Kernel {
                now: 0.0,
                next_seq: 0,
                next_task: 0,
                queue: BinaryHeap::new(),
                tasks: HashMap::new(),
                current: None,
                polls: 0,
            })),
        }
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.inner.borrow().now
    }

    /// Suspend the calling activity for `delay` time units.
    ///
    /// # Panics
    ///
    /// Panics on a negative or non-finite delay; use [`Sim::try_after`] to
    /// handle that case as an error.
    pub fn after(&self, delay: SimTime) -> Timeout {
        match self.try_after(delay) {
            Ok(timeout) => timeout,
            Err(err) => panic!("{}", err),
        }
    }

    /// Suspend the calling activity for `delay` time units, rejecting
    /// negative or non-finite delays
    pub fn try_after(&self, delay: SimTime) -> SimResult<Timeout> {
        if !(delay >= 0.0) || !delay.is_finite() {
            return Err(SimError::NegativeDelay(delay));
        }
        Ok(Timeout::new(self.clone(), self.now() + delay))
    }

    /// Spawn a new activity. It first runs at the current time, after every
    /// resumption already due now.
    pub fn spawn<F, T>(&self, label: impl Into<String>, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot_output = Rc::clone(&output);
        let wrapped = async move {
            let value = future.await;
            *slot_output.borrow_mut() = Some(value);
        };

        let mut kernel = self.inner.borrow_mut();
        let id = TaskId::from_raw(kernel.next_task);
        kernel.next_task += 1;
        let label = label.into();
        log::trace!("t={:.4} spawn {} ({})", kernel.now, id, label);
        kernel.tasks.insert(
            id,
            TaskSlot {
                label,
                future: Some(wrapped.boxed_local()),
                token: 0,
                interrupts: VecDeque::new(),
                joiners: Vec::new(),
            },
        );
        let now = kernel.now;
        kernel.push(now, id, 0);
        drop(kernel);

        JoinHandle::new(self.clone(), id, output)
    }

    /// Interrupt a suspended activity with `cause`.
    ///
    /// The activity's next resumption yields the interrupt instead of what it
    /// was waiting for. Several interrupts queue up and are delivered one per
    /// suspension point. Returns `false` if the task has already finished.
    pub fn interrupt(&self, task: TaskId, cause: InterruptCause) -> bool {
        let mut kernel = self.inner.borrow_mut();
        let now = kernel.now;
        let is_current = kernel.current == Some(task);
        let Some(slot) = kernel.tasks.get_mut(&task) else {
            return false;
        };
        log::trace!("t={:.4} interrupt {} ({}): {}", now, task, slot.label, cause);
        slot.interrupts.push_back(Interrupt::new(cause));
        let token = slot.token;
        // A running task picks the interrupt up at its next suspension point
        if !is_current {
            kernel.push(now, task, token);
        }
        true
    }

    /// Whether `task` is still alive
    pub fn is_alive(&self, task: TaskId) -> bool {
        self.inner.borrow().tasks.contains_key(&task)
    }

    /// Number of live activities
    pub fn active_tasks(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Number of resumptions waiting in the queue (stale ones included)
    pub fn pending_resumptions(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Total number of activity polls performed so far
    pub fn polls(&self) -> u64 {
        self.inner.borrow().polls
    }

    /// Drive the simulation until no resumption remains due strictly before
    /// `deadline`, then move the clock to `deadline`.
    pub fn run_until(&self, deadline: SimTime) -> SimResult<()> {
        let now = self.now();
        if deadline.is_nan() || deadline < now {
            return Err(SimError::DeadlineInPast { deadline, now });
        }

        while let Some(resumption) = self.next_due(deadline) {
            self.resume(resumption);
        }

        let mut kernel = self.inner.borrow_mut();
        if deadline.is_finite() {
            kernel.now = deadline;
        }
        Ok(())
    }

    /// Drop every live activity and pending resumption.
    ///
    /// Activities own clones of this handle, so a finished simulation keeps
    /// itself alive until shut down.
    pub fn shutdown(&self) {
        let futures: Vec<_> = {
            let mut kernel = self.inner.borrow_mut();
            kernel.queue.clear();
            kernel
                .tasks
                .values_mut()
                .filter_map(|slot| slot.future.take())
                .collect()
        };
        // Dropping futures may run guards that call back into the kernel
        drop(futures);
        let mut kernel = self.inner.borrow_mut();
        kernel.tasks.clear();
        kernel.queue.clear();
    }

    fn next_due(&self, deadline: SimTime) -> Option<Resumption> {
        let mut kernel = self.inner.borrow_mut();
        match kernel.queue.peek() {
            Some(next) if next.at < deadline => kernel.queue.pop(),
            _ => None,
        }
    }

    fn resume(&self, resumption: Resumption) {
        let mut future = {
            let mut kernel = self.inner.borrow_mut();
            debug_assert!(resumption.at >= kernel.now, "clock moved backwards");
            kernel.now = resumption.at;
            let Some(slot) = kernel.tasks.get_mut(&resumption.task) else {
                return;
            };
            if slot.token != resumption.token {
                return;
            }
            let Some(future) = slot.future.take() else {
                return;
            };
            slot.token += 1;
            kernel.current = Some(resumption.task);
            kernel.polls += 1;
            future
        };

        let mut cx = Context::from_waker(noop_waker_ref());
        let poll = future.as_mut().poll(&mut cx);

        let mut kernel = self.inner.borrow_mut();
        kernel.current = None;
        match poll {
            Poll::Pending => {
                if let Some(slot) = kernel.tasks.get_mut(&resumption.task) {
                    slot.future = Some(future);
                }
            }
            Poll::Ready(()) => {
                let now = kernel.now;
                if let Some(slot) = kernel.tasks.remove(&resumption.task) {
                    log::trace!("t={:.4} finish {} ({})", now, resumption.task, slot.label);
                    for joiner in slot.joiners {
                        kernel.wake_at(joiner, now);
                    }
                }
                drop(kernel);
                // Outside the borrow: completed activities may release resources on drop
                drop(future);
            }
        }
    }

    // Hooks for suspension-point futures

    /// Task currently being polled
    pub(crate) fn current_task(&self) -> TaskId {
        self.inner
            .borrow()
            .current
            .expect("simulation futures must be awaited inside a spawned activity")
    }

    /// Pop the next pending interrupt for the running task
    pub(crate) fn take_interrupt(&self) -> Option<Interrupt> {
        let mut kernel = self.inner.borrow_mut();
        let current = kernel.current?;
        kernel.tasks.get_mut(&current)?.interrupts.pop_front()
    }

    /// Resume the running task at `at`
    pub(crate) fn resume_current_at(&self, at: SimTime) {
        let task = self.current_task();
        self.inner.borrow_mut().wake_at(task, at);
    }

    /// Resume `task` at the current time
    pub(crate) fn wake(&self, task: TaskId) {
        let mut kernel = self.inner.borrow_mut();
        let now = kernel.now;
        kernel.wake_at(task, now);
    }

    /// Register the running task to be woken when `target` finishes.
    ///
    /// Returns `false` if `target` already finished.
    pub(crate) fn join_current(&self, target: TaskId) -> bool {
        let joiner = self.current_task();
        let mut kernel = self.inner.borrow_mut();
        match kernel.tasks.get_mut(&target) {
            Some(slot) => {
                if !slot.joiners.contains(&joiner) {
                    slot.joiners.push(joiner);
                }
                true
            }
            None => false,
        }
    }

    /// Forget a join registration made by `joiner`
    pub(crate) fn unjoin(&self, target: TaskId, joiner: TaskId) {
        if let Ok(mut kernel) = self.inner.try_borrow_mut() {
            if let Some(slot) = kernel.tasks.get_mut(&target) {
                slot.joiners.retain(|id| *id != joiner);
            }
        }
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_clock_advances_to_deadline() {
        let sim = Sim::new();
        assert_eq!(sim.now(), 0.0);
        sim.run_until(42.0).unwrap();
        assert_eq!(sim.now(), 42.0);
        assert!(matches!(
            sim.run_until(10.0),
            Err(SimError::DeadlineInPast { .. })
        ));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let sim = Sim::new();
        assert_eq!(sim.try_after(-0.5).err(), Some(SimError::NegativeDelay(-0.5)));
        assert!(sim.try_after(0.0).is_ok());
    }

    #[test]
    #[should_panic(expected = "Negative delay")]
    fn test_after_panics_on_negative_delay() {
        let sim = Sim::new();
        let _ = sim.after(-1.0);
    }

    #[test]
    fn test_ties_resume_in_insertion_order() {
        let sim = Sim::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            let s = sim.clone();
            sim.spawn(name, async move {
                s.after(5.0).await.unwrap();
                order.borrow_mut().push((name, s.now()));
            });
        }

        sim.run_until(10.0).unwrap();
        assert_eq!(*order.borrow(), vec![("a", 5.0), ("b", 5.0), ("c", 5.0)]);
    }

    #[test]
    fn test_events_at_deadline_are_not_processed() {
        let sim = Sim::new();
        let fired = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&fired);
        let s = sim.clone();
        sim.spawn("timer", async move {
            s.after(10.0).await.unwrap();
            *flag.borrow_mut() = true;
        });

        sim.run_until(10.0).unwrap();
        assert!(!*fired.borrow());
        sim.run_until(10.5).unwrap();
        assert!(*fired.borrow());
    }

    #[test]
    fn test_interrupt_preempts_timer() {
        let sim = Sim::new();
        let seen = Rc::new(RefCell::new(None));
        let out = Rc::clone(&seen);
        let s = sim.clone();
        let sleeper = sim.spawn("sleeper", async move {
            let result = s.after(100.0).await;
            *out.borrow_mut() = Some((s.now(), result));
        });

        let s = sim.clone();
        let target = sleeper.id();
        sim.spawn("interrupter", async move {
            s.after(3.0).await.unwrap();
            assert!(s.interrupt(target, InterruptCause::Catastrophe));
        });

        sim.run_until(200.0).unwrap();
        let (at, result) = seen.borrow_mut().take().unwrap();
        assert_eq!(at, 3.0);
        assert_eq!(result.unwrap_err().cause(), &InterruptCause::Catastrophe);
        assert_eq!(sim.active_tasks(), 0);
    }

    #[test]
    fn test_interrupting_finished_task_is_noop() {
        let sim = Sim::new();
        let handle = sim.spawn("quick", async {});
        sim.run_until(1.0).unwrap();
        assert!(!sim.interrupt(handle.id(), InterruptCause::Preempted));
    }
}
