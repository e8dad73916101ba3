//! Suspendable activities
//!
//! An activity is any future spawned on a [`Sim`]. It suspends at three kinds
//! of points: timers ([`Timeout`]), CPU grants
//! ([`Acquire`](crate::runtime::resource::Acquire)) and other activities
//! finishing ([`JoinHandle`]). Every suspension point resolves to
//! `Result<T, Interrupt>`: an interrupt delivered while suspended wins over
//! the awaited outcome, and the activity decides what to do with it. There is
//! no veto.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};

use crate::runtime::kernel::Sim;
use crate::types::SimTime;

/// Activity identifier, unique within one kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        TaskId(raw)
    }

    /// Get the raw task id
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Why an activity was interrupted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptCause {
    /// A system-wide failure; in-flight work is lost
    Catastrophe,
    /// A more urgent request took the CPU
    Preempted,
    /// Any other cause
    Other(String),
}

impl fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptCause::Catastrophe => write!(f, "catastrophe"),
            InterruptCause::Preempted => write!(f, "preempted"),
            InterruptCause::Other(cause) => write!(f, "{}", cause),
        }
    }
}

/// Cancellation signal delivered at a suspension point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupt {
    cause: InterruptCause,
}

impl Interrupt {
    pub(crate) fn new(cause: InterruptCause) -> Self {
        Interrupt { cause }
    }

    pub fn cause(&self) -> &InterruptCause {
        &self.cause
    }

    pub fn is_catastrophe(&self) -> bool {
        self.cause == InterruptCause::Catastrophe
    }

    pub fn is_preemption(&self) -> bool {
        self.cause == InterruptCause::Preempted
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted: {}", self.cause)
    }
}

/// Outcome of a suspension point
pub type Resumed<T> = Result<T, Interrupt>;

/// Timer suspension point, created by [`Sim::after`]
pub struct Timeout {
    sim: Sim,
    at: SimTime,
    armed: bool,
}

impl Timeout {
    pub(crate) fn new(sim: Sim, at: SimTime) -> Self {
        Timeout { sim, at, armed: false }
    }

    /// Absolute time at which the timer fires
    pub fn deadline(&self) -> SimTime {
        self.at
    }
}

impl Future for Timeout {
    type Output = Resumed<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.sim.take_interrupt() {
            return Poll::Ready(Err(interrupt));
        }
        if this.armed && this.sim.now() >= this.at {
            return Poll::Ready(Ok(()));
        }
        // (Re)arm: any earlier wakeup was consumed by this poll
        this.armed = true;
        this.sim.resume_current_at(this.at);
        Poll::Pending
    }
}

/// Handle to a spawned activity; awaiting it suspends until the activity
/// finishes and yields its output.
pub struct JoinHandle<T> {
    sim: Sim,
    task: TaskId,
    output: Rc<RefCell<Option<T>>>,
    joiner: Option<TaskId>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(sim: Sim, task: TaskId, output: Rc<RefCell<Option<T>>>) -> Self {
        JoinHandle {
            sim,
            task,
            output,
            joiner: None,
        }
    }

    /// Id of the spawned activity
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// Whether the activity has run to completion
    pub fn is_finished(&self) -> bool {
        !self.sim.is_alive(self.task)
    }

    /// Interrupt the activity; returns `false` if it already finished
    pub fn interrupt(&self, cause: InterruptCause) -> bool {
        self.sim.interrupt(self.task, cause)
    }

    /// Take the output of a finished activity without suspending
    pub fn try_take(&self) -> Option<T> {
        self.output.borrow_mut().take()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Resumed<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.sim.take_interrupt() {
            return Poll::Ready(Err(interrupt));
        }
        if let Some(value) = this.output.borrow_mut().take() {
            return Poll::Ready(Ok(value));
        }
        if this.sim.join_current(this.task) {
            this.joiner = Some(this.sim.current_task());
        }
        // A finished task without output was joined before; stay parked
        // until an interrupt arrives.
        Poll::Pending
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        if let Some(joiner) = self.joiner.take() {
            self.sim.unjoin(self.task, joiner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_yields_output() {
        let sim = Sim::new();
        let s = sim.clone();
        let child = sim.spawn("child", async move {
            s.after(2.5).await.unwrap();
            7u32
        });

        let s = sim.clone();
        let result = Rc::new(RefCell::new(None));
        let out = Rc::clone(&result);
        sim.spawn("parent", async move {
            let value = child.await.unwrap();
            *out.borrow_mut() = Some((s.now(), value));
        });

        sim.run_until(10.0).unwrap();
        assert_eq!(*result.borrow(), Some((2.5, 7)));
    }

    #[test]
    fn test_interrupted_join_leaves_child_running() {
        let sim = Sim::new();
        let s = sim.clone();
        let child = sim.spawn("child", async move {
            s.after(5.0).await.unwrap();
        });
        let child_id = child.id();

        let s = sim.clone();
        let parent = sim.spawn("parent", async move {
            let joined = child.await;
            (s.now(), joined.is_err())
        });
        let parent_id = parent.id();

        let s = sim.clone();
        sim.spawn("interrupter", async move {
            s.after(1.0).await.unwrap();
            s.interrupt(parent_id, InterruptCause::Other("stop".to_string()));
        });

        sim.run_until(2.0).unwrap();
        assert_eq!(parent.try_take(), Some((1.0, true)));
        assert!(sim.is_alive(child_id));

        sim.run_until(6.0).unwrap();
        assert!(!sim.is_alive(child_id));
    }

    #[test]
    fn test_queued_interrupts_delivered_one_per_suspension() {
        let sim = Sim::new();
        let s = sim.clone();
        let worker = sim.spawn("worker", async move {
            let mut causes = Vec::new();
            for _ in 0..3 {
                if let Err(interrupt) = s.after(10.0).await {
                    causes.push((s.now(), interrupt.cause().clone()));
                }
            }
            causes
        });
        let id = worker.id();

        let s = sim.clone();
        sim.spawn("interrupter", async move {
            s.after(1.0).await.unwrap();
            s.interrupt(id, InterruptCause::Preempted);
            s.interrupt(id, InterruptCause::Catastrophe);
        });

        sim.run_until(100.0).unwrap();
        let causes = worker.try_take().unwrap();
        assert_eq!(
            causes,
            vec![
                (1.0, InterruptCause::Preempted),
                (1.0, InterruptCause::Catastrophe),
            ]
        );
        assert_eq!(sim.now(), 100.0);
    }
}
