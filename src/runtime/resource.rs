//! Capacity-1 CPU resource
//!
//! Two grant disciplines share one implementation:
//!
//! - **Exclusive**: requests are granted strictly in arrival order.
//! - **Preemptive**: a request carries a priority. A free CPU is granted
//!   immediately; a holder with a numerically larger priority is interrupted
//!   with [`InterruptCause::Preempted`] and the newcomer takes over; otherwise
//!   the request waits, ordered by priority then arrival.
//!
//! A displaced holder's request is finished, not re-queued: resuming requires
//! a fresh request. Grants are scoped by [`CpuGrant`], which releases on drop,
//! and a request abandoned mid-acquisition (its [`Acquire`] dropped, usually
//! after an interrupt) withdraws itself.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::runtime::activity::{InterruptCause, Resumed, TaskId};
use crate::runtime::kernel::Sim;
use crate::types::Priority;

/// Grant discipline of a [`Cpu`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    /// FIFO grants, no preemption
    Exclusive,
    /// Priority grants; lower numeric priority evicts the holder
    Preemptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RequestId(u64);

#[derive(Debug, Clone, Copy)]
struct Holder {
    request: RequestId,
    task: TaskId,
    priority: Priority,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    request: RequestId,
    task: TaskId,
    priority: Priority,
}

#[derive(Debug)]
struct CpuState {
    mode: CpuMode,
    holder: Option<Holder>,
    waiters: Vec<Waiter>,
    next_request: u64,
    grants: u64,
    preemptions: u64,
}

impl CpuState {
    /// Ordering key of a waiter: priority (preemptive mode only), then arrival
    fn rank(&self, waiter: &Waiter) -> (u8, RequestId) {
        match self.mode {
            CpuMode::Exclusive => (0, waiter.request),
            CpuMode::Preemptive => (waiter.priority.level(), waiter.request),
        }
    }

    /// Hand the CPU to the best waiter, returning the task to wake
    fn promote_next(&mut self) -> Option<TaskId> {
        debug_assert!(self.holder.is_none());
        let best = (0..self.waiters.len()).min_by_key(|&i| self.rank(&self.waiters[i]))?;
        let next = self.waiters.remove(best);
        self.holder = Some(Holder {
            request: next.request,
            task: next.task,
            priority: next.priority,
        });
        self.grants += 1;
        Some(next.task)
    }
}

/// Single CPU shared by every activity of one scheduler
#[derive(Clone)]
pub struct Cpu {
    sim: Sim,
    state: Rc<RefCell<CpuState>>,
}

impl Cpu {
    /// Create a CPU with the given grant discipline
    pub fn new(sim: Sim, mode: CpuMode) -> Self {
        Cpu {
            sim,
            state: Rc::new(RefCell::new(CpuState {
                mode,
                holder: None,
                waiters: Vec::new(),
                next_request: 0,
                grants: 0,
                preemptions: 0,
            })),
        }
    }

    /// FIFO CPU
    pub fn exclusive(sim: Sim) -> Self {
        Self::new(sim, CpuMode::Exclusive)
    }

    /// Priority CPU with preemption
    pub fn preemptive(sim: Sim) -> Self {
        Self::new(sim, CpuMode::Preemptive)
    }

    pub fn mode(&self) -> CpuMode {
        self.state.borrow().mode
    }

    /// Request the CPU; priority is irrelevant in exclusive mode
    pub fn request(&self) -> Acquire {
        self.request_with_priority(Priority::LOWEST)
    }

    /// Request the CPU at `priority`
    pub fn request_with_priority(&self, priority: Priority) -> Acquire {
        Acquire {
            cpu: self.clone(),
            priority,
            state: AcquireState::Unsubmitted,
        }
    }

    /// Whether nobody holds the CPU
    pub fn is_idle(&self) -> bool {
        self.state.borrow().holder.is_none()
    }

    /// Activity currently holding the CPU
    pub fn holder(&self) -> Option<TaskId> {
        self.state.borrow().holder.map(|h| h.task)
    }

    /// Number of requests waiting for a grant
    pub fn queue_len(&self) -> usize {
        self.state.borrow().waiters.len()
    }

    /// Total grants handed out
    pub fn grants(&self) -> u64 {
        self.state.borrow().grants
    }

    /// Total holders evicted by more urgent requests
    pub fn preemptions(&self) -> u64 {
        self.state.borrow().preemptions
    }

    /// Submit a request; `true` if it was granted on the spot
    fn submit(&self, request: RequestId, task: TaskId, priority: Priority) -> bool {
        let evicted = {
            let mut state = self.state.borrow_mut();
            let current = state.holder;
            match current {
                None => {
                    state.holder = Some(Holder { request, task, priority });
                    state.grants += 1;
                    return true;
                }
                Some(holder)
                    if state.mode == CpuMode::Preemptive && priority.outranks(holder.priority) =>
                {
                    state.holder = Some(Holder { request, task, priority });
                    state.grants += 1;
                    state.preemptions += 1;
                    holder.task
                }
                Some(_) => {
                    state.waiters.push(Waiter { request, task, priority });
                    return false;
                }
            }
        };
        self.sim.interrupt(evicted, InterruptCause::Preempted);
        true
    }

    fn next_request_id(&self) -> RequestId {
        let mut state = self.state.borrow_mut();
        let id = RequestId(state.next_request);
        state.next_request += 1;
        id
    }

    fn holds(&self, request: RequestId) -> bool {
        self.state.borrow().holder.map(|h| h.request) == Some(request)
    }

    /// Release the CPU if `request` still holds it
    fn release(&self, request: RequestId) {
        let woken = {
            let mut state = self.state.borrow_mut();
            if state.holder.map(|h| h.request) != Some(request) {
                return;
            }
            state.holder = None;
            state.promote_next()
        };
        if let Some(task) = woken {
            self.sim.wake(task);
        }
    }

    /// Abandon `request`, whether still waiting or granted but never claimed
    fn withdraw(&self, request: RequestId) {
        let was_waiting = {
            let mut state = self.state.borrow_mut();
            let before = state.waiters.len();
            state.waiters.retain(|w| w.request != request);
            state.waiters.len() != before
        };
        if !was_waiting {
            self.release(request);
        }
    }
}

enum AcquireState {
    Unsubmitted,
    Waiting(RequestId),
    Done,
}

/// Pending CPU request; resolves to a [`CpuGrant`] or an interrupt
pub struct Acquire {
    cpu: Cpu,
    priority: Priority,
    state: AcquireState,
}

impl Future for Acquire {
    type Output = Resumed<CpuGrant>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(interrupt) = this.cpu.sim.take_interrupt() {
            if let AcquireState::Waiting(request) = this.state {
                this.cpu.withdraw(request);
            }
            this.state = AcquireState::Done;
            return Poll::Ready(Err(interrupt));
        }

        match this.state {
            AcquireState::Unsubmitted => {
                let request = this.cpu.next_request_id();
                let task = this.cpu.sim.current_task();
                if this.cpu.submit(request, task, this.priority) {
                    this.state = AcquireState::Done;
                    Poll::Ready(Ok(CpuGrant::new(this.cpu.clone(), request)))
                } else {
                    this.state = AcquireState::Waiting(request);
                    Poll::Pending
                }
            }
            AcquireState::Waiting(request) => {
                if this.cpu.holds(request) {
                    this.state = AcquireState::Done;
                    Poll::Ready(Ok(CpuGrant::new(this.cpu.clone(), request)))
                } else {
                    Poll::Pending
                }
            }
            AcquireState::Done => Poll::Pending,
        }
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        if let AcquireState::Waiting(request) = self.state {
            self.cpu.withdraw(request);
        }
    }
}

/// Scoped CPU ownership; dropping it releases the CPU to the next waiter
pub struct CpuGrant {
    cpu: Cpu,
    request: RequestId,
}

impl CpuGrant {
    fn new(cpu: Cpu, request: RequestId) -> Self {
        CpuGrant { cpu, request }
    }

    /// Whether this grant still owns the CPU (false once preempted)
    pub fn is_held(&self) -> bool {
        self.cpu.holds(self.request)
    }
}

impl Drop for CpuGrant {
    fn drop(&mut self) {
        self.cpu.release(self.request);
    }
}
