//! Round-robin
//!
//! The run loop hands the head of the deque one time slice of at most
//! `quantum` on an exclusive CPU. Unfinished processes go back to the tail.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::context::SimContext;
use crate::events::{EventKind, PreemptReason};
use crate::runtime::{Cpu, InterruptCause, Resumed, TaskId};
use crate::scheduler::{PollIntervals, RecoveryWindow, Scheduler};
use crate::types::{PolicyKind, Process, SimTime};

pub struct RoundRobin {
    ctx: Rc<SimContext>,
    cpu: Cpu,
    ready: RefCell<VecDeque<Process>>,
    running: Cell<Option<TaskId>>,
    quantum: SimTime,
    recovery: RecoveryWindow,
    polls: PollIntervals,
}

impl RoundRobin {
    pub fn new(ctx: Rc<SimContext>, quantum: SimTime, polls: PollIntervals) -> Self {
        debug_assert!(quantum > 0.0);
        RoundRobin {
            cpu: Cpu::exclusive(ctx.sim().clone()),
            ctx,
            ready: RefCell::new(VecDeque::new()),
            running: Cell::new(None),
            quantum,
            recovery: RecoveryWindow::new(),
            polls,
        }
    }

    pub fn quantum(&self) -> SimTime {
        self.quantum
    }

    async fn run_loop(self: Rc<Self>) {
        let sim = self.ctx.sim().clone();
        loop {
            if !self.ctx.is_operational() {
                let _ = sim.after(self.polls.down).await;
                continue;
            }

            let queue_empty = self.ready.borrow().is_empty();
            self.recovery
                .try_close(&self.ctx, self.cpu.is_idle(), queue_empty);

            let next = self.ready.borrow_mut().pop_front();
            let Some(process) = next else {
                let _ = sim.after(self.polls.idle).await;
                continue;
            };
            let pid = process.pid();

            let service = sim.spawn(
                format!("slice {}", pid),
                Rc::clone(&self).serve_slice(process),
            );
            self.running.set(Some(service.id()));
            let outcome = service.await;
            self.running.set(None);

            if let Ok(Err(interrupt)) = outcome {
                if interrupt.is_catastrophe() {
                    self.ctx.emit(EventKind::Interrupt { pid });
                }
            }
        }
    }

    /// Serve one time slice, requeueing the process if work remains
    async fn serve_slice(self: Rc<Self>, mut process: Process) -> Resumed<()> {
        let ctx = &self.ctx;
        let grant = self.cpu.request().await?;

        let pid = process.pid();
        match process.mark_granted(ctx.now()) {
            Some(waited) => {
                ctx.with_metrics(|m| m.record_wait(waited));
                ctx.emit(EventKind::Execute { pid, waited });
            }
            None => ctx.emit(EventKind::Resume { pid }),
        }

        let slice = self.quantum.min(process.remaining_demand());
        ctx.sim().after(slice).await?;
        process.consume(slice);
        drop(grant);

        if process.is_finished() {
            ctx.with_metrics(|m| m.record_completion());
            ctx.emit(EventKind::Complete { pid });
        } else {
            ctx.with_metrics(|m| m.record_preemption());
            ctx.emit(EventKind::Preempt {
                pid,
                remaining: process.remaining_demand(),
                reason: PreemptReason::Quantum,
            });
            self.ready.borrow_mut().push_back(process);
        }
        Ok(())
    }
}

impl Scheduler for RoundRobin {
    fn policy(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn add_process(&self, process: Process) {
        self.ready.borrow_mut().push_back(process);
    }

    fn run(self: Rc<Self>) -> LocalBoxFuture<'static, ()> {
        self.run_loop().boxed_local()
    }

    fn handle_catastrophe(&self) {
        let mut lost = 0;
        if let Some(task) = self.running.get() {
            if self.ctx.sim().interrupt(task, InterruptCause::Catastrophe) {
                lost += 1;
            }
        }
        self.recovery.cancel();
        let mut ready = self.ready.borrow_mut();
        lost += ready.len() as u64;
        ready.clear();
        drop(ready);
        self.ctx.with_metrics(|m| m.record_lost(lost));
        self.ctx.emit(EventKind::QueueLost { lost });
    }

    fn begin_recovery(&self) {
        self.recovery.open();
    }

    fn queued(&self) -> usize {
        self.ready.borrow().len()
    }

    fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    fn is_recovering(&self) -> bool {
        self.recovery.is_open()
    }
}
