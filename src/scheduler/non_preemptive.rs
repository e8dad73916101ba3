//! First-come-first-served and shortest-job-first
//!
//! Both policies pull one process at a time from their ready store and run
//! it to completion on an exclusive CPU. They differ only in store order.

use std::cell::Cell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::context::SimContext;
use crate::events::EventKind;
use crate::runtime::{Cpu, InterruptCause, Resumed, TaskId};
use crate::scheduler::{PollIntervals, ReadyStore, RecoveryWindow, Scheduler};
use crate::types::{PolicyKind, Process};

pub struct NonPreemptive {
    policy: PolicyKind,
    ctx: Rc<SimContext>,
    cpu: Cpu,
    ready: ReadyStore,
    /// Service activity of the process currently pulled from the store
    running: Cell<Option<TaskId>>,
    recovery: RecoveryWindow,
    polls: PollIntervals,
}

impl NonPreemptive {
    /// First-come-first-served
    pub fn fcfs(ctx: Rc<SimContext>, polls: PollIntervals) -> Self {
        let ready = ReadyStore::fifo(ctx.sim().clone());
        Self::with_store(PolicyKind::Fcfs, ctx, ready, polls)
    }

    /// Shortest job first, keyed by initial demand
    pub fn sjf(ctx: Rc<SimContext>, polls: PollIntervals) -> Self {
        let ready = ReadyStore::shortest_first(ctx.sim().clone());
        Self::with_store(PolicyKind::Sjf, ctx, ready, polls)
    }

    fn with_store(
        policy: PolicyKind,
        ctx: Rc<SimContext>,
        ready: ReadyStore,
        polls: PollIntervals,
    ) -> Self {
        NonPreemptive {
            policy,
            cpu: Cpu::exclusive(ctx.sim().clone()),
            ctx,
            ready,
            running: Cell::new(None),
            recovery: RecoveryWindow::new(),
            polls,
        }
    }

    async fn run_loop(self: Rc<Self>) {
        let sim = self.ctx.sim().clone();
        loop {
            if !self.ctx.is_operational() {
                let _ = sim.after(self.polls.down).await;
                continue;
            }

            self.recovery
                .try_close(&self.ctx, self.cpu.is_idle(), self.ready.is_empty());

            // `None` means a recovery window opened while parked here
            let process = match self.ready.get().await {
                Ok(Some(process)) => process,
                Ok(None) | Err(_) => continue,
            };
            let pid = process.pid();

            let service = sim.spawn(
                format!("serve {}", pid),
                serve(Rc::clone(&self.ctx), self.cpu.clone(), process),
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
}

/// Run one process to completion on the CPU
async fn serve(ctx: Rc<SimContext>, cpu: Cpu, mut process: Process) -> Resumed<()> {
    let grant = cpu.request().await?;

    let pid = process.pid();
    if let Some(waited) = process.mark_granted(ctx.now()) {
        ctx.with_metrics(|m| m.record_wait(waited));
        ctx.emit(EventKind::Execute { pid, waited });
    }

    ctx.sim().after(process.initial_demand()).await?;
    process.finish();
    ctx.with_metrics(|m| m.record_completion());
    ctx.emit(EventKind::Complete { pid });
    drop(grant);
    Ok(())
}

impl Scheduler for NonPreemptive {
    fn policy(&self) -> PolicyKind {
        self.policy
    }

    fn add_process(&self, process: Process) {
        self.ready.put(process);
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
        lost += self.ready.clear() as u64;
        self.ctx.with_metrics(|m| m.record_lost(lost));
        self.ctx.emit(EventKind::QueueLost { lost });
    }

    fn begin_recovery(&self) {
        self.recovery.open();
        self.ready.notify();
    }

    fn queued(&self) -> usize {
        self.ready.len()
    }

    fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    fn is_recovering(&self) -> bool {
        self.recovery.is_open()
    }
}
