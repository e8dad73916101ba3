//! Preemptive fixed priority
//!
//! Every admitted process gets its own service activity that requests the
//! CPU at the process's priority and runs the whole remaining demand once
//! granted. A more urgent request evicts the holder; the evicted activity
//! books the time it ran and asks for the CPU again, so displaced work
//! resumes once everything more urgent has drained. The run loop only
//! watches for the end of recovery windows.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::context::SimContext;
use crate::events::{EventKind, PreemptReason};
use crate::runtime::{Cpu, InterruptCause, Resumed, TaskId};
use crate::scheduler::{PollIntervals, RecoveryWindow, Scheduler};
use crate::types::{Pid, PolicyKind, Process};

/// Admitted, unfinished processes with their service activities, in
/// admission order
type Roster = Rc<RefCell<VecDeque<(Pid, TaskId)>>>;

pub struct PreemptivePriority {
    ctx: Rc<SimContext>,
    cpu: Cpu,
    admitted: Roster,
    recovery: RecoveryWindow,
    polls: PollIntervals,
}

impl PreemptivePriority {
    pub fn new(ctx: Rc<SimContext>, polls: PollIntervals) -> Self {
        PreemptivePriority {
            cpu: Cpu::preemptive(ctx.sim().clone()),
            ctx,
            admitted: Rc::new(RefCell::new(VecDeque::new())),
            recovery: RecoveryWindow::new(),
            polls,
        }
    }

    async fn run_loop(self: Rc<Self>) {
        let sim = self.ctx.sim().clone();
        loop {
            if self.ctx.is_operational() {
                let queue_empty = self.admitted.borrow().is_empty();
                self.recovery
                    .try_close(&self.ctx, self.cpu.is_idle(), queue_empty);
            }
            let _ = sim.after(self.polls.down).await;
        }
    }
}

/// Service activity of one process
async fn serve(ctx: Rc<SimContext>, cpu: Cpu, admitted: Roster, mut process: Process) {
    let pid = process.pid();
    let outcome = run_to_completion(&ctx, &cpu, &mut process).await;
    admitted.borrow_mut().retain(|(entry, _)| *entry != pid);

    match outcome {
        Ok(()) => {
            ctx.with_metrics(|m| m.record_completion());
            ctx.emit(EventKind::Complete { pid });
        }
        Err(interrupt) => {
            debug_assert!(interrupt.is_catastrophe());
            ctx.emit(EventKind::Interrupt { pid });
        }
    }
}

async fn run_to_completion(ctx: &SimContext, cpu: &Cpu, process: &mut Process) -> Resumed<()> {
    let pid = process.pid();
    loop {
        let grant = match cpu.request_with_priority(process.priority()).await {
            Ok(grant) => grant,
            // Evicted between being granted and running; queue again
            Err(interrupt) if interrupt.is_preemption() => continue,
            Err(interrupt) => return Err(interrupt),
        };

        match process.mark_granted(ctx.now()) {
            Some(waited) => {
                ctx.with_metrics(|m| m.record_wait(waited));
                ctx.emit(EventKind::Execute { pid, waited });
            }
            None => ctx.emit(EventKind::Resume { pid }),
        }

        let started = ctx.now();
        match ctx.sim().after(process.remaining_demand()).await {
            Ok(()) => {
                process.finish();
                return Ok(());
            }
            Err(interrupt) if interrupt.is_preemption() => {
                process.consume(ctx.now() - started);
                ctx.with_metrics(|m| m.record_preemption());
                ctx.emit(EventKind::Preempt {
                    pid,
                    remaining: process.remaining_demand(),
                    reason: PreemptReason::Priority,
                });
                // Already evicted; the grant no longer owns the CPU
                debug_assert!(!grant.is_held());
            }
            Err(interrupt) => return Err(interrupt),
        }
    }
}

impl Scheduler for PreemptivePriority {
    fn policy(&self) -> PolicyKind {
        PolicyKind::PreemptivePriority
    }

    fn add_process(&self, process: Process) {
        let pid = process.pid();
        let service = self.ctx.sim().spawn(
            format!("serve {}", pid),
            serve(
                Rc::clone(&self.ctx),
                self.cpu.clone(),
                Rc::clone(&self.admitted),
                process,
            ),
        );
        self.admitted.borrow_mut().push_back((pid, service.id()));
    }

    fn run(self: Rc<Self>) -> LocalBoxFuture<'static, ()> {
        self.run_loop().boxed_local()
    }

    fn handle_catastrophe(&self) {
        let in_flight: Vec<_> = self.admitted.borrow_mut().drain(..).collect();
        let sim = self.ctx.sim();
        for (_, task) in &in_flight {
            sim.interrupt(*task, InterruptCause::Catastrophe);
        }
        self.recovery.cancel();
        let lost = in_flight.len() as u64;
        self.ctx.with_metrics(|m| m.record_lost(lost));
        self.ctx.emit(EventKind::QueueLost { lost });
    }

    fn begin_recovery(&self) {
        self.recovery.open();
    }

    fn queued(&self) -> usize {
        self.admitted.borrow().len()
    }

    fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    fn is_recovering(&self) -> bool {
        self.recovery.is_open()
    }
}
