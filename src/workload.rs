//! Workload generator
//!
//! Poisson arrivals: exponential gaps, exponential service demands and
//! uniform priorities. While the system is down, admission is deferred by
//! polling, never dropped.

use std::rc::Rc;

use crate::context::SimContext;
use crate::events::EventKind;
use crate::sampler::SharedSampler;
use crate::scheduler::Scheduler;
use crate::types::{Pid, Process, SimTime};

pub struct WorkloadGenerator {
    ctx: Rc<SimContext>,
    sampler: SharedSampler,
    scheduler: Rc<dyn Scheduler>,
    poll_interval: SimTime,
}

impl WorkloadGenerator {
    pub fn new(
        ctx: Rc<SimContext>,
        sampler: SharedSampler,
        scheduler: Rc<dyn Scheduler>,
        poll_interval: SimTime,
    ) -> Self {
        WorkloadGenerator {
            ctx,
            sampler,
            scheduler,
            poll_interval,
        }
    }

    /// Generate arrivals until the arrival stream ends
    pub async fn run(self) {
        let sim = self.ctx.sim().clone();
        let mut next_pid = 0;
        loop {
            let gap = self.sampler.borrow_mut().inter_arrival();
            if !gap.is_finite() {
                log::debug!("arrival stream ended at t={:.2}", sim.now());
                return;
            }
            let _ = sim.after(gap).await;

            next_pid += 1;
            let demand = self.sampler.borrow_mut().service_demand();

            while !self.ctx.is_operational() {
                let _ = sim.after(self.poll_interval).await;
            }

            let priority = self.sampler.borrow_mut().priority();
            let process = Process::new(Pid(next_pid), sim.now(), demand, priority);
            self.ctx.with_metrics(|m| m.record_admission());
            self.ctx.emit(EventKind::Arrival {
                pid: process.pid(),
                demand,
                priority,
            });
            self.scheduler.add_process(process);
        }
    }
}
