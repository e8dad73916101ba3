//! Fault injector
//!
//! Catastrophes arrive as a Poisson process. Each one takes the system down,
//! makes the scheduler discard its work, and lasts one exponential repair.
//! The loop is sequential, so at most one failure is in flight.

use std::rc::Rc;

use crate::context::SimContext;
use crate::events::EventKind;
use crate::sampler::SharedSampler;
use crate::scheduler::Scheduler;

pub struct FaultInjector {
    ctx: Rc<SimContext>,
    sampler: SharedSampler,
    scheduler: Rc<dyn Scheduler>,
}

impl FaultInjector {
    pub fn new(ctx: Rc<SimContext>, sampler: SharedSampler, scheduler: Rc<dyn Scheduler>) -> Self {
        FaultInjector { ctx, sampler, scheduler }
    }

    /// Inject failures until the failure stream ends
    pub async fn run(self) {
        let sim = self.ctx.sim().clone();
        loop {
            let time_to_failure = self.sampler.borrow_mut().time_to_failure();
            if !time_to_failure.is_finite() {
                log::debug!("failure stream ended at t={:.2}", sim.now());
                return;
            }
            let _ = sim.after(time_to_failure).await;

            if !self.ctx.is_operational() {
                continue;
            }
            self.ctx.fail();
            self.ctx.emit(EventKind::Catastrophe);
            self.scheduler.handle_catastrophe();

            let repair = self.sampler.borrow_mut().repair_duration();
            if !repair.is_finite() {
                log::warn!("unbounded repair at t={:.2}; system stays down", sim.now());
                return;
            }
            let _ = sim.after(repair).await;

            self.ctx.restore(repair);
            self.scheduler.begin_recovery();
            self.ctx.emit(EventKind::Restoration { downtime: repair });
        }
    }
}
