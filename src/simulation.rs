//! Simulation setup and execution
//!
//! Wires one run together: a kernel, the shared context, the chosen policy,
//! and the three background activities (scheduler loop, workload generator,
//! fault injector). Then it drives the clock to the horizon and reports.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::{FaultschedResult, SimResult};
use crate::events::{EventSink, NullSink};
use crate::fault::FaultInjector;
use crate::metrics::Report;
use crate::runtime::Sim;
use crate::sampler::{Sampler, SharedSampler, StochasticSampler};
use crate::scheduler::{self, Scheduler};
use crate::types::SimTime;
use crate::workload::WorkloadGenerator;

/// A configured, not yet started simulation
pub struct Simulation {
    config: SimConfig,
    sampler: SharedSampler,
    sink: Box<dyn EventSink>,
}

impl Simulation {
    /// Validate `config` and prepare a run with a seeded (or entropy-seeded)
    /// sampler and no event output
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let sampler = Rc::new(RefCell::new(StochasticSampler::from_config(&config)));
        Ok(Simulation {
            config,
            sampler,
            sink: Box::new(NullSink),
        })
    }

    /// Replace the random source
    pub fn with_sampler<S: Sampler + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Rc::new(RefCell::new(sampler));
        self
    }

    /// Send events to `sink`
    pub fn with_sink<E: EventSink + 'static>(mut self, sink: E) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Send events to a boxed sink
    pub fn with_boxed_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Spawn every activity without advancing the clock
    pub fn start(self) -> SimulationRun {
        let sim = Sim::new();
        let ctx = Rc::new(SimContext::new(sim.clone(), self.sink));
        let polls = self.config.poll_intervals();
        let scheduler = scheduler::build(
            self.config.policy,
            Rc::clone(&ctx),
            self.config.rr_quantum,
            polls,
        );
        log::info!(
            "starting {} simulation for {} time units",
            self.config.policy,
            self.config.sim_duration
        );

        sim.spawn("scheduler", Rc::clone(&scheduler).run());
        let workload = WorkloadGenerator::new(
            Rc::clone(&ctx),
            Rc::clone(&self.sampler),
            Rc::clone(&scheduler),
            polls.down,
        );
        sim.spawn("workload", workload.run());
        let faults = FaultInjector::new(Rc::clone(&ctx), self.sampler, Rc::clone(&scheduler));
        sim.spawn("faults", faults.run());

        SimulationRun {
            sim,
            ctx,
            scheduler,
            horizon: self.config.sim_duration,
        }
    }

    /// Run to the configured horizon and report
    pub fn run(self) -> FaultschedResult<Report> {
        self.start().finish()
    }
}

/// A started simulation
pub struct SimulationRun {
    sim: Sim,
    ctx: Rc<SimContext>,
    scheduler: Rc<dyn Scheduler>,
    horizon: SimTime,
}

impl SimulationRun {
    /// Advance the clock to `deadline`
    pub fn run_until(&self, deadline: SimTime) -> SimResult<()> {
        self.sim.run_until(deadline)
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    /// Snapshot report as of the current clock
    pub fn report(&self) -> Report {
        self.ctx
            .metrics()
            .report(self.scheduler.policy(), self.sim.now())
    }

    /// Run to the horizon, tear down every activity and report
    pub fn finish(self) -> FaultschedResult<Report> {
        self.sim.run_until(self.horizon())?;
        log::debug!(
            "simulation finished after {} polls, {} activities live",
            self.sim.polls(),
            self.sim.active_tasks()
        );
        let report = self.report();
        self.sim.shutdown();
        self.ctx.finish_events()?;
        Ok(report)
    }
}
