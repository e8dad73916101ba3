//! Shared simulation context
//!
//! One [`SimContext`] per run holds everything the activities share: the
//! kernel handle, the system operational state, the metrics collector and
//! the event sink. Activities hold it through an `Rc`; the kernel runs one
//! activity at a time, so `Cell`/`RefCell` are enough.

use std::cell::{Cell, Ref, RefCell};
use std::io;

use crate::events::{EventKind, EventSink, SimEvent};
use crate::metrics::Metrics;
use crate::runtime::Sim;
use crate::types::SimTime;

pub struct SimContext {
    sim: Sim,
    operational: Cell<bool>,
    last_restoration: Cell<SimTime>,
    metrics: RefCell<Metrics>,
    events: RefCell<Box<dyn EventSink>>,
}

impl SimContext {
    /// Context for a system that starts operational
    pub fn new(sim: Sim, events: Box<dyn EventSink>) -> Self {
        SimContext {
            sim,
            operational: Cell::new(true),
            last_restoration: Cell::new(0.0),
            metrics: RefCell::new(Metrics::new()),
            events: RefCell::new(events),
        }
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    /// Whether the system is up
    pub fn is_operational(&self) -> bool {
        self.operational.get()
    }

    /// Time of the most recent restoration (zero before the first failure)
    pub fn last_restoration(&self) -> SimTime {
        self.last_restoration.get()
    }

    /// Take the system down
    pub fn fail(&self) {
        self.operational.set(false);
        self.metrics.borrow_mut().record_catastrophe();
    }

    /// Bring the system back up after a repair of `downtime`
    pub fn restore(&self, downtime: SimTime) {
        self.operational.set(true);
        self.last_restoration.set(self.now());
        self.metrics.borrow_mut().record_restoration(downtime);
    }

    /// Read-only view of the metrics
    pub fn metrics(&self) -> Ref<'_, Metrics> {
        self.metrics.borrow()
    }

    /// Mutate the metrics
    pub fn with_metrics<R>(&self, f: impl FnOnce(&mut Metrics) -> R) -> R {
        f(&mut self.metrics.borrow_mut())
    }

    /// Emit an event stamped with the current time
    pub fn emit(&self, kind: EventKind) {
        let event = SimEvent { time: self.now(), kind };
        self.events.borrow_mut().record(&event);
    }

    /// Flush the event sink
    pub fn finish_events(&self) -> io::Result<()> {
        self.events.borrow_mut().finish()
    }
}
