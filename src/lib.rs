//! # faultsched: CPU scheduling under catastrophic failures
//!
//! A discrete-event simulation of a single CPU fed by Poisson arrivals and
//! struck by Poisson catastrophes. Four scheduling policies (FCFS, SJF,
//! round-robin, preemptive priority) are compared on mean waiting time,
//! availability and mean time to recovery.
//!
//! The crate is built bottom-up:
//! - [`runtime`]: virtual clock, suspendable activities with interruption,
//!   and the CPU resource
//! - [`workload`] and [`fault`]: the two stochastic drivers
//! - [`scheduler`]: the policies
//! - [`simulation`]: wiring and the final [`Report`]
//!
//! Activities suspend with [`Sim::after`], which asserts a finite,
//! non-negative delay and panics otherwise. Code handling delays that may be
//! invalid uses [`Sim::try_after`], which returns [`SimError::NegativeDelay`].

#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fault;
pub mod metrics;
pub mod runtime;
pub mod sampler;
pub mod scheduler;
pub mod simulation;
pub mod types;
pub mod workload;
/// Command-line interface and argument parsing
pub mod cli;
/// Command execution
pub mod commands;

// Re-export main types
pub use config::SimConfig;
pub use context::SimContext;
pub use error::{ConfigError, FaultschedError, FaultschedResult, SimError, SimResult};
pub use events::{EventKind, EventSink, MemorySink, SimEvent};
pub use metrics::{Metrics, Report};
pub use runtime::{Cpu, Interrupt, InterruptCause, Sim};
pub use sampler::{Sampler, ScriptedSampler, StochasticSampler};
pub use scheduler::Scheduler;
pub use simulation::{Simulation, SimulationRun};
pub use types::{Pid, PolicyKind, Priority, Process, SimTime};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run `config` to its horizon without an event log
pub fn simulate(config: SimConfig) -> FaultschedResult<Report> {
    Simulation::new(config)?.run()
}
