//! Random draws for the workload and fault streams
//!
//! Every stochastic quantity in a run comes from one [`Sampler`]. The
//! production sampler draws exponentials by inverse CDF from a seedable
//! [`StdRng`]; [`ScriptedSampler`] replays fixed values so scenarios can be
//! pinned down exactly.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;
use crate::types::{Priority, SimTime};

/// Source of every random quantity in a simulation
pub trait Sampler {
    /// Gap until the next arrival; infinite when arrivals are disabled
    fn inter_arrival(&mut self) -> SimTime;

    /// CPU time a new process needs
    fn service_demand(&mut self) -> SimTime;

    /// Priority of a new process
    fn priority(&mut self) -> Priority;

    /// Time until the next catastrophe; infinite when failures are disabled
    fn time_to_failure(&mut self) -> SimTime;

    /// Length of one repair
    fn repair_duration(&mut self) -> SimTime;
}

/// Sampler shared by the workload generator and the fault injector
pub type SharedSampler = Rc<RefCell<dyn Sampler>>;

/// Exponential gaps with Poisson rates, uniform priorities
#[derive(Debug, Clone)]
pub struct StochasticSampler {
    rng: StdRng,
    arrival_rate: f64,
    service_rate: f64,
    failure_rate: f64,
    repair_rate: f64,
}

impl StochasticSampler {
    /// Build a sampler from explicit rates; `None` seeds from system entropy
    pub fn new(
        arrival_rate: f64,
        service_rate: f64,
        failure_rate: f64,
        repair_rate: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        StochasticSampler {
            rng,
            arrival_rate,
            service_rate,
            failure_rate,
            repair_rate,
        }
    }

    /// Build a sampler from the rates and seed of a configuration
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.lambda_arrival_rate,
            config.mu_service_rate,
            config.xi_failure_rate,
            config.beta_repair_rate,
            config.seed,
        )
    }

    /// Exponential draw with the given rate. A zero rate never fires.
    fn exponential(&mut self, rate: f64) -> SimTime {
        if rate <= 0.0 {
            return SimTime::INFINITY;
        }
        // u in [0, 1) keeps 1 - u in (0, 1], so the log stays finite
        let u: f64 = self.rng.gen();
        -(1.0 - u).ln() / rate
    }
}

impl Sampler for StochasticSampler {
    fn inter_arrival(&mut self) -> SimTime {
        self.exponential(self.arrival_rate)
    }

    fn service_demand(&mut self) -> SimTime {
        self.exponential(self.service_rate)
    }

    fn priority(&mut self) -> Priority {
        let level = self
            .rng
            .gen_range(Priority::HIGHEST.level()..=Priority::LOWEST.level());
        Priority::new(level).unwrap_or(Priority::LOWEST)
    }

    fn time_to_failure(&mut self) -> SimTime {
        self.exponential(self.failure_rate)
    }

    fn repair_duration(&mut self) -> SimTime {
        self.exponential(self.repair_rate)
    }
}

/// Replays pre-recorded draws.
///
/// Exhausted arrival and failure scripts end their streams (infinite gaps).
/// Exhausted demand, priority and repair scripts fall back to `1.0`,
/// [`Priority::LOWEST`] and `1.0`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    arrivals: VecDeque<SimTime>,
    demands: VecDeque<SimTime>,
    priorities: VecDeque<Priority>,
    failures: VecDeque<SimTime>,
    repairs: VecDeque<SimTime>,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inter-arrival gaps, in order
    pub fn arrivals(mut self, gaps: impl IntoIterator<Item = SimTime>) -> Self {
        self.arrivals.extend(gaps);
        self
    }

    /// Service demands, in arrival order
    pub fn demands(mut self, demands: impl IntoIterator<Item = SimTime>) -> Self {
        self.demands.extend(demands);
        self
    }

    /// Priorities, in arrival order
    pub fn priorities(mut self, priorities: impl IntoIterator<Item = Priority>) -> Self {
        self.priorities.extend(priorities);
        self
    }

    /// Times to failure, each measured from the previous restoration
    pub fn failures(mut self, gaps: impl IntoIterator<Item = SimTime>) -> Self {
        self.failures.extend(gaps);
        self
    }

    /// Repair durations, in failure order
    pub fn repairs(mut self, durations: impl IntoIterator<Item = SimTime>) -> Self {
        self.repairs.extend(durations);
        self
    }
}

impl Sampler for ScriptedSampler {
    fn inter_arrival(&mut self) -> SimTime {
        self.arrivals.pop_front().unwrap_or(SimTime::INFINITY)
    }

    fn service_demand(&mut self) -> SimTime {
        self.demands.pop_front().unwrap_or(1.0)
    }

    fn priority(&mut self) -> Priority {
        self.priorities.pop_front().unwrap_or(Priority::LOWEST)
    }

    fn time_to_failure(&mut self) -> SimTime {
        self.failures.pop_front().unwrap_or(SimTime::INFINITY)
    }

    fn repair_duration(&mut self) -> SimTime {
        self.repairs.pop_front().unwrap_or(1.0)
    }
}
