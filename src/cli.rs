use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SimConfig;
use crate::error::ConfigResult;
use crate::types::PolicyKind;

/// faultsched - CPU scheduling under catastrophic failures
/// A discrete-event simulator comparing scheduling policies on wait time,
/// availability and recovery time
#[derive(Parser)]
#[command(name = "faultsched")]
#[command(version)]
#[command(about = "Discrete-event simulation of CPU scheduling under catastrophic failures")]
#[command(long_about = "
faultsched simulates a single CPU fed by Poisson arrivals and hit by
Poisson catastrophes, under one of four scheduling policies:
- FCFS (first come, first served)
- SJF (shortest job first)
- RoundRobin (fixed time quantum)
- PreemptivePriority (1 = highest)

Usage examples:
  faultsched run --policy sjf --duration 100000 --seed 7
  faultsched run --config sim.toml --events text
  faultsched compare --duration 100000 --seed 7
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one simulation and print its metrics
    Run {
        #[command(flatten)]
        params: SimParams,

        /// Scheduling policy
        #[arg(short, long, value_enum)]
        policy: Option<PolicyArg>,

        /// Event log output
        #[arg(short, long, value_enum, default_value = "off")]
        events: EventOutput,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Run every policy on the same parameters and seed
    Compare {
        #[command(flatten)]
        params: SimParams,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        params: SimParams,
    },
}

/// Simulation parameters shared by every command
#[derive(Args, Clone, Debug, Default)]
pub struct SimParams {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Mean arrival rate (processes per time unit)
    #[arg(long)]
    pub lambda: Option<f64>,

    /// Service rate
    #[arg(long)]
    pub mu: Option<f64>,

    /// Catastrophe rate
    #[arg(long)]
    pub xi: Option<f64>,

    /// Repair rate
    #[arg(long)]
    pub beta: Option<f64>,

    /// Round-robin time quantum
    #[arg(short, long)]
    pub quantum: Option<f64>,

    /// Simulation horizon in time units
    #[arg(long)]
    pub duration: Option<f64>,

    /// RNG seed for a reproducible run
    #[arg(short, long)]
    pub seed: Option<u64>,
}

impl SimParams {
    /// Defaults, then the config file, then flags
    pub fn resolve(&self) -> ConfigResult<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)?,
            None => SimConfig::default(),
        };
        if let Some(lambda) = self.lambda {
            config.lambda_arrival_rate = lambda;
        }
        if let Some(mu) = self.mu {
            config.mu_service_rate = mu;
        }
        if let Some(xi) = self.xi {
            config.xi_failure_rate = xi;
        }
        if let Some(beta) = self.beta {
            config.beta_repair_rate = beta;
        }
        if let Some(quantum) = self.quantum {
            config.rr_quantum = quantum;
        }
        if let Some(duration) = self.duration {
            config.sim_duration = duration;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

/// Scheduling policy selector
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum PolicyArg {
    /// First come, first served
    Fcfs,
    /// Shortest job first
    Sjf,
    /// Round-robin
    #[value(alias = "round-robin")]
    Rr,
    /// Preemptive priority
    #[value(alias = "preemptive-priority")]
    Priority,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Fcfs => PolicyKind::Fcfs,
            PolicyArg::Sjf => PolicyKind::Sjf,
            PolicyArg::Rr => PolicyKind::RoundRobin,
            PolicyArg::Priority => PolicyKind::PreemptivePriority,
        }
    }
}

/// Where simulation events go
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum EventOutput {
    /// Human-readable lines on stdout
    Text,
    /// JSON lines on stdout
    Json,
    /// No event log
    Off,
}

/// Final report format
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ReportFormat {
    /// Human-readable summary
    Text,
    /// JSON document
    Json,
}

impl std::fmt::Display for EventOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutput::Text => write!(f, "text"),
            EventOutput::Json => write!(f, "json"),
            EventOutput::Off => write!(f, "off"),
        }
    }
}
