//! Simulation configuration
//!
//! Defaults < TOML file < command-line overrides. Every run validates its
//! configuration before the first event is scheduled.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::scheduler::PollIntervals;
use crate::types::{PolicyKind, SimTime};

/// Parameters of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Mean process arrivals per time unit; 0 disables arrivals
    pub lambda_arrival_rate: f64,
    /// Rate of the exponential service demand
    pub mu_service_rate: f64,
    /// Mean catastrophes per time unit; 0 disables failures
    pub xi_failure_rate: f64,
    /// Rate of the exponential repair duration
    pub beta_repair_rate: f64,
    /// Round-robin time slice
    pub rr_quantum: SimTime,
    /// Simulation horizon
    pub sim_duration: SimTime,
    /// Scheduling policy
    pub policy: PolicyKind,
    /// RNG seed; `None` draws one from system entropy
    pub seed: Option<u64>,
    /// Re-check interval while the system is down
    pub poll_interval: SimTime,
    /// Round-robin re-check interval while the ready queue is empty
    pub rr_idle_poll: SimTime,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            lambda_arrival_rate: 0.8,
            mu_service_rate: 1.0,
            xi_failure_rate: 0.05,
            beta_repair_rate: 0.2,
            rr_quantum: 0.3,
            sim_duration: 10_000_000.0,
            policy: PolicyKind::RoundRobin,
            seed: None,
            poll_interval: 0.1,
            rr_idle_poll: 0.01,
        }
    }
}

impl SimConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject parameters no run can use
    pub fn validate(&self) -> ConfigResult<()> {
        let finite = [
            ("lambda_arrival_rate", self.lambda_arrival_rate),
            ("mu_service_rate", self.mu_service_rate),
            ("xi_failure_rate", self.xi_failure_rate),
            ("beta_repair_rate", self.beta_repair_rate),
            ("rr_quantum", self.rr_quantum),
            ("sim_duration", self.sim_duration),
            ("poll_interval", self.poll_interval),
            ("rr_idle_poll", self.rr_idle_poll),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }

        for (name, value) in [
            ("mu_service_rate", self.mu_service_rate),
            ("beta_repair_rate", self.beta_repair_rate),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveRate { name, value });
            }
        }

        for (name, value) in [
            ("lambda_arrival_rate", self.lambda_arrival_rate),
            ("xi_failure_rate", self.xi_failure_rate),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeRate { name, value });
            }
        }

        for (name, value) in [
            ("rr_quantum", self.rr_quantum),
            ("sim_duration", self.sim_duration),
            ("poll_interval", self.poll_interval),
            ("rr_idle_poll", self.rr_idle_poll),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveDuration { name, value });
            }
        }
        Ok(())
    }

    pub fn poll_intervals(&self) -> PollIntervals {
        PollIntervals {
            down: self.poll_interval,
            idle: self.rr_idle_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert_eq!(config.sim_duration, 10_000_000.0);
    }

    #[test]
    fn test_rate_rules() {
        let mut config = SimConfig::default();
        config.lambda_arrival_rate = 0.0;
        config.xi_failure_rate = 0.0;
        assert!(config.validate().is_ok());

        config.mu_service_rate = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveRate { name: "mu_service_rate", value: 0.0 })
        );

        let mut config = SimConfig::default();
        config.xi_failure_rate = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeRate { name: "xi_failure_rate", .. })
        ));

        let mut config = SimConfig::default();
        config.sim_duration = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveDuration { name: "sim_duration", .. })
        ));

        let mut config = SimConfig::default();
        config.beta_repair_rate = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::NotFinite { .. })));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            policy = "SJF"
            lambda_arrival_rate = 0.5
            seed = 11
            "#,
        )
        .unwrap();
        assert_eq!(config.policy, PolicyKind::Sjf);
        assert_eq!(config.lambda_arrival_rate, 0.5);
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.rr_quantum, 0.3);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            SimConfig::from_toml_str("policy = \"lottery\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "policy = \"PreemptivePriority\"\nsim_duration = 500.0").unwrap();
        let config = SimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.policy, PolicyKind::PreemptivePriority);
        assert_eq!(config.sim_duration, 500.0);

        assert!(matches!(
            SimConfig::from_file("/nonexistent/faultsched.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
