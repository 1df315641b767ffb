//! Router configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a producer does when the router is at its in-flight cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Wait until a slot frees up
    #[default]
    Block,
    /// Drop the work, count it and log it
    Drop,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "drop" | "drop-and-log" => Ok(BackpressurePolicy::Drop),
            other => Err(format!(
                "Invalid backpressure policy: {other}. Must be one of: block, drop"
            )),
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::Block => f.write_str("block"),
            BackpressurePolicy::Drop => f.write_str("drop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum number of transactions executing at once
    pub max_in_flight: usize,
    /// Budget for a single sequential step, in simulated ms
    pub step_timeout_ms: u64,
    /// Budget for each scatter-gather branch, in simulated ms
    pub branch_timeout_ms: u64,
    /// Real seconds slept per simulated second; 0 disables waiting
    pub latency_scale: f64,
    /// Send a rejection notice when a payment is rejected
    pub notify_on_reject: bool,
    /// Number of finished results kept for idempotent retries
    pub result_cache_size: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            step_timeout_ms: 10_000,
            branch_timeout_ms: 5_000,
            latency_scale: 1.0,
            notify_on_reject: true,
            result_cache_size: 1024,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl RouterConfig {
    /// Collect every configuration problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_in_flight == 0 {
            errors.push("router.max_in_flight: must be at least 1".to_string());
        }
        if self.step_timeout_ms == 0 {
            errors.push("router.step_timeout_ms: must be positive".to_string());
        }
        if self.branch_timeout_ms == 0 {
            errors.push("router.branch_timeout_ms: must be positive".to_string());
        }
        if !self.latency_scale.is_finite() || self.latency_scale < 0.0 {
            errors.push(format!(
                "router.latency_scale: {} must be zero or positive",
                self.latency_scale
            ));
        }
        errors
    }
}
