//! Simulator configuration.
//!
//! Every rate and latency range can be overridden from the TOML file; any
//! field left out keeps its default.

use fnb_core::rng::{check_rate, LatencyRange};
use serde::Deserialize;

/// Core banking ledger
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub latency: LatencyRange,
    /// Probability that a call hits table lock contention
    pub slow_query_rate: f64,
    pub slow_latency: LatencyRange,
    /// Threshold reported on slow query spans
    pub slow_query_threshold_ms: u64,
    /// Probability that the ledger refuses the call outright
    pub unavailable_rate: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(150, 200),
            slow_query_rate: 0.10,
            slow_latency: LatencyRange::new(4000, 5500),
            slow_query_threshold_ms: 1000,
            unavailable_rate: 0.0,
        }
    }
}

/// Fraud scoring model
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub latency: LatencyRange,
    /// Scores at or above this value are flagged high risk
    pub flag_threshold: f64,
    /// Fixed score for demo scenarios; sampling is skipped when set
    pub forced_score: Option<f64>,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(40, 120),
            flag_threshold: 95.0,
            forced_score: None,
        }
    }
}

/// AML and KYC screening
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub latency: LatencyRange,
    /// Probability of a partial match against one of the watchlists
    pub hit_rate: f64,
    pub watchlists: Vec<String>,
    /// Matches on lists with this prefix are hard hits
    pub hard_hit_prefix: String,
    /// KYC only: probability of a politically exposed person match
    pub pep_rate: f64,
    /// KYC only: probability of adverse media coverage
    pub adverse_media_rate: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(60, 180),
            hit_rate: 0.02,
            watchlists: vec![
                "OFAC-SDN".to_string(),
                "OFAC-SSI".to_string(),
                "EU-SANCTIONS".to_string(),
                "UN-CONSOLIDATED".to_string(),
                "PEP-DATABASE".to_string(),
            ],
            hard_hit_prefix: "OFAC".to_string(),
            pep_rate: 0.01,
            adverse_media_rate: 0.03,
        }
    }
}

/// Customer profile (CRM)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub latency: LatencyRange,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(50, 150),
        }
    }
}

/// Notification gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub latency: LatencyRange,
    pub sms_failure_rate: f64,
    pub email_failure_rate: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(20, 60),
            sms_failure_rate: 0.02,
            email_failure_rate: 0.02,
        }
    }
}

/// Configuration for all five simulators.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub ledger: LedgerConfig,
    pub fraud: FraudConfig,
    pub screening: ScreeningConfig,
    pub profile: ProfileConfig,
    pub notification: NotificationConfig,
}

impl BackendsConfig {
    /// Collect every configuration problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = [
            self.ledger.latency.check("backends.ledger.latency"),
            self.ledger.slow_latency.check("backends.ledger.slow_latency"),
            check_rate("backends.ledger.slow_query_rate", self.ledger.slow_query_rate),
            check_rate("backends.ledger.unavailable_rate", self.ledger.unavailable_rate),
            self.fraud.latency.check("backends.fraud.latency"),
            self.screening.latency.check("backends.screening.latency"),
            check_rate("backends.screening.hit_rate", self.screening.hit_rate),
            check_rate("backends.screening.pep_rate", self.screening.pep_rate),
            check_rate(
                "backends.screening.adverse_media_rate",
                self.screening.adverse_media_rate,
            ),
            self.profile.latency.check("backends.profile.latency"),
            self.notification.latency.check("backends.notification.latency"),
            check_rate(
                "backends.notification.sms_failure_rate",
                self.notification.sms_failure_rate,
            ),
            check_rate(
                "backends.notification.email_failure_rate",
                self.notification.email_failure_rate,
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        if !(0.0..=100.0).contains(&self.fraud.flag_threshold) {
            errors.push(format!(
                "backends.fraud.flag_threshold: {} must be within [0, 100]",
                self.fraud.flag_threshold
            ));
        }
        if let Some(score) = self.fraud.forced_score {
            if !(0.0..=100.0).contains(&score) {
                errors.push(format!(
                    "backends.fraud.forced_score: {score} must be within [0, 100]"
                ));
            }
        }
        if self.screening.watchlists.is_empty() {
            errors.push("backends.screening.watchlists: at least one watchlist is required".to_string());
        }

        errors
    }
}
