//! Fraud scoring simulator.
//!
//! Scores are drawn uniformly from [0, 100). With the default threshold of
//! 95 about one call in twenty is flagged high risk, and a flagged call is a
//! business rejection.

use fnb_core::rng::SimRng;
use fnb_core::span::Attributes;
use tracing::warn;

use crate::call::{BackendCallResult, BackendRequest};
use crate::capability::Backend;
use crate::config::FraudConfig;
use crate::error::BackendError;
use crate::stats::SimulatorStats;

use super::{ensure_owned, server_context};

/// Model version reported on every score
pub const MODEL_VERSION: &str = "falcon-v3.1";

/// Destination countries that raise a `fraud.high_risk_country` flag
pub const HIGH_RISK_COUNTRIES: [&str; 6] = ["IR", "KP", "SY", "CU", "VE", "MM"];

/// Risk band of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// HIGH is reserved for flagged scores, so it always means "blocked".
    pub fn from_score(score: f64, flag_threshold: f64) -> Self {
        if score >= flag_threshold {
            RiskLevel::High
        } else if score >= 30.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "APPROVE",
            RiskLevel::Medium => "REVIEW",
            RiskLevel::High => "BLOCK",
        }
    }
}

#[derive(Debug, Default)]
pub struct FraudSimulator {
    config: FraudConfig,
    stats: SimulatorStats,
}

impl FraudSimulator {
    pub fn new(config: FraudConfig) -> Self {
        Self {
            config,
            stats: SimulatorStats::default(),
        }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        ensure_owned(Backend::Fraud, request.capability)?;
        let context = server_context(request)?;

        let latency = rng.latency(self.config.latency);
        let score = match self.config.forced_score {
            Some(score) => score,
            None => (rng.uniform(0.0, 100.0) * 100.0).floor() / 100.0,
        };
        let flagged = score >= self.config.flag_threshold;
        let risk = RiskLevel::from_score(score, self.config.flag_threshold);

        let mut attributes = Attributes::new()
            .with("fraud.score", score)
            .with("fraud.flagged", flagged)
            .with("fraud.risk_level", risk.as_str())
            .with("fraud.recommendation", risk.recommendation())
            .with("fraud.model", MODEL_VERSION);

        if let Some(country) = request.fields.get_str("destination.country") {
            attributes.set("fraud.high_risk_country", HIGH_RISK_COUNTRIES.contains(&country));
        }

        let mut result = BackendCallResult::ok(&request.step, request.capability, context, latency)
            .with_attributes(attributes);
        if flagged {
            warn!(
                correlation_id = %request.correlation_id,
                score,
                threshold = self.config.flag_threshold,
                "High fraud risk, transaction blocked"
            );
            result = result.rejected();
        }

        self.stats.record(&result);
        Ok(result)
    }
}
