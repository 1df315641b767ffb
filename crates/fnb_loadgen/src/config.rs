//! Load generator configuration.

use fnb_router::BackpressurePolicy;
use serde::Deserialize;

use crate::profile::TrafficProfile;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoadGenConfig {
    pub enabled: bool,
    /// Multiplier on every sampled interval; 0 runs ticks back to back
    pub interval_scale: f64,
    /// Seconds to wait before the first tick
    pub start_delay_secs: u64,
    pub backpressure: BackpressurePolicy,
    pub profile: TrafficProfile,
}

impl Default for LoadGenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_scale: 1.0,
            start_delay_secs: 20,
            backpressure: BackpressurePolicy::Block,
            profile: TrafficProfile::default(),
        }
    }
}

impl LoadGenConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.profile.validate();
        if !self.interval_scale.is_finite() || self.interval_scale < 0.0 {
            errors.push(format!(
                "loadgen.interval_scale: {} must be zero or positive",
                self.interval_scale
            ));
        }
        errors
    }
}
