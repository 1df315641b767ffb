//! Time-of-day traffic profile.
//!
//! Windows are half-open hour ranges `[start_hour, end_hour)` of local
//! wall-clock time. An hour no window covers uses the fallback window.

use std::time::Duration;

use fnb_core::rng::SimRng;
use fnb_core::transaction::TransactionType;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

/// Range of seconds between two requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl IntervalRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample(&self, rng: &mut SimRng) -> Duration {
        let secs = rng.uniform(self.min_secs, self.max_secs);
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn check(&self, name: &str) -> Option<String> {
        if !self.min_secs.is_finite() || !self.max_secs.is_finite() || self.min_secs < 0.0 {
            return Some(format!("{name}: interval bounds must be finite and non-negative"));
        }
        if self.min_secs > self.max_secs {
            return Some(format!(
                "{name}: min_secs {} exceeds max_secs {}",
                self.min_secs, self.max_secs
            ));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficWindow {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
    pub interval: IntervalRange,
    /// Hours inside the window that use `burst_interval`
    #[serde(default)]
    pub burst_hours: Vec<u32>,
    #[serde(default)]
    pub burst_interval: Option<IntervalRange>,
    #[serde(default)]
    pub allow_account_opening: bool,
}

impl TrafficWindow {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..self.end_hour).contains(&hour)
    }

    /// Interval range in effect at `hour`
    pub fn interval_at(&self, hour: u32) -> IntervalRange {
        match self.burst_interval {
            Some(burst) if self.burst_hours.contains(&hour) => burst,
            _ => self.interval,
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        let name = format!("loadgen.profile.{}", self.name);
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            errors.push(format!(
                "{name}: hours [{}, {}) must satisfy start < end <= 24",
                self.start_hour, self.end_hour
            ));
        }
        errors.extend(self.interval.check(&name));
        if let Some(burst) = &self.burst_interval {
            errors.extend(burst.check(&format!("{name}.burst")));
        }
        for hour in &self.burst_hours {
            if !self.contains(*hour) {
                errors.push(format!("{name}: burst hour {hour} lies outside the window"));
            }
        }
    }
}

/// Relative weights of the sampled transaction types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationMix {
    pub wire: f64,
    pub ach: f64,
    pub customer_360: f64,
    pub account_open: f64,
}

impl Default for OperationMix {
    fn default() -> Self {
        Self {
            wire: 0.35,
            ach: 0.30,
            customer_360: 0.25,
            account_open: 0.10,
        }
    }
}

impl OperationMix {
    /// Weighted choices, without account opening when it is not allowed
    pub fn choices(&self, allow_account_opening: bool) -> Vec<(TransactionType, f64)> {
        let mut choices = vec![
            (TransactionType::Wire, self.wire),
            (TransactionType::Ach, self.ach),
            (TransactionType::Customer360, self.customer_360),
        ];
        if allow_account_opening {
            choices.push((TransactionType::AccountOpen, self.account_open));
        }
        choices
    }

    /// Draw a transaction type. Weights are renormalised over the allowed
    /// types; if none has weight, wires are sent.
    pub fn sample(&self, allow_account_opening: bool, rng: &mut SimRng) -> TransactionType {
        let choices = self.choices(allow_account_opening);
        match WeightedIndex::new(choices.iter().map(|(_, w)| *w)) {
            Ok(dist) => choices[dist.sample(rng)].0,
            Err(_) => TransactionType::Wire,
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        let weights = [self.wire, self.ach, self.customer_360, self.account_open];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            errors.push("loadgen.profile.mix: weights must be finite and non-negative".to_string());
        } else if weights[..3].iter().sum::<f64>() <= 0.0 {
            errors.push(
                "loadgen.profile.mix: wire, ach and customer_360 cannot all be zero".to_string(),
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficProfile {
    pub windows: Vec<TrafficWindow>,
    pub fallback: TrafficWindow,
    pub mix: OperationMix,
    /// Hour during which the nightly reconciliation batch is triggered
    pub reconciliation_hour: Option<u32>,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            windows: vec![
                TrafficWindow {
                    name: "overnight".to_string(),
                    start_hour: 0,
                    end_hour: 8,
                    interval: IntervalRange::new(15.0, 30.0),
                    burst_hours: Vec::new(),
                    burst_interval: None,
                    allow_account_opening: false,
                },
                TrafficWindow {
                    name: "business".to_string(),
                    start_hour: 9,
                    end_hour: 17,
                    interval: IntervalRange::new(1.0, 3.0),
                    burst_hours: vec![9, 16],
                    burst_interval: Some(IntervalRange::new(0.3, 0.8)),
                    allow_account_opening: true,
                },
                TrafficWindow {
                    name: "evening".to_string(),
                    start_hour: 17,
                    end_hour: 24,
                    interval: IntervalRange::new(5.0, 12.0),
                    burst_hours: Vec::new(),
                    burst_interval: None,
                    allow_account_opening: false,
                },
            ],
            fallback: TrafficWindow {
                name: "fallback".to_string(),
                start_hour: 0,
                end_hour: 24,
                interval: IntervalRange::new(5.0, 12.0),
                burst_hours: Vec::new(),
                burst_interval: None,
                allow_account_opening: false,
            },
            mix: OperationMix::default(),
            reconciliation_hour: Some(2),
        }
    }
}

impl TrafficProfile {
    /// Window in effect at `hour`
    pub fn window_for(&self, hour: u32) -> &TrafficWindow {
        self.windows
            .iter()
            .find(|w| w.contains(hour))
            .unwrap_or(&self.fallback)
    }

    /// Wait before the next request
    pub fn sample_interval(&self, hour: u32, rng: &mut SimRng) -> Duration {
        self.window_for(hour).interval_at(hour).sample(rng)
    }

    /// Type of the next request
    pub fn sample_type(&self, hour: u32, rng: &mut SimRng) -> TransactionType {
        let window = self.window_for(hour);
        self.mix.sample(window.allow_account_opening, rng)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for window in &self.windows {
            window.validate(&mut errors);
        }
        errors.extend(self.fallback.interval.check("loadgen.profile.fallback"));
        self.mix.validate(&mut errors);
        if let Some(hour) = self.reconciliation_hour {
            if hour >= 24 {
                errors.push(format!(
                    "loadgen.profile.reconciliation_hour: {hour} is not an hour of the day"
                ));
            }
        }
        errors
    }
}
