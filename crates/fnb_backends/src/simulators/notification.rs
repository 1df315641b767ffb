//! Notification gateway simulator.
//!
//! Transaction and rejection notices go out over SMS and email; welcome kits
//! for new accounts use email only. Each channel fails independently.

use std::fmt;

use fnb_core::rng::SimRng;
use fnb_core::span::Attributes;
use serde::Serialize;
use tracing::warn;

use crate::call::{BackendCallResult, BackendRequest, FaultKind};
use crate::capability::{Backend, Capability};
use crate::config::NotificationConfig;
use crate::error::BackendError;
use crate::stats::{ChannelSnapshot, ChannelStats, SimulatorStats};

use super::{ensure_owned, server_context};

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Channel::Sms => "twilio",
            Channel::Email => "sendgrid",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channels used for a notification capability
pub fn channels_for(capability: Capability) -> &'static [Channel] {
    match capability {
        Capability::NotifyAccountOpened => &[Channel::Email],
        _ => &[Channel::Sms, Channel::Email],
    }
}

fn notice_type(capability: Capability) -> &'static str {
    match capability {
        Capability::NotifyRejection => "TRANSACTION_REJECTED",
        Capability::NotifyAccountOpened => "ACCOUNT_OPENED",
        _ => "TRANSACTION_ALERT",
    }
}

#[derive(Debug, Default)]
pub struct NotificationSimulator {
    config: NotificationConfig,
    stats: SimulatorStats,
    sms: ChannelStats,
    email: ChannelStats,
}

impl NotificationSimulator {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    /// Attempt and failure counts for one channel
    pub fn channel_stats(&self, channel: Channel) -> ChannelSnapshot {
        match channel {
            Channel::Sms => self.sms.snapshot(),
            Channel::Email => self.email.snapshot(),
        }
    }

    fn failure_rate(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Sms => self.config.sms_failure_rate,
            Channel::Email => self.config.email_failure_rate,
        }
    }

    fn channel_counter(&self, channel: Channel) -> &ChannelStats {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Email => &self.email,
        }
    }

    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        ensure_owned(Backend::Notification, request.capability)?;
        let context = server_context(request)?;

        let latency = rng.latency(self.config.latency);
        let channels = channels_for(request.capability);
        let names: Vec<&str> = channels.iter().map(Channel::as_str).collect();

        let mut attributes = Attributes::new()
            .with("notification.type", notice_type(request.capability))
            .with("notification.channel", names.join(","));

        let mut failed = Vec::new();
        for &channel in channels {
            let delivered = !rng.bernoulli(self.failure_rate(channel));
            self.channel_counter(channel).record(delivered);
            attributes
                .set(format!("notification.{channel}.delivered"), delivered)
                .set(format!("notification.{channel}.provider"), channel.provider());
            if !delivered {
                failed.push(channel.as_str());
            }
        }
        attributes.set("notification.delivered", failed.is_empty());

        let mut result = BackendCallResult::ok(&request.step, request.capability, context, latency);
        if !failed.is_empty() {
            let failed = failed.join(",");
            warn!(
                correlation_id = %request.correlation_id,
                channels = %failed,
                "Notification delivery failed"
            );
            attributes.set("notification.failed_channels", failed);
            result = result.with_fault(FaultKind::DeliveryFailure);
        }

        let result = result.with_attributes(attributes);
        self.stats.record(&result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnb_core::trace::TraceContext;

    fn request(capability: Capability) -> BackendRequest {
        BackendRequest::new("notify", capability, "corr", TraceContext::new_root().to_header())
    }

    #[test]
    fn test_successful_delivery() {
        let notify = NotificationSimulator::new(NotificationConfig {
            sms_failure_rate: 0.0,
            email_failure_rate: 0.0,
            ..NotificationConfig::default()
        });
        let mut rng = SimRng::from_seed(31);
        let result = notify
            .invoke(&request(Capability::NotifyTransaction), &mut rng)
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(result.attributes.get_str("notification.channel"), Some("sms,email"));
        assert_eq!(result.attributes.get_bool("notification.delivered"), Some(true));
        assert_eq!(result.attributes.get_bool("notification.sms.delivered"), Some(true));
        assert!((20..=60).contains(&result.latency_ms));
    }

    #[test]
    fn test_sms_failure_is_delivery_fault() {
        let notify = NotificationSimulator::new(NotificationConfig {
            sms_failure_rate: 1.0,
            email_failure_rate: 0.0,
            ..NotificationConfig::default()
        });
        let mut rng = SimRng::from_seed(32);
        let result = notify
            .invoke(&request(Capability::NotifyRejection), &mut rng)
            .unwrap();

        assert_eq!(result.fault, Some(FaultKind::DeliveryFailure));
        assert_eq!(result.attributes.get_bool("notification.delivered"), Some(false));
        assert_eq!(result.attributes.get_bool("notification.email.delivered"), Some(true));
        assert_eq!(
            result.attributes.get_str("notification.type"),
            Some("TRANSACTION_REJECTED")
        );
        assert_eq!(notify.channel_stats(Channel::Sms).failures, 1);
        assert_eq!(notify.channel_stats(Channel::Email).failures, 0);
    }

    #[test]
    fn test_welcome_kit_uses_email_only() {
        let notify = NotificationSimulator::default();
        let mut rng = SimRng::from_seed(33);
        let result = notify
            .invoke(&request(Capability::NotifyAccountOpened), &mut rng)
            .unwrap();

        assert_eq!(result.attributes.get_str("notification.channel"), Some("email"));
        assert!(!result.attributes.contains("notification.sms.delivered"));
        assert_eq!(notify.channel_stats(Channel::Sms).attempts, 0);
        assert_eq!(notify.channel_stats(Channel::Email).attempts, 1);
    }
}
