//! Registry holding one simulator per backend.

use std::collections::BTreeMap;

use fnb_core::rng::SimRng;
use serde::Serialize;

use crate::call::{BackendCallResult, BackendRequest};
use crate::capability::Backend;
use crate::config::BackendsConfig;
use crate::error::BackendError;
use crate::simulators::{
    BackendSimulator, Channel, FraudSimulator, LedgerSimulator, NotificationSimulator,
    ProfileSimulator, ScreeningSimulator,
};
use crate::stats::{ChannelSnapshot, StatsSnapshot};

/// The five simulators, addressed by [`Backend`].
#[derive(Debug)]
pub struct BackendRegistry {
    ledger: BackendSimulator,
    fraud: BackendSimulator,
    screening: BackendSimulator,
    profile: BackendSimulator,
    notification: BackendSimulator,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(BackendsConfig::default())
    }
}

impl BackendRegistry {
    pub fn new(config: BackendsConfig) -> Self {
        Self {
            ledger: BackendSimulator::Ledger(LedgerSimulator::new(config.ledger)),
            fraud: BackendSimulator::Fraud(FraudSimulator::new(config.fraud)),
            screening: BackendSimulator::Screening(ScreeningSimulator::new(config.screening)),
            profile: BackendSimulator::Profile(ProfileSimulator::new(config.profile)),
            notification: BackendSimulator::Notification(NotificationSimulator::new(
                config.notification,
            )),
        }
    }

    pub fn simulator(&self, backend: Backend) -> &BackendSimulator {
        match backend {
            Backend::Ledger => &self.ledger,
            Backend::Fraud => &self.fraud,
            Backend::Screening => &self.screening,
            Backend::Profile => &self.profile,
            Backend::Notification => &self.notification,
        }
    }

    /// Route a call to the simulator owning its capability.
    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        self.simulator(request.capability.backend())
            .invoke(request, rng)
    }

    /// Counters for every backend.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let backends = Backend::ALL
            .iter()
            .map(|&b| (b, self.simulator(b).stats().snapshot()))
            .collect();

        let channels = match &self.notification {
            BackendSimulator::Notification(n) => [Channel::Sms, Channel::Email]
                .iter()
                .map(|&c| (c, n.channel_stats(c)))
                .collect(),
            _ => BTreeMap::new(),
        };

        RegistrySnapshot { backends, channels }
    }
}

/// Point-in-time counters for all simulators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub backends: BTreeMap<Backend, StatsSnapshot>,
    pub channels: BTreeMap<Channel, ChannelSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use fnb_core::trace::TraceContext;

    #[test]
    fn test_registry_routes_by_capability() {
        let registry = BackendRegistry::default();
        let mut rng = SimRng::from_seed(41);
        let header = TraceContext::new_root().to_header();

        for capability in [
            Capability::LedgerBalance,
            Capability::FraudScore,
            Capability::AmlScreen,
            Capability::ProfileLookup,
            Capability::NotifyTransaction,
        ] {
            let request = BackendRequest::new("step", capability, "corr", header.clone());
            let result = registry.invoke(&request, &mut rng).unwrap();
            assert_eq!(result.capability, capability);
        }

        let snapshot = registry.snapshot();
        for backend in Backend::ALL {
            assert_eq!(snapshot.backends[&backend].calls, 1);
        }
        assert_eq!(snapshot.channels[&Channel::Sms].attempts, 1);
    }

    #[test]
    fn test_malformed_header_is_an_error() {
        let registry = BackendRegistry::default();
        let mut rng = SimRng::from_seed(42);
        let request = BackendRequest::new("step", Capability::FraudScore, "corr", "garbage");

        assert!(matches!(
            registry.invoke(&request, &mut rng),
            Err(BackendError::Propagation(_))
        ));
    }

    #[test]
    fn test_snapshot_serialises() {
        let registry = BackendRegistry::default();
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["backends"]["ledger"]["calls"], 0);
        assert_eq!(json["channels"]["email"]["attempts"], 0);
    }
}
