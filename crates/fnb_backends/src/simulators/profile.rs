//! Customer profile (CRM) simulator. Never faults.

use fnb_core::rng::SimRng;
use fnb_core::span::Attributes;
use tracing::debug;

use crate::call::{BackendCallResult, BackendRequest};
use crate::capability::{Backend, Capability};
use crate::config::ProfileConfig;
use crate::error::BackendError;
use crate::stats::SimulatorStats;

use super::{ensure_owned, server_context};

const SEGMENTS: [&str; 3] = ["PREMIER", "PREFERRED", "STANDARD"];
const CHANNELS: [&str; 5] = ["BRANCH", "PHONE", "ONLINE", "MOBILE", "ATM"];

#[derive(Debug, Default)]
pub struct ProfileSimulator {
    config: ProfileConfig,
    stats: SimulatorStats,
}

impl ProfileSimulator {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config,
            stats: SimulatorStats::default(),
        }
    }

    pub fn config(&self) -> &ProfileConfig {
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
        ensure_owned(Backend::Profile, request.capability)?;
        let context = server_context(request)?;

        let latency = rng.latency(self.config.latency);
        let mut attributes = Attributes::new().with("crm.system", "salesforce");
        let customer_id = request.fields.get_str("customer.id").map(str::to_string);

        match request.capability {
            Capability::ProfileLookup => {
                attributes
                    .set("crm.object", "Account__c")
                    .set("customer.id", customer_id.unwrap_or_default())
                    .set("customer.segment", *rng.pick(&SEGMENTS).unwrap_or(&"STANDARD"))
                    .set(
                        "customer.relationship_manager",
                        format!("RM{:03}", rng.int_inclusive(1, 20)),
                    )
                    .set("customer.since", rng.int_inclusive(1995, 2024));
            }
            Capability::ProfileInteractions => {
                attributes
                    .set("crm.object", "Interaction__c")
                    .set("customer.id", customer_id.unwrap_or_default())
                    .set("interactions.count", rng.int_inclusive(3, 10))
                    .set(
                        "interactions.last_channel",
                        *rng.pick(&CHANNELS).unwrap_or(&"ONLINE"),
                    );
            }
            Capability::ProfileCreate => {
                let new_id = format!("CUST{:06}", rng.int_inclusive(100_000, 999_999));
                attributes
                    .set("crm.object", "Contact__c")
                    .set("customer.id", new_id)
                    .set("customer.segment", "STANDARD");
                if let Some(kind) = request.fields.get_str("customer.type") {
                    attributes.set("customer.type", kind);
                }
            }
            _ => {}
        }

        debug!(
            correlation_id = %request.correlation_id,
            operation = request.capability.operation(),
            duration_ms = latency,
            "CRM query"
        );

        let result = BackendCallResult::ok(&request.step, request.capability, context, latency)
            .with_attributes(attributes);
        self.stats.record(&result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnb_core::trace::TraceContext;

    fn request(capability: Capability) -> BackendRequest {
        BackendRequest::new("crm", capability, "corr", TraceContext::new_root().to_header())
            .with_fields(Attributes::new().with("customer.id", "CUST000042"))
    }

    #[test]
    fn test_lookup_returns_profile() {
        let crm = ProfileSimulator::default();
        let mut rng = SimRng::from_seed(21);
        let result = crm.invoke(&request(Capability::ProfileLookup), &mut rng).unwrap();

        assert!(result.is_ok());
        assert_eq!(result.attributes.get_str("customer.id"), Some("CUST000042"));
        let segment = result.attributes.get_str("customer.segment").unwrap();
        assert!(SEGMENTS.contains(&segment));
        assert!(result
            .attributes
            .get_str("customer.relationship_manager")
            .unwrap()
            .starts_with("RM"));
    }

    #[test]
    fn test_interactions_count_in_range() {
        let crm = ProfileSimulator::default();
        let mut rng = SimRng::from_seed(22);
        for _ in 0..100 {
            let result = crm
                .invoke(&request(Capability::ProfileInteractions), &mut rng)
                .unwrap();
            let count = result.attributes.get_i64("interactions.count").unwrap();
            assert!((3..=10).contains(&count));
            assert!((50..=150).contains(&result.latency_ms));
        }
    }

    #[test]
    fn test_create_assigns_customer_id() {
        let crm = ProfileSimulator::default();
        let mut rng = SimRng::from_seed(23);
        let result = crm.invoke(&request(Capability::ProfileCreate), &mut rng).unwrap();

        let id = result.attributes.get_str("customer.id").unwrap();
        assert!(id.starts_with("CUST"));
        assert_eq!(id.len(), 10);
        assert_eq!(crm.stats().snapshot().calls, 1);
    }
}
