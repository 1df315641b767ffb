//! Flow definitions.
//!
//! A flow is data: an ordered list of steps, each naming a backend
//! capability and how it runs. [`FlowDefinition::plan`] groups consecutive
//! parallel steps into a scatter-gather stage with one branch per branch
//! name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fnb_backends::Capability;
use fnb_core::transaction::TransactionType;

use crate::config::RouterConfig;
use crate::error::RouterError;

pub const PAYMENT_FLOW: &str = "payment-processing-flow";
pub const CUSTOMER_360_FLOW: &str = "customer-360-flow";
pub const ACCOUNT_OPENING_FLOW: &str = "account-opening-kyc-flow";
pub const RECONCILIATION_FLOW: &str = "trade-reconciliation-batch";

/// How a step is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    /// Runs inside the named branch of a scatter-gather
    Parallel { branch: String },
}

/// What happens to a step once the flow has been rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterReject {
    Skip,
    /// Run anyway, invoking this capability instead
    Substitute(Capability),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    pub name: String,
    pub capability: Capability,
    pub mode: ExecutionMode,
    /// Whether a rejection or unrecoverable fault here decides the outcome
    pub blocking: bool,
    pub timeout_ms: u64,
    /// Steps that must have run before this one
    pub depends_on: Vec<String>,
    pub after_reject: AfterReject,
}

impl FlowStep {
    pub fn sequential(name: impl Into<String>, capability: Capability, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            capability,
            mode: ExecutionMode::Sequential,
            blocking: false,
            timeout_ms,
            depends_on: Vec::new(),
            after_reject: AfterReject::Skip,
        }
    }

    pub fn parallel(
        name: impl Into<String>,
        capability: Capability,
        branch: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            mode: ExecutionMode::Parallel {
                branch: branch.into(),
            },
            ..Self::sequential(name, capability, timeout_ms)
        }
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    pub fn on_reject(mut self, after_reject: AfterReject) -> Self {
        self.after_reject = after_reject;
        self
    }

    pub fn branch(&self) -> Option<&str> {
        match &self.mode {
            ExecutionMode::Sequential => None,
            ExecutionMode::Parallel { branch } => Some(branch),
        }
    }
}

/// One branch of a scatter-gather stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<'a> {
    pub name: &'a str,
    pub steps: Vec<&'a FlowStep>,
}

/// Execution stage produced by [`FlowDefinition::plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stage<'a> {
    Step(&'a FlowStep),
    ScatterGather(Vec<Branch<'a>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowDefinition {
    pub name: String,
    pub steps: Vec<FlowStep>,
    /// Budget for each scatter-gather branch, in simulated ms
    pub branch_timeout_ms: u64,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>, branch_timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            branch_timeout_ms,
        }
    }

    pub fn step(mut self, step: FlowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn find(&self, name: &str) -> Option<&FlowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Group the steps into stages.
    pub fn plan(&self) -> Vec<Stage<'_>> {
        let mut stages = Vec::new();
        let mut branches: Vec<Branch<'_>> = Vec::new();

        for step in &self.steps {
            match step.branch() {
                Some(name) => match branches.iter_mut().find(|b| b.name == name) {
                    Some(branch) => branch.steps.push(step),
                    None => branches.push(Branch {
                        name,
                        steps: vec![step],
                    }),
                },
                None => {
                    if !branches.is_empty() {
                        stages.push(Stage::ScatterGather(std::mem::take(&mut branches)));
                    }
                    stages.push(Stage::Step(step));
                }
            }
        }
        if !branches.is_empty() {
            stages.push(Stage::ScatterGather(branches));
        }
        stages
    }

    /// Check step names are unique and dependencies point backwards.
    ///
    /// A parallel step may only depend on steps of its own branch or on
    /// steps that finished before its scatter-gather started.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.steps.is_empty() {
            return Err(RouterError::invalid_flow(&self.name, "flow has no steps"));
        }

        let mut seen: HashMap<&str, Option<&str>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                let Some(dep_branch) = seen.get(dep.as_str()) else {
                    return Err(RouterError::invalid_flow(
                        &self.name,
                        format!("step {} depends on unknown or later step {dep}", step.name),
                    ));
                };
                if let (Some(own), Some(other)) = (step.branch(), *dep_branch) {
                    if own != other {
                        return Err(RouterError::invalid_flow(
                            &self.name,
                            format!(
                                "step {} in branch {own} depends on {dep} in branch {other}",
                                step.name
                            ),
                        ));
                    }
                }
            }
            if seen.insert(step.name.as_str(), step.branch()).is_some() {
                return Err(RouterError::invalid_flow(
                    &self.name,
                    format!("duplicate step name {}", step.name),
                ));
            }
        }
        Ok(())
    }
}

/// The flow for each transaction type.
#[derive(Debug, Clone)]
pub struct FlowCatalog {
    flows: HashMap<TransactionType, Arc<FlowDefinition>>,
}

impl FlowCatalog {
    /// The four standard integration flows.
    pub fn standard(config: &RouterConfig) -> Self {
        let payment = Arc::new(payment_flow(config));
        let mut flows = HashMap::new();
        flows.insert(TransactionType::Wire, payment.clone());
        flows.insert(TransactionType::Ach, payment);
        flows.insert(
            TransactionType::Customer360,
            Arc::new(customer_360_flow(config)),
        );
        flows.insert(
            TransactionType::AccountOpen,
            Arc::new(account_opening_flow(config)),
        );
        flows.insert(
            TransactionType::ReconciliationBatch,
            Arc::new(reconciliation_flow(config)),
        );
        Self { flows }
    }

    pub fn definition(&self, kind: TransactionType) -> Result<Arc<FlowDefinition>, RouterError> {
        self.flows
            .get(&kind)
            .cloned()
            .ok_or(RouterError::UnknownFlow(kind))
    }

    /// Validate every registered flow.
    pub fn validate(&self) -> Result<(), RouterError> {
        let mut checked = HashSet::new();
        for flow in self.flows.values() {
            if checked.insert(flow.name.as_str()) {
                flow.validate()?;
            }
        }
        Ok(())
    }
}

fn payment_flow(config: &RouterConfig) -> FlowDefinition {
    let t = config.step_timeout_ms;
    let notice = if config.notify_on_reject {
        AfterReject::Substitute(Capability::NotifyRejection)
    } else {
        AfterReject::Skip
    };

    FlowDefinition::new(PAYMENT_FLOW, config.branch_timeout_ms)
        .step(FlowStep::sequential("fraud-check", Capability::FraudScore, t).blocking())
        .step(
            FlowStep::sequential("aml-screening", Capability::AmlScreen, t)
                .blocking()
                .after("fraud-check"),
        )
        .step(
            FlowStep::sequential("ledger-debit", Capability::LedgerDebit, t)
                .blocking()
                .after("aml-screening"),
        )
        .step(
            FlowStep::sequential("notification", Capability::NotifyTransaction, t)
                .after("ledger-debit")
                .on_reject(notice),
        )
}

fn customer_360_flow(config: &RouterConfig) -> FlowDefinition {
    let t = config.step_timeout_ms;
    FlowDefinition::new(CUSTOMER_360_FLOW, config.branch_timeout_ms)
        .step(FlowStep::parallel("crm-profile", Capability::ProfileLookup, "crm", t))
        .step(
            FlowStep::parallel("crm-interactions", Capability::ProfileInteractions, "crm", t)
                .after("crm-profile"),
        )
        .step(FlowStep::parallel(
            "core-balance",
            Capability::LedgerBalance,
            "core-banking",
            t,
        ))
        .step(
            FlowStep::parallel(
                "core-transactions",
                Capability::LedgerTransactions,
                "core-banking",
                t,
            )
            .after("core-balance"),
        )
}

fn account_opening_flow(config: &RouterConfig) -> FlowDefinition {
    let t = config.step_timeout_ms;
    FlowDefinition::new(ACCOUNT_OPENING_FLOW, config.branch_timeout_ms)
        .step(FlowStep::sequential("kyc-screening", Capability::KycScreen, t).blocking())
        .step(
            FlowStep::sequential("profile-create", Capability::ProfileCreate, t)
                .after("kyc-screening"),
        )
        .step(
            FlowStep::sequential("ledger-create", Capability::LedgerCreateAccount, t)
                .blocking()
                .after("profile-create"),
        )
        .step(
            FlowStep::sequential("welcome-notification", Capability::NotifyAccountOpened, t)
                .after("ledger-create"),
        )
}

fn reconciliation_flow(config: &RouterConfig) -> FlowDefinition {
    FlowDefinition::new(RECONCILIATION_FLOW, config.branch_timeout_ms).step(
        FlowStep::sequential(
            "trade-positions",
            Capability::LedgerTradePositions,
            config.step_timeout_ms,
        )
        .blocking(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = FlowCatalog::standard(&RouterConfig::default());
        catalog.validate().unwrap();

        for kind in TransactionType::ALL {
            assert!(catalog.definition(kind).is_ok());
        }
        assert_eq!(
            catalog.definition(TransactionType::Ach).unwrap().name,
            PAYMENT_FLOW
        );
    }

    #[test]
    fn test_customer_360_plans_one_scatter_gather() {
        let flow = customer_360_flow(&RouterConfig::default());
        let plan = flow.plan();

        assert_eq!(plan.len(), 1);
        let Stage::ScatterGather(branches) = &plan[0] else {
            panic!("expected scatter-gather");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "crm");
        assert_eq!(branches[1].name, "core-banking");
        assert_eq!(branches[1].steps[1].name, "core-transactions");
    }

    #[test]
    fn test_payment_plans_sequential_chain() {
        let flow = payment_flow(&RouterConfig::default());
        let names: Vec<&str> = flow
            .plan()
            .iter()
            .map(|stage| match stage {
                Stage::Step(step) => step.name.as_str(),
                Stage::ScatterGather(_) => "scatter-gather",
            })
            .collect();
        assert_eq!(
            names,
            ["fraud-check", "aml-screening", "ledger-debit", "notification"]
        );
    }

    #[test]
    fn test_notify_on_reject_switch() {
        let on = payment_flow(&RouterConfig::default());
        assert_eq!(
            on.find("notification").unwrap().after_reject,
            AfterReject::Substitute(Capability::NotifyRejection)
        );

        let off = payment_flow(&RouterConfig {
            notify_on_reject: false,
            ..RouterConfig::default()
        });
        assert_eq!(off.find("notification").unwrap().after_reject, AfterReject::Skip);
    }

    #[test]
    fn test_validate_rejects_forward_and_cross_branch_dependencies() {
        let forward = FlowDefinition::new("f", 100)
            .step(FlowStep::sequential("a", Capability::FraudScore, 100).after("b"))
            .step(FlowStep::sequential("b", Capability::AmlScreen, 100));
        assert!(forward.validate().is_err());

        let cross = FlowDefinition::new("c", 100)
            .step(FlowStep::parallel("a", Capability::ProfileLookup, "x", 100))
            .step(FlowStep::parallel("b", Capability::LedgerBalance, "y", 100).after("a"));
        assert!(cross.validate().is_err());

        let dup = FlowDefinition::new("d", 100)
            .step(FlowStep::sequential("a", Capability::FraudScore, 100))
            .step(FlowStep::sequential("a", Capability::AmlScreen, 100));
        assert!(dup.validate().is_err());
    }

    #[test]
    fn test_sequential_step_splits_parallel_groups() {
        let flow = FlowDefinition::new("mixed", 100)
            .step(FlowStep::parallel("a", Capability::ProfileLookup, "x", 100))
            .step(FlowStep::sequential("b", Capability::FraudScore, 100))
            .step(FlowStep::parallel("c", Capability::LedgerBalance, "x", 100));
        let plan = flow.plan();

        assert_eq!(plan.len(), 3);
        assert!(matches!(plan[1], Stage::Step(s) if s.name == "b"));
    }
}
