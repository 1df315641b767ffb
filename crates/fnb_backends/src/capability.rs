//! Backend systems and the operations they expose.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the five simulated systems of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Ledger,
    Fraud,
    Screening,
    Profile,
    Notification,
}

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::Ledger,
        Backend::Fraud,
        Backend::Screening,
        Backend::Profile,
        Backend::Notification,
    ];

    /// Service name used in span names
    pub fn service_name(&self) -> &'static str {
        match self {
            Backend::Ledger => "core-banking",
            Backend::Fraud => "fraud-detection",
            Backend::Screening => "aml-screening",
            Backend::Profile => "customer-profile",
            Backend::Notification => "notification",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// A single backend operation.
///
/// Each capability is owned by exactly one [`Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    LedgerBalance,
    LedgerDebit,
    LedgerTransactions,
    LedgerCreateAccount,
    LedgerTradePositions,
    FraudScore,
    AmlScreen,
    KycScreen,
    ProfileLookup,
    ProfileInteractions,
    ProfileCreate,
    NotifyTransaction,
    NotifyRejection,
    NotifyAccountOpened,
}

impl Capability {
    /// Owning backend
    pub fn backend(&self) -> Backend {
        match self {
            Capability::LedgerBalance
            | Capability::LedgerDebit
            | Capability::LedgerTransactions
            | Capability::LedgerCreateAccount
            | Capability::LedgerTradePositions => Backend::Ledger,
            Capability::FraudScore => Backend::Fraud,
            Capability::AmlScreen | Capability::KycScreen => Backend::Screening,
            Capability::ProfileLookup
            | Capability::ProfileInteractions
            | Capability::ProfileCreate => Backend::Profile,
            Capability::NotifyTransaction
            | Capability::NotifyRejection
            | Capability::NotifyAccountOpened => Backend::Notification,
        }
    }

    /// Operation name on the owning backend
    pub fn operation(&self) -> &'static str {
        match self {
            Capability::LedgerBalance => "getBalance",
            Capability::LedgerDebit => "debitAccount",
            Capability::LedgerTransactions => "getTransactions",
            Capability::LedgerCreateAccount => "createAccount",
            Capability::LedgerTradePositions => "getTradePositions",
            Capability::FraudScore => "scoreTransaction",
            Capability::AmlScreen => "screenTransaction",
            Capability::KycScreen => "screenKyc",
            Capability::ProfileLookup => "getProfile",
            Capability::ProfileInteractions => "getInteractions",
            Capability::ProfileCreate => "createCustomer",
            Capability::NotifyTransaction => "sendTransactionNotice",
            Capability::NotifyRejection => "sendRejectionNotice",
            Capability::NotifyAccountOpened => "sendWelcomeKit",
        }
    }

    /// Name of the server-side span, e.g. `core-banking.debitAccount`
    pub fn span_name(&self) -> String {
        format!("{}.{}", self.backend().service_name(), self.operation())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend().service_name(), self.operation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_ownership() {
        assert_eq!(Capability::LedgerDebit.backend(), Backend::Ledger);
        assert_eq!(Capability::KycScreen.backend(), Backend::Screening);
        assert_eq!(Capability::NotifyRejection.backend(), Backend::Notification);
        assert_eq!(Capability::ProfileCreate.backend(), Backend::Profile);
    }

    #[test]
    fn test_span_names() {
        assert_eq!(Capability::LedgerDebit.span_name(), "core-banking.debitAccount");
        assert_eq!(Capability::FraudScore.span_name(), "fraud-detection.scoreTransaction");
        assert_eq!(Capability::AmlScreen.to_string(), "aml-screening/screenTransaction");
    }

    #[test]
    fn test_capability_serialises_kebab_case() {
        let json = serde_json::to_string(&Capability::LedgerTradePositions).unwrap();
        assert_eq!(json, "\"ledger-trade-positions\"");
    }
}
