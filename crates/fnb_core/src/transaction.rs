//! Transactions submitted to the flow router.
//!
//! A [`Transaction`] can only be built from a payload that matches its type
//! and passes validation, so anything the router receives is well-formed.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Kind of business transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "WIRE")]
    Wire,
    #[serde(rename = "ACH")]
    Ach,
    #[serde(rename = "CUSTOMER_360")]
    Customer360,
    #[serde(rename = "ACCOUNT_OPEN")]
    AccountOpen,
    #[serde(rename = "RECONCILIATION_BATCH")]
    ReconciliationBatch,
}

impl TransactionType {
    /// Every transaction type, in declaration order
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Wire,
        TransactionType::Ach,
        TransactionType::Customer360,
        TransactionType::AccountOpen,
        TransactionType::ReconciliationBatch,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Wire => "WIRE",
            TransactionType::Ach => "ACH",
            TransactionType::Customer360 => "CUSTOMER_360",
            TransactionType::AccountOpen => "ACCOUNT_OPEN",
            TransactionType::ReconciliationBatch => "RECONCILIATION_BATCH",
        }
    }

    /// Portal operation name, used for entry span names
    pub fn operation(&self) -> &'static str {
        match self {
            TransactionType::Wire => "submitWireTransfer",
            TransactionType::Ach => "submitAchPayment",
            TransactionType::Customer360 => "getCustomer360",
            TransactionType::AccountOpen => "openAccount",
            TransactionType::ReconciliationBatch => "runReconciliation",
        }
    }

    /// Position within [`TransactionType::ALL`]
    pub fn index(&self) -> usize {
        match self {
            TransactionType::Wire => 0,
            TransactionType::Ach => 1,
            TransactionType::Customer360 => 2,
            TransactionType::AccountOpen => 3,
            TransactionType::ReconciliationBatch => 4,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Wire or ACH payment instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub source_account: String,
    pub destination_account: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_routing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_code: Option<String>,
}

impl PaymentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.source_account.trim().is_empty() {
            return Err(ValidationError::MissingField("sourceAccount"));
        }
        if self.destination_account.trim().is_empty() {
            return Err(ValidationError::MissingField("destinationAccount"));
        }
        if self.source_account == self.destination_account {
            return Err(ValidationError::invalid(
                "destinationAccount",
                "must differ from sourceAccount",
            ));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::invalid(
                "amount",
                format!("must be a positive amount, got {}", self.amount),
            ));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::invalid(
                "currency",
                format!("expected an ISO 4217 code, got {:?}", self.currency),
            ));
        }
        if let Some(country) = &self.destination_country {
            if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
                return Err(ValidationError::invalid(
                    "destinationCountry",
                    format!("expected an ISO 3166 alpha-2 code, got {country:?}"),
                ));
            }
        }
        if let Some(routing) = &self.destination_routing {
            if routing.len() != 9 || !routing.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ValidationError::invalid(
                    "destinationRouting",
                    "expected a 9-digit routing number",
                ));
            }
        }
        Ok(())
    }
}

/// Customer 360 lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLookup {
    pub customer_id: String,
}

/// New account application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOpenRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub account_type: String,
    pub initial_deposit: f64,
    pub branch_code: String,
    #[serde(default = "default_customer_type")]
    pub customer_type: String,
}

fn default_customer_type() -> String {
    "INDIVIDUAL".to_string()
}

impl AccountOpenRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::MissingField("firstName"));
        }
        if self.last_name.trim().is_empty() {
            return Err(ValidationError::MissingField("lastName"));
        }
        if self.date_of_birth >= Utc::now().date_naive() {
            return Err(ValidationError::invalid(
                "dateOfBirth",
                "must be in the past",
            ));
        }
        if !matches!(self.account_type.as_str(), "CHECKING" | "SAVINGS") {
            return Err(ValidationError::invalid(
                "accountType",
                format!("expected CHECKING or SAVINGS, got {:?}", self.account_type),
            ));
        }
        if !self.initial_deposit.is_finite() || self.initial_deposit < 0.0 {
            return Err(ValidationError::invalid(
                "initialDeposit",
                "must be zero or positive",
            ));
        }
        if self.branch_code.trim().is_empty() {
            return Err(ValidationError::MissingField("branchCode"));
        }
        Ok(())
    }
}

/// What started a reconciliation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationTrigger {
    /// The nightly schedule
    Scheduled,
    /// An explicit request
    OnDemand,
}

/// Type-specific transaction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payloadType", content = "data", rename_all = "camelCase")]
pub enum TransactionPayload {
    Payment(PaymentRequest),
    Customer360(CustomerLookup),
    AccountOpen(AccountOpenRequest),
    Reconciliation { trigger: ReconciliationTrigger },
}

impl TransactionPayload {
    /// Whether this payload is acceptable for `kind`
    pub fn matches(&self, kind: TransactionType) -> bool {
        matches!(
            (self, kind),
            (
                TransactionPayload::Payment(_),
                TransactionType::Wire | TransactionType::Ach
            ) | (TransactionPayload::Customer360(_), TransactionType::Customer360)
                | (TransactionPayload::AccountOpen(_), TransactionType::AccountOpen)
                | (
                    TransactionPayload::Reconciliation { .. },
                    TransactionType::ReconciliationBatch
                )
        )
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TransactionPayload::Payment(p) => p.validate(),
            TransactionPayload::Customer360(c) => {
                if c.customer_id.trim().is_empty() {
                    Err(ValidationError::MissingField("customerId"))
                } else {
                    Ok(())
                }
            }
            TransactionPayload::AccountOpen(a) => a.validate(),
            TransactionPayload::Reconciliation { .. } => Ok(()),
        }
    }
}

/// Maximum length accepted for a caller-supplied correlation id.
pub const MAX_CORRELATION_ID_LEN: usize = 128;

/// A unit of simulated business work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: String,
    kind: TransactionType,
    payload: TransactionPayload,
    created_at: DateTime<Utc>,
    seed: u64,
}

impl Transaction {
    /// Build a validated transaction with a fresh correlation id.
    pub fn new(
        kind: TransactionType,
        payload: TransactionPayload,
        seed: u64,
    ) -> Result<Self, ValidationError> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), kind, payload, seed)
    }

    /// Build a validated transaction with a caller-supplied correlation id.
    pub fn with_id(
        id: impl Into<String>,
        kind: TransactionType,
        payload: TransactionPayload,
        seed: u64,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::MissingField("correlationId"));
        }
        if id.len() > MAX_CORRELATION_ID_LEN || id.chars().any(|c| c.is_control()) {
            return Err(ValidationError::invalid(
                "correlationId",
                format!("must be printable and at most {MAX_CORRELATION_ID_LEN} characters"),
            ));
        }
        if !payload.matches(kind) {
            return Err(ValidationError::PayloadMismatch(kind));
        }
        payload.validate()?;

        Ok(Self {
            id,
            kind,
            payload,
            created_at: Utc::now(),
            seed,
        })
    }

    /// Wire transfer
    pub fn wire(payment: PaymentRequest, seed: u64) -> Result<Self, ValidationError> {
        Self::new(TransactionType::Wire, TransactionPayload::Payment(payment), seed)
    }

    /// ACH payment
    pub fn ach(payment: PaymentRequest, seed: u64) -> Result<Self, ValidationError> {
        Self::new(TransactionType::Ach, TransactionPayload::Payment(payment), seed)
    }

    /// Customer 360 lookup
    pub fn customer_360(customer_id: impl Into<String>, seed: u64) -> Result<Self, ValidationError> {
        Self::new(
            TransactionType::Customer360,
            TransactionPayload::Customer360(CustomerLookup {
                customer_id: customer_id.into(),
            }),
            seed,
        )
    }

    /// Account opening
    pub fn account_open(request: AccountOpenRequest, seed: u64) -> Result<Self, ValidationError> {
        Self::new(
            TransactionType::AccountOpen,
            TransactionPayload::AccountOpen(request),
            seed,
        )
    }

    /// Trade reconciliation batch
    pub fn reconciliation(trigger: ReconciliationTrigger, seed: u64) -> Result<Self, ValidationError> {
        Self::new(
            TransactionType::ReconciliationBatch,
            TransactionPayload::Reconciliation { trigger },
            seed,
        )
    }

    /// Correlation id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn payload(&self) -> &TransactionPayload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Seed for every random draw made on behalf of this transaction
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
