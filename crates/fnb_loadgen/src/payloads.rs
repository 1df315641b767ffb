//! Synthetic teller traffic.

use chrono::NaiveDate;
use fnb_core::error::ValidationError;
use fnb_core::rng::SimRng;
use fnb_core::transaction::{
    AccountOpenRequest, PaymentRequest, ReconciliationTrigger, Transaction, TransactionType,
};
use rand::RngCore;

const COUNTRIES: [&str; 6] = ["US", "GB", "DE", "SG", "JP", "CA"];
const PURPOSES: [&str; 4] = ["TRADE", "INVESTMENT", "PERSONAL", "PAYROLL"];
const SEC_CODES: [&str; 3] = ["PPD", "CCD", "CTX"];
const FIRST_NAMES: [&str; 4] = ["James", "Sarah", "Michael", "Emily"];
const LAST_NAMES: [&str; 4] = ["Smith", "Johnson", "Williams", "Brown"];
const ACCOUNT_TYPES: [&str; 2] = ["CHECKING", "SAVINGS"];

/// Generates validated transactions for the bank's customer book.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    accounts: Vec<String>,
    customers: Vec<String>,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::with_book_size(100)
    }
}

impl PayloadGenerator {
    /// Book of `size` accounts `ACC00000001..` and customers `CUST000001..`.
    pub fn with_book_size(size: u32) -> Self {
        let size = size.max(1);
        Self {
            accounts: (1..=size).map(|i| format!("ACC{i:08}")).collect(),
            customers: (1..=size).map(|i| format!("CUST{i:06}")).collect(),
        }
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn customers(&self) -> &[String] {
        &self.customers
    }

    /// A transaction of `kind` with a fresh seed drawn from `rng`.
    pub fn transaction(
        &self,
        kind: TransactionType,
        rng: &mut SimRng,
    ) -> Result<Transaction, ValidationError> {
        match kind {
            TransactionType::Wire => {
                let payment = self.wire(rng);
                Transaction::wire(payment, rng.next_u64())
            }
            TransactionType::Ach => {
                let payment = self.ach(rng);
                Transaction::ach(payment, rng.next_u64())
            }
            TransactionType::Customer360 => {
                let customer = self.pick(&self.customers, rng);
                Transaction::customer_360(customer, rng.next_u64())
            }
            TransactionType::AccountOpen => {
                let request = self.account_open(rng)?;
                Transaction::account_open(request, rng.next_u64())
            }
            TransactionType::ReconciliationBatch => {
                Transaction::reconciliation(ReconciliationTrigger::Scheduled, rng.next_u64())
            }
        }
    }

    pub fn wire(&self, rng: &mut SimRng) -> PaymentRequest {
        PaymentRequest {
            source_account: self.pick(&self.accounts, rng),
            destination_account: format!("EXT{}", rng.int_inclusive(10_000_000, 99_999_999)),
            amount: round2(rng.uniform(1_000.0, 250_000.0)),
            currency: "USD".to_string(),
            destination_country: Some(pick_str(&COUNTRIES, rng)),
            purpose: Some(pick_str(&PURPOSES, rng)),
            destination_routing: None,
            sec_code: None,
        }
    }

    pub fn ach(&self, rng: &mut SimRng) -> PaymentRequest {
        PaymentRequest {
            source_account: self.pick(&self.accounts, rng),
            destination_routing: Some(rng.int_inclusive(100_000_000, 999_999_999).to_string()),
            destination_account: rng.int_inclusive(10_000_000, 99_999_999).to_string(),
            amount: round2(rng.uniform(50.0, 10_000.0)),
            currency: "USD".to_string(),
            sec_code: Some(pick_str(&SEC_CODES, rng)),
            destination_country: None,
            purpose: None,
        }
    }

    pub fn account_open(&self, rng: &mut SimRng) -> Result<AccountOpenRequest, ValidationError> {
        let first_name = pick_str(&FIRST_NAMES, rng);
        let last_name = pick_str(&LAST_NAMES, rng);

        let year = rng.int_inclusive(1950, 2000) as i32;
        let month = rng.int_inclusive(1, 12) as u32;
        let day = rng.int_inclusive(1, 28) as u32;
        let date_of_birth = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ValidationError::invalid("dateOfBirth", "generated an invalid date"))?;

        Ok(AccountOpenRequest {
            first_name,
            last_name,
            date_of_birth,
            account_type: pick_str(&ACCOUNT_TYPES, rng),
            initial_deposit: round2(rng.uniform(500.0, 10_000.0)),
            branch_code: format!("BR{:03}", rng.int_inclusive(1, 50)),
            customer_type: "INDIVIDUAL".to_string(),
        })
    }

    fn pick(&self, items: &[String], rng: &mut SimRng) -> String {
        rng.pick(items).cloned().unwrap_or_default()
    }
}

fn pick_str(items: &[&str], rng: &mut SimRng) -> String {
    rng.pick(items).map(|s| s.to_string()).unwrap_or_default()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
