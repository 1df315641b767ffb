//! Handing generated transactions to the router.

use async_trait::async_trait;
use fnb_core::trace::TraceContext;
use fnb_core::transaction::Transaction;
use fnb_router::{FlowRouter, RouterError};

/// Destination of generated transactions.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Hand over a transaction, waiting for capacity.
    async fn dispatch(&self, transaction: Transaction, entry: TraceContext)
        -> Result<(), RouterError>;

    /// Hand over a transaction only if capacity is free right now. A full
    /// router gives the transaction back.
    fn try_dispatch(&self, transaction: Transaction, entry: TraceContext)
        -> Result<(), Transaction>;
}

#[async_trait]
impl Dispatch for FlowRouter {
    async fn dispatch(
        &self,
        transaction: Transaction,
        entry: TraceContext,
    ) -> Result<(), RouterError> {
        let permit = self.admit().await?;
        // Detached: the router logs and counts the outcome itself.
        drop(self.spawn(permit, transaction, entry));
        Ok(())
    }

    fn try_dispatch(
        &self,
        transaction: Transaction,
        entry: TraceContext,
    ) -> Result<(), Transaction> {
        match self.try_admit() {
            Some(permit) => {
                drop(self.spawn(permit, transaction, entry));
                Ok(())
            }
            None => Err(transaction),
        }
    }
}
