//! Transaction inflow for server requests.
//!
//! A request that carries a transaction id must import ("inflow") that
//! transaction from a coordinator before the component runs. Inflow is
//! side-effecting, so each request may perform it at most once.

use relay_core::{RelayError, Result, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// State of an inflowed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
}

/// A transaction imported into the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    status: TransactionStatus,
}

impl Transaction {
    pub fn new(id: TransactionId, status: TransactionStatus) -> Self {
        Self { id, status }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }
}

/// Imports transactions by id.
pub trait TransactionCoordinator: Send + Sync {
    fn inflow(&self, id: TransactionId) -> Result<Transaction>;
}

/// In-memory coordinator that only knows transactions begun through it.
#[derive(Debug, Default)]
pub struct LocalTransactionCoordinator {
    transactions: Mutex<HashMap<TransactionId, TransactionStatus>>,
}

impl LocalTransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> TransactionId {
        let id = TransactionId::random();
        self.lock().insert(id, TransactionStatus::Active);
        id
    }

    /// Returns false for unknown transactions.
    pub fn set_status(&self, id: TransactionId, status: TransactionStatus) -> bool {
        match self.lock().get_mut(&id) {
            Some(current) => {
                *current = status;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TransactionId, TransactionStatus>> {
        self.transactions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransactionCoordinator for LocalTransactionCoordinator {
    fn inflow(&self, id: TransactionId) -> Result<Transaction> {
        let status = self.lock().get(&id).copied();
        match status {
            Some(status @ (TransactionStatus::Active | TransactionStatus::MarkedRollback)) => {
                Ok(Transaction::new(id, status))
            }
            Some(status) => Err(RelayError::TransactionInflow {
                message: format!("Transaction {} is no longer active ({:?})", id, status),
            }),
            None => Err(RelayError::TransactionInflow {
                message: format!("Unknown transaction {}", id),
            }),
        }
    }
}

/// One-shot transaction inflow for a single request.
pub struct InflowGuard {
    transaction: Option<TransactionId>,
    coordinator: Arc<dyn TransactionCoordinator>,
    inflowed: AtomicBool,
}

impl InflowGuard {
    pub fn new(transaction: Option<TransactionId>, coordinator: Arc<dyn TransactionCoordinator>) -> Self {
        Self {
            transaction,
            coordinator,
            inflowed: AtomicBool::new(false),
        }
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Inflow the request's transaction.
    ///
    /// A second call fails with [`RelayError::TransactionAlreadyInflowed`];
    /// coordinator failures surface as [`RelayError::TransactionInflow`].
    pub fn inflow(&self) -> Result<Option<Transaction>> {
        if self.inflowed.swap(true, Ordering::AcqRel) {
            return Err(RelayError::TransactionAlreadyInflowed);
        }
        let Some(id) = self.transaction else {
            return Ok(None);
        };
        debug!("Inflowing transaction {}", id);
        match self.coordinator.inflow(id) {
            Ok(transaction) => Ok(Some(transaction)),
            Err(e @ RelayError::TransactionInflow { .. }) => Err(e),
            Err(e) => Err(RelayError::TransactionInflow {
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflow_is_one_shot() {
        let coordinator = Arc::new(LocalTransactionCoordinator::new());
        let id = coordinator.begin();
        let guard = InflowGuard::new(Some(id), coordinator);

        assert!(guard.has_transaction());
        let transaction = guard.inflow().unwrap().unwrap();
        assert_eq!(transaction.id(), id);
        assert_eq!(transaction.status(), TransactionStatus::Active);

        let err = guard.inflow().unwrap_err();
        assert!(matches!(err, RelayError::TransactionAlreadyInflowed));
    }

    #[test]
    fn test_no_transaction() {
        let guard = InflowGuard::new(None, Arc::new(LocalTransactionCoordinator::new()));
        assert!(!guard.has_transaction());
        assert!(guard.inflow().unwrap().is_none());
    }

    #[test]
    fn test_inflow_failures() {
        let coordinator = Arc::new(LocalTransactionCoordinator::new());
        let guard = InflowGuard::new(Some(TransactionId::random()), coordinator.clone());
        assert!(matches!(guard.inflow(), Err(RelayError::TransactionInflow { .. })));

        let id = coordinator.begin();
        assert!(coordinator.set_status(id, TransactionStatus::Committed));
        let guard = InflowGuard::new(Some(id), coordinator);
        assert!(matches!(guard.inflow(), Err(RelayError::TransactionInflow { .. })));
    }
}
