//! engine::rollback
//!
//! Snapshot capture and restoration for transaction rollback.
//!
//! # Architecture
//!
//! Before a transaction applies anything, the executor captures a
//! [`Rollback`] point: a full [`StoreSnapshot`] plus its fingerprint. If
//! the transaction fails for any reason, the snapshot is restored and the
//! store fingerprint is compared with the captured one.
//!
//! # Invariants
//!
//! - After a successful restore, the store fingerprint equals the
//!   fingerprint captured before the transaction
//! - Restore rewinds the id counter with the rest of the snapshot, so ids
//!   handed out during the failed transaction are handed out again

use thiserror::Error;
use tracing::debug;

use crate::core::types::Fingerprint;
use crate::store::{ResourceStore, StoreError, StoreSnapshot};

/// Errors from rollback operations.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// The store refused the snapshot.
    #[error("store error during rollback: {0}")]
    Store(#[from] StoreError),

    /// The restored store does not match the captured state.
    #[error("restored state {actual} does not match captured state {expected}")]
    Mismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },
}

/// A captured pre-transaction state.
#[derive(Debug, Clone)]
pub struct Rollback {
    snapshot: StoreSnapshot,
    fingerprint: Fingerprint,
}

impl Rollback {
    /// Capture the current store contents.
    pub fn capture<S: ResourceStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let snapshot = store.snapshot()?;
        let fingerprint = snapshot.fingerprint()?;
        Ok(Self {
            snapshot,
            fingerprint,
        })
    }

    /// Fingerprint of the captured state.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Put the captured state back and verify it.
    pub fn restore<S: ResourceStore + ?Sized>(
        self,
        store: &mut S,
    ) -> Result<Fingerprint, RollbackError> {
        store.restore(self.snapshot)?;
        let actual = store.snapshot()?.fingerprint()?;
        if actual != self.fingerprint {
            return Err(RollbackError::Mismatch {
                expected: self.fingerprint,
                actual,
            });
        }
        debug!(fingerprint = %actual, "store restored");
        Ok(actual)
    }
}
