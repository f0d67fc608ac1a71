//! At-most-one in-flight run per analysis key, and one progress update at
//! a time per patient.
//!
//! The registry is checked before the store is touched, so a rejected
//! submission never changes a record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use physio_core::analysis::AnalysisKey;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<AnalysisKey, CancellationToken>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<AnalysisKey, CancellationToken>> {
        // The map stays consistent even if a holder panicked.
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` for a new run. `None` if a run already holds it.
    pub fn try_reserve(self: &Arc<Self>, key: &AnalysisKey) -> Option<RunReservation> {
        let mut runs = self.runs();
        if runs.contains_key(key) {
            return None;
        }
        let token = CancellationToken::new();
        runs.insert(key.clone(), token.clone());
        Some(RunReservation {
            registry: Arc::clone(self),
            key: key.clone(),
            token,
        })
    }

    pub fn is_active(&self, key: &AnalysisKey) -> bool {
        self.runs().contains_key(key)
    }

    /// Signal cancellation to the run holding `key`. Returns whether one was
    /// found.
    pub fn cancel(&self, key: &AnalysisKey) -> bool {
        match self.runs().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active run. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let runs = self.runs();
        for token in runs.values() {
            token.cancel();
        }
        runs.len()
    }

    pub fn active_count(&self) -> usize {
        self.runs().len()
    }

    fn release(&self, key: &AnalysisKey) {
        self.runs().remove(key);
    }
}

/// Ownership of a key for the lifetime of one run. Dropping it frees the
/// key.
pub struct RunReservation {
    registry: Arc<RunRegistry>,
    key: AnalysisKey,
    token: CancellationToken,
}

impl RunReservation {
    pub fn key(&self) -> &AnalysisKey {
        &self.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunReservation {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Patient locks
// ---------------------------------------------------------------------------

/// Per-patient async locks.
///
/// A run holds its patient's lock from reading the prior progress until its
/// final record is stored, so overlapping sessions of one patient extend the
/// score history one after another. Runs for different patients never wait
/// on each other.
#[derive(Default)]
pub struct PatientLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while a patient's progress is read, extended and stored.
pub type PatientGuard = OwnedMutexGuard<()>;

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: &str) -> PatientGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are dropped.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Patients with a holder or waiter.
    pub fn contended(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
