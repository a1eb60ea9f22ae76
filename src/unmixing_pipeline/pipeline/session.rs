//! Per-session run exclusion and cooperative cancellation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::unmixing_pipeline::analysis::session_directory_name;
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::common::progress::Stage;

/// Tracks which sessions have a run in flight. Clones share state.
///
/// Sessions are keyed by their artifact directory, case-folded, so two ids
/// that write to the same directory (`a/b` and `a_b`, or `A` and `a` on a
/// case-insensitive file system) exclude each other.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

fn lock_key(session_id: &str) -> String {
    session_directory_name(session_id).to_lowercase()
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `session_id`, failing with `SessionBusy` if it or another id
    /// sharing its artifact directory is already held.
    pub fn acquire(&self, session_id: &str) -> Result<SessionLease> {
        let key = lock_key(session_id);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(UnmixingError::SessionBusy(session_id.to_string()));
        }
        debug!(session = session_id, key = %key, "Session lease acquired");
        Ok(SessionLease {
            registry: self.clone(),
            session_id: session_id.to_string(),
            key,
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&lock_key(session_id))
    }
}

/// Exclusive claim on a session, released on drop.
#[derive(Debug)]
pub struct SessionLease {
    registry: SessionRegistry,
    session_id: String,
    key: String,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!(session = %self.session_id, "Session lease released");
    }
}

/// Shared "still wanted" flag. The caller cancels, the pipeline checks it at
/// stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` naming `stage` once the token has been cancelled.
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(UnmixingError::Cancelled(stage.name().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lease_is_rejected_until_release() {
        let registry = SessionRegistry::new();
        let lease = registry.acquire("s1").unwrap();
        assert_eq!(lease.session_id(), "s1");

        assert!(matches!(registry.acquire("s1"), Err(UnmixingError::SessionBusy(_))));
        let other = registry.acquire("s2").unwrap();

        drop(lease);
        assert!(!registry.is_active("s1"));
        assert!(registry.acquire("s1").is_ok());
        assert!(registry.is_active("s2"));
        drop(other);
    }

    #[test]
    fn test_ids_sharing_a_directory_exclude_each_other() {
        let registry = SessionRegistry::new();
        let lease = registry.acquire("a/b").unwrap();

        assert!(matches!(registry.acquire("a_b"), Err(UnmixingError::SessionBusy(_))));
        assert!(matches!(registry.acquire("a\\b"), Err(UnmixingError::SessionBusy(_))));
        assert!(matches!(registry.acquire("A_B"), Err(UnmixingError::SessionBusy(_))));
        assert!(registry.is_active("a_b"));
        assert!(registry.acquire("a_c").is_ok());

        drop(lease);
        assert!(!registry.is_active("a/b"));
        let other = registry.acquire("a_b").unwrap();
        assert_eq!(other.session_id(), "a_b");
    }

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(token.check(Stage::Segment).is_ok());

        handle.cancel();
        let err = token.check(Stage::Segment).unwrap_err();
        assert_eq!(err.to_string(), "Run cancelled before segment");
    }
}
