//! Policy access for the engine

use std::sync::{Arc, RwLock};
use tracing::info;

use crate::Policy;

/// Read-only view of the current policy.
///
/// The engine takes a fresh snapshot for every foreground event, so changes
/// made through the settings UI apply to the very next app switch.
pub trait PolicyStore: Send + Sync {
    fn snapshot(&self) -> Policy;
}

/// Policy store shared between the engine and whatever edits the policy
#[derive(Debug, Clone, Default)]
pub struct SharedPolicyStore {
    inner: Arc<RwLock<Policy>>,
}

impl SharedPolicyStore {
    pub fn new(policy: Policy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    /// Swap in a new policy
    pub fn replace(&self, policy: Policy) {
        info!(
            blocked = policy.blocked_packages.len(),
            hidden = policy.hidden_packages.len(),
            hide_mode = policy.hide_mode_active,
            "Policy replaced"
        );
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = policy;
    }

    /// Edit the policy in place
    pub fn update(&self, f: impl FnOnce(&mut Policy)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

impl PolicyStore for SharedPolicyStore {
    fn snapshot(&self) -> Policy {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeguard_util::PackageId;

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let store = SharedPolicyStore::default();
        let before = store.snapshot();

        store.update(|p| {
            p.blocked_packages.insert(PackageId::new("com.example.chat"));
        });

        assert!(before.blocked_packages.is_empty());
        assert!(store.snapshot().is_blocked(&PackageId::new("com.example.chat")));
    }

    #[test]
    fn clones_share_state() {
        let store = SharedPolicyStore::default();
        let other = store.clone();
        other.replace(Policy {
            hide_mode_active: true,
            ..Policy::default()
        });
        assert!(store.snapshot().hide_mode_active);
    }
}
