use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// One immutable view of the access policy. Replaced wholesale by the
/// watcher; never patched in place, so readers can hold a snapshot across a
/// whole request without observing a half-applied update.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    /// When false, every identity is allowed.
    pub enabled: bool,
    /// Normalized identity tokens (lower-case, dashes stripped).
    pub allowed: HashSet<String>,
}

/// The allow-list gate consulted by every authentication scheme.
///
/// Read-mostly: many connection handlers call [`is_allowed`](Self::is_allowed)
/// concurrently while a single watcher performs infrequent snapshot swaps.
#[derive(Clone, Default)]
pub struct AccessPolicy {
    inner: Arc<RwLock<Arc<PolicySnapshot>>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical identity form: hyphenated and compact UUID spellings (and
    /// mixed case) compare equal.
    pub fn normalize(identity: &str) -> String {
        identity
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    pub fn is_allowed(&self, identity: &str) -> bool {
        let snapshot = self.snapshot();
        !snapshot.enabled || snapshot.allowed.contains(&Self::normalize(identity))
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swaps in a new allow-set, keeping the current enabled flag.
    pub fn replace_allowed(&self, identities: impl IntoIterator<Item = String>) {
        let allowed = identities
            .into_iter()
            .map(|id| Self::normalize(&id))
            .collect();
        let enabled = self.snapshot().enabled;
        self.store(PolicySnapshot { enabled, allowed });
    }

    /// Swaps the enabled flag, keeping the current allow-set.
    pub fn set_enabled(&self, enabled: bool) {
        let allowed = self.snapshot().allowed.clone();
        self.store(PolicySnapshot { enabled, allowed });
    }

    fn store(&self, snapshot: PolicySnapshot) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_allows_unseen_identities() {
        let policy = AccessPolicy::new();
        assert!(policy.is_allowed("anyone-at-all"));
        assert!(policy.is_allowed(""));
    }

    #[test]
    fn enabled_policy_allows_only_listed_identities() {
        let policy = AccessPolicy::new();
        policy.replace_allowed(["aaaa-bbbb".to_string()]);
        policy.set_enabled(true);

        assert!(policy.is_allowed("aaaa-bbbb"));
        assert!(!policy.is_allowed("cccc-dddd"));
    }

    #[test]
    fn uuid_spellings_compare_equal() {
        let policy = AccessPolicy::new();
        policy.replace_allowed(["A1B2C3D4-E5F6-0718-2930-AABBCCDDEEFF".to_string()]);
        policy.set_enabled(true);

        assert!(policy.is_allowed("a1b2c3d4e5f607182930aabbccddeeff"));
        assert!(policy.is_allowed("a1b2c3d4-e5f6-0718-2930-aabbccddeeff"));
    }

    #[test]
    fn snapshot_is_stable_across_a_swap() {
        let policy = AccessPolicy::new();
        policy.replace_allowed(["a".to_string()]);
        policy.set_enabled(true);

        let before = policy.snapshot();
        policy.replace_allowed(["b".to_string()]);

        // The old snapshot still answers with the old set.
        assert!(before.allowed.contains("a"));
        assert!(!policy.is_allowed("a"));
        assert!(policy.is_allowed("b"));
    }
}
