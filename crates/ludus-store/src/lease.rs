//! Lease tuning and the token-rotation admission rule.

use std::time::Duration;

use ludus_kernel::LeaseToken;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(5);

/// Lease behavior tuning knobs.
#[derive(Clone, Debug)]
pub struct LeaseConfig {
    /// How long a freshly minted token stays valid without renewal.
    pub lease_ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

impl LeaseConfig {
    pub fn with_ttl(lease_ttl: Duration) -> Self {
        Self { lease_ttl }
    }

    /// Reads `LUDUS_LEASE_TTL_MS`, falling back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("LUDUS_LEASE_TTL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.lease_ttl = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "ignoring invalid LUDUS_LEASE_TTL_MS"),
            }
        }
        config
    }
}

/// What a game's lease slot currently holds.
#[derive(Clone, Copy, Debug)]
pub enum HeldLease<'a> {
    Vacant,
    Live(&'a LeaseToken),
    Expired(&'a LeaseToken),
}

impl HeldLease<'_> {
    /// Whether a lock request presenting `previous` may rotate this lease.
    ///
    /// Presenting the stored token always renews it, expired or not. Without a
    /// token the request only wins a vacant or expired slot.
    pub fn admits(&self, previous: Option<&LeaseToken>) -> bool {
        match (self, previous) {
            (HeldLease::Live(held) | HeldLease::Expired(held), Some(prev)) => *held == prev,
            (HeldLease::Vacant | HeldLease::Expired(_), None) => true,
            (HeldLease::Live(_), None) => false,
            (HeldLease::Vacant, Some(_)) => false,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, HeldLease::Live(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacant_slot_admits_only_fresh_claims() {
        let stale = LeaseToken::new("stale");
        assert!(HeldLease::Vacant.admits(None));
        assert!(!HeldLease::Vacant.admits(Some(&stale)));
    }

    #[test]
    fn live_lease_admits_only_its_holder() {
        let held = LeaseToken::new("held");
        let other = LeaseToken::new("other");
        let lease = HeldLease::Live(&held);
        assert!(lease.admits(Some(&held)));
        assert!(!lease.admits(Some(&other)));
        assert!(!lease.admits(None));
    }

    #[test]
    fn expired_lease_admits_holder_and_fresh_claims() {
        let held = LeaseToken::new("held");
        let other = LeaseToken::new("other");
        let lease = HeldLease::Expired(&held);
        assert!(lease.admits(Some(&held)));
        assert!(lease.admits(None));
        assert!(!lease.admits(Some(&other)));
    }
}
