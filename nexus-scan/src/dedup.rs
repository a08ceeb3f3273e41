//! Duplicate scan suppression
//!
//! A payload stays suppressed for the cool-down after it was first admitted.
//! Expired entries are purged lazily on each lookup.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Recently admitted payloads with their expiry instants
#[derive(Debug)]
pub struct DuplicateSuppressionSet {
    cooldown: Duration,
    entries: HashMap<String, Instant>,
}

impl DuplicateSuppressionSet {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Admit a payload unless it is still cooling down
    ///
    /// Returns `true` when the payload is new (and now suppressed until
    /// `now + cooldown`), `false` for a duplicate. A duplicate does not extend
    /// the original expiry.
    pub fn admit(&mut self, payload: &str, now: Instant) -> bool {
        self.purge_expired(now);
        if self.entries.contains_key(payload) {
            return false;
        }
        self.entries.insert(payload.to_string(), now + self.cooldown);
        true
    }

    pub fn is_suppressed(&mut self, payload: &str, now: Instant) -> bool {
        self.purge_expired(now);
        self.entries.contains_key(payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, expires_at| *expires_at > now);
    }
}
