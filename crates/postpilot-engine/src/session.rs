//! Short-lived per-user flow state with a TTL, replacing process-global
//! maps for multi-step admin flows (pending time entry, chat confirmation)
//! and deep-link lead attribution.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL-bound map keyed by Telegram user id. Expired entries are dropped on
/// access and by `purge`.
pub struct SessionStore<T> {
    ttl: Duration,
    entries: Mutex<HashMap<i64, (Instant, T)>>,
}

/// Default flow TTL: an admin who walked away mid-flow starts over.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

impl<T> SessionStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store (or replace) the pending state for a user.
    pub fn put(&self, user_id: i64, value: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(user_id, (Instant::now(), value));
    }

    /// Remove and return the pending state, unless it expired.
    pub fn take(&self, user_id: i64) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        let (created, value) = entries.remove(&user_id)?;
        (created.elapsed() < self.ttl).then_some(value)
    }

    /// Whether a live entry exists for the user.
    pub fn contains(&self, user_id: i64) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&user_id)
            .is_some_and(|(created, _)| created.elapsed() < self.ttl)
    }

    /// Drop every expired entry.
    pub fn purge(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, (created, _)| created.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SessionStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_take() {
        let store = SessionStore::default();
        store.put(1, "09:30".to_string());
        assert!(store.contains(1));
        assert_eq!(store.take(1).as_deref(), Some("09:30"));
        // take removes
        assert_eq!(store.take(1), None);
    }

    #[test]
    fn test_replace() {
        let store = SessionStore::default();
        store.put(1, 10i64);
        store.put(1, 20);
        assert_eq!(store.take(1), Some(20));
    }

    #[test]
    fn test_expiry() {
        let store = SessionStore::new(Duration::ZERO);
        store.put(1, 10i64);
        assert!(!store.contains(1));
        assert_eq!(store.take(1), None);

        store.put(2, 20);
        store.purge();
        assert!(store.is_empty());
    }

    #[test]
    fn test_users_are_independent() {
        let store = SessionStore::default();
        store.put(1, 10i64);
        store.put(2, 20);
        assert_eq!(store.take(1), Some(10));
        assert_eq!(store.take(2), Some(20));
    }
}
