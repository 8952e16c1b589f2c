//! Shared latest-export value
//!
//! A single-slot store for the most recent subscription bundle. There
//! is exactly one writer (the exporter); readers copy the value out.
//! Writes replace the whole value, so no finer-grained locking is
//! needed.

use std::sync::{Arc, RwLock};

/// Cloneable handle to the latest-export slot
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored bundle
    pub fn set(&self, bundle: String) {
        *self.inner.write().expect("store lock poisoned") = Some(bundle);
    }

    /// Copy out the current bundle; `None` until the first export
    pub fn get(&self) -> Option<String> {
        self.inner.read().expect("store lock poisoned").clone()
    }
}
