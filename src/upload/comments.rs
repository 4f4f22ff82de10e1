use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locally synthesized comment shown while the attach call is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderComment {
    pub temp_id: String,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optimistic comment placeholders keyed by a locally-unique temp id.
///
/// The suffix counter lives here, owned by whoever owns the store, so
/// concurrent contexts each mint from their own sequence. At most one
/// placeholder exists per temp id; resolving removes it so the
/// server-confirmed comment replaces rather than duplicates it.
#[derive(Debug, Default)]
pub struct CommentPlaceholders {
    next_suffix: u64,
    pending: HashMap<String, PlaceholderComment>,
}

impl CommentPlaceholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new placeholder and return its temp id.
    pub fn insert(&mut self, text: Option<String>) -> String {
        self.next_suffix += 1;
        let temp_id = format!("placeholder-{}", self.next_suffix);

        self.pending.insert(
            temp_id.clone(),
            PlaceholderComment {
                temp_id: temp_id.clone(),
                text,
                created_at: Utc::now(),
            },
        );

        temp_id
    }

    /// Remove the placeholder once the real comment arrived. Returns
    /// None when it was already resolved or discarded.
    pub fn resolve(&mut self, temp_id: &str) -> Option<PlaceholderComment> {
        self.pending.remove(temp_id)
    }

    /// Drop a placeholder whose network call failed.
    pub fn discard(&mut self, temp_id: &str) -> Option<PlaceholderComment> {
        self.pending.remove(temp_id)
    }

    pub fn get(&self, temp_id: &str) -> Option<&PlaceholderComment> {
        self.pending.get(temp_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
