//! In-memory [`BlockingRecordStore`] for tests, demos and fixture-backed
//! deployments.
//!
//! Members live in a `HashMap` behind `std::sync::RwLock`. Lookups are
//! synchronous, so the store is served through
//! [`WorkerPoolStore`](super::WorkerPoolStore) like any other blocking client.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};

use crate::models::Member;

use super::BlockingRecordStore;

pub struct InMemoryStore {
    members: RwLock<HashMap<i64, Member>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        let store = Self::new();
        for m in members {
            store.insert(m);
        }
        store
    }

    /// Load members from a JSON array fixture.
    pub fn from_fixture(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        let members: Vec<Member> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;
        Ok(Self::with_members(members))
    }

    pub fn insert(&self, member: Member) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.insert(member.member_id, member);
    }

    pub fn len(&self) -> usize {
        self.members.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

impl BlockingRecordStore for InMemoryStore {
    fn find_by_id(&self, id: i64) -> Result<Option<Member>> {
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        Ok(members.get(&id).cloned())
    }

    /// Every word of `fragment` must appear in the first or last name.
    fn find_by_name(&self, fragment: &str) -> Result<Vec<Member>> {
        let words: Vec<String> = fragment
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Ok(vec![]);
        }
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Member> = members
            .values()
            .filter(|m| {
                words.iter().all(|w| {
                    contains_ci(m.first_name.as_deref(), w)
                        || contains_ci(m.last_name.as_deref(), w)
                })
            })
            .cloned()
            .collect();
        found.sort_by_key(|m| m.member_id);
        Ok(found)
    }
}
