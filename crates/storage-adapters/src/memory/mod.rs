//! # MemoryBackend
//!
//! An in-process stand-in for the hosted backend. It implements all four
//! ports on top of `dashmap` tables and tokio channels, and reproduces the
//! server-side behaviour the client relies on:
//!
//! - auto-assigned integer ids and column defaults (`status = open`,
//!   `is_anonymous = false`, `is_read = false`, `created_at = now`)
//! - the `profiles` author reference embedded in post and comment reads
//! - cascade delete of a post's comments and notifications
//! - a notification for the post owner whenever someone else comments
//! - change events fanned out to every matching subscription
//!
//! # Developer Note
//! A table guard is never held while another table (or the subscriber map)
//! is touched: rows are cloned out, the guard dropped, and only then are
//! profiles embedded or events emitted.

mod auth;
mod feed;
mod objects;
mod records;

use chrono::{SecondsFormat, Utc};
use dashmap::{DashMap, DashSet};
use domains::{AuthEvent, ChangeEvent, Collection, Filter, Identity, Record};
use std::sync::atomic::{AtomicI64, AtomicU64};
use std::sync::RwLock;
use tokio::sync::{broadcast, mpsc};

pub use auth::Account;
pub use objects::StoredObject;

/// Public base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:54321";

const AUTH_EVENT_CAPACITY: usize = 64;

struct Subscriber {
    collection: Collection,
    filter: Filter,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

pub struct MemoryBackend {
    base_url: String,
    tables: DashMap<Collection, Vec<Record>>,
    next_row_id: AtomicI64,
    subscribers: DashMap<u64, Subscriber>,
    next_subscription: AtomicU64,
    objects: DashMap<(String, String), StoredObject>,
    failing_removals: DashSet<String>,
    accounts: DashMap<String, Account>,
    session: RwLock<Option<Identity>>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl MemoryBackend {
    /// `base_url` prefixes every public object URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tables: DashMap::new(),
            next_row_id: AtomicI64::new(1),
            subscribers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
            objects: DashMap::new(),
            failing_removals: DashSet::new(),
            accounts: DashMap::new(),
            session: RwLock::new(None),
            auth_events,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of rows currently held by `collection`.
    pub fn row_count(&self, collection: Collection) -> usize {
        self.tables.get(&collection).map_or(0, |rows| rows.len())
    }

    /// Number of live change subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends `event` to every subscription on its collection whose filter
    /// matches the new or the old row. Closed receivers are pruned.
    fn emit(&self, event: ChangeEvent) {
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            let sub = entry.value();
            if sub.collection != event.collection {
                continue;
            }
            let hit = [&event.new, &event.old]
                .into_iter()
                .flatten()
                .any(|row| sub.filter.matches(row));
            if hit && sub.events.send(event.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("base_url", &self.base_url)
            .field("subscriptions", &self.subscribers.len())
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

/// Server clock in the fixed-width format that sorts correctly as a string.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
