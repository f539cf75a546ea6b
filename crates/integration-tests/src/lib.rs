//! lostboard/crates/integration-tests/src/lib.rs
//!
//! Shared fixtures for the scenario tests: an in-memory backend wired into a
//! `BackendClient`, account helpers and record-store wrappers that record or
//! hold back calls.

use async_trait::async_trait;
use chrono::NaiveDate;
use domains::{
    BackendClient, Collection, Filter, Identity, PostKind, Query, Record, RecordStore, Result, SignUpMetadata,
};
use services::{CollectionSlice, FetchState, Fetcher, PostDraft, SyncOptions};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_adapters::MemoryBackend;
use tokio::sync::oneshot;

/// How long a test waits for a live refresh before failing.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

pub const TEST_PASSWORD: &str = "campus-123";

/// One backend and a client talking to it.
pub struct World {
    pub backend: Arc<MemoryBackend>,
    pub client: BackendClient,
    pub options: SyncOptions,
}

impl World {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new("https://lostboard.test"));
        Self {
            client: BackendClient::from_backend(backend.clone()),
            backend,
            options: SyncOptions::default(),
        }
    }

    /// Same backend, but record calls go through `records`.
    pub fn with_records(&self, records: Arc<dyn RecordStore>) -> BackendClient {
        BackendClient {
            records,
            ..self.client.clone()
        }
    }

    /// Registers an account (profile included) without signing it in.
    pub async fn register(&self, email: &str, nickname: &str) -> Identity {
        let metadata = SignUpMetadata {
            nickname: nickname.to_string(),
            college: "信息学院".to_string(),
        };
        self.client
            .auth
            .sign_up(email, TEST_PASSWORD, metadata)
            .await
            .expect("sign up")
            .expect("identity issued")
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete publish form dated 2024-01-01.
pub fn draft(kind: PostKind, title: &str, location: &str) -> PostDraft {
    let mut draft = PostDraft::new(kind);
    draft.title = title.to_string();
    draft.location = location.to_string();
    draft.lost_found_date = NaiveDate::from_ymd_opt(2024, 1, 1);
    draft
}

/// Waits until the fetcher's published state satisfies `ready`.
pub async fn settle<K, F>(fetcher: &Fetcher<K>, ready: F) -> FetchState<K>
where
    K: CollectionSlice,
    F: FnMut(&FetchState<K>) -> bool,
{
    let mut states = fetcher.subscribe_state();
    let state = tokio::time::timeout(SETTLE_TIMEOUT, states.wait_for(ready))
        .await
        .expect("fetcher did not settle in time")
        .expect("fetcher state channel closed");
    (*state).clone()
}

/// Passes everything through and keeps a log of inserts.
pub struct RecordingStore {
    inner: Arc<dyn RecordStore>,
    inserts: Mutex<Vec<(Collection, Record)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            inserts: Mutex::new(Vec::new()),
        }
    }

    pub fn inserts(&self) -> Vec<(Collection, Record)> {
        self.inserts.lock().expect("insert log").clone()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn query(&self, query: Query) -> Result<Vec<Record>> {
        self.inner.query(query).await
    }

    async fn query_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Record>> {
        self.inner.query_one(collection, filters).await
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record> {
        self.inserts
            .lock()
            .expect("insert log")
            .push((collection, record.clone()));
        self.inner.insert(collection, record).await
    }

    async fn update(&self, collection: Collection, filters: Vec<Filter>, patch: Record) -> Result<Vec<Record>> {
        self.inner.update(collection, filters, patch).await
    }

    async fn delete(&self, collection: Collection, filters: Vec<Filter>) -> Result<()> {
        self.inner.delete(collection, filters).await
    }
}

/// Holds query answers back until the test releases them. The read runs
/// when the query is issued, so a late answer carries an old snapshot.
/// Queries take gates in call order; queries beyond the queued gates pass
/// straight through.
pub struct GatedStore {
    inner: Arc<dyn RecordStore>,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            gates: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a gate for the next query and returns its release handle.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.gates.lock().expect("gates").push_back(gate);
        release
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn query(&self, query: Query) -> Result<Vec<Record>> {
        let gate = self.gates.lock().expect("gates").pop_front();
        let answer = self.inner.query(query).await;
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        answer
    }

    async fn query_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Record>> {
        self.inner.query_one(collection, filters).await
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record> {
        self.inner.insert(collection, record).await
    }

    async fn update(&self, collection: Collection, filters: Vec<Filter>, patch: Record) -> Result<Vec<Record>> {
        self.inner.update(collection, filters, patch).await
    }

    async fn delete(&self, collection: Collection, filters: Vec<Filter>) -> Result<()> {
        self.inner.delete(collection, filters).await
    }
}
