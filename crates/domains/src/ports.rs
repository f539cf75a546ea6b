//! # Core Traits (Ports)
//!
//! The hosted backend is reached only through these traits. Any adapter must
//! implement them to be plugged into the services; tests substitute the
//! mockall-generated `MockXxx` types (feature `testing`).

use crate::error::Result;
use crate::models::{Identity, SignUpMetadata};
use crate::query::{Collection, Filter, Query, Record};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Query and command execution against the named record collections.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows matching every filter, ordered and bounded as requested.
    async fn query(&self, query: Query) -> Result<Vec<Record>>;

    /// The single row matching the filters, `None` when absent.
    async fn query_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Record>>;

    /// Inserts a row and returns it as stored (with backend defaults filled in).
    async fn insert(&self, collection: Collection, record: Record) -> Result<Record>;

    /// Applies `patch` to every matching row and returns the updated rows.
    /// An empty result means nothing matched.
    async fn update(&self, collection: Collection, filters: Vec<Filter>, patch: Record) -> Result<Vec<Record>>;

    /// Deletes every matching row.
    async fn delete(&self, collection: Collection, filters: Vec<Filter>) -> Result<()>;
}

/// Kind of row change carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification that a watched row was inserted, updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    /// Row after the change; `None` for deletes.
    pub new: Option<Record>,
    /// Row before the change; `None` for inserts.
    pub old: Option<Record>,
}

/// Handle identifying a live change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// A live change subscription. Events arrive on `events` until the
/// subscription is released through [`ChangeFeed::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Realtime change delivery.
///
/// Reconnection and backoff of the underlying transport belong to the
/// adapter; a receiver that closes simply ends the subscription.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Starts delivering every change on `collection` whose old or new row matches `filter`.
    async fn subscribe(&self, collection: Collection, filter: Filter) -> Result<Subscription>;

    /// Releases a subscription. Releasing an unknown id is not an error.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

/// Upload behaviour for [`ObjectStore::upload_object`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Overwrite an existing object at the same path.
    pub upsert: bool,
    /// `Cache-Control` max-age in seconds, as a string ("3600").
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
}

/// Binary object storage.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under `bucket/path` and returns the stored path.
    async fn upload_object(&self, bucket: &str, path: &str, data: Bytes, options: UploadOptions) -> Result<String>;

    /// Public URL for an object. Pure string building, no round trip.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()>;
}

/// Session lifecycle notifications pushed by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEvent {
    SignedIn(Identity),
    /// Explicit sign-out or external expiry.
    SignedOut,
    TokenRefreshed(Identity),
    UserUpdated(Identity),
}

/// Authentication and session issuance.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// The identity behind the current session, if any.
    async fn get_session(&self) -> Result<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Registers an account. `None` means the account exists but awaits
    /// confirmation and no identity was issued yet.
    async fn sign_up(&self, email: &str, password: &str, metadata: SignUpMetadata) -> Result<Option<Identity>>;

    async fn sign_out(&self) -> Result<()>;

    /// A fresh receiver of session lifecycle events.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// The configured handle to the hosted backend.
///
/// Constructed once and passed to every fetcher and provider; there is no
/// global instance.
#[derive(Clone)]
pub struct BackendClient {
    pub records: Arc<dyn RecordStore>,
    pub changes: Arc<dyn ChangeFeed>,
    pub objects: Arc<dyn ObjectStore>,
    pub auth: Arc<dyn AuthGateway>,
}

impl BackendClient {
    pub fn new(
        records: Arc<dyn RecordStore>,
        changes: Arc<dyn ChangeFeed>,
        objects: Arc<dyn ObjectStore>,
        auth: Arc<dyn AuthGateway>,
    ) -> Self {
        Self {
            records,
            changes,
            objects,
            auth,
        }
    }

    /// Builds a client from one adapter that implements every port.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RecordStore + ChangeFeed + ObjectStore + AuthGateway + 'static,
    {
        Self {
            records: backend.clone(),
            changes: backend.clone(),
            objects: backend.clone(),
            auth: backend,
        }
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}
