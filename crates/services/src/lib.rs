//! lostboard/crates/services/src/lib.rs
//!
//! Client-side data synchronization for the lost-and-found board: cached
//! collection fetchers, the session provider, pure view projections and the
//! one-shot actions screens invoke.

mod io;

pub mod comments;
pub mod fetcher;
pub mod notifications;
pub mod posts;
pub mod projections;
pub mod session;
pub mod slices;
pub mod uploads;

pub use comments::{CommentService, Discussion};
pub use fetcher::{CollectionSlice, FetchOutcome, FetchState, Fetcher, SyncOptions};
pub use notifications::NotificationCenter;
pub use posts::{Board, DeleteReport, MyPosts, PostDraft, PostService, Published};
pub use projections::{unread_count, PostFilter, PostTallies, StatusFilter};
pub use session::{AccessGate, ProfileUpdate, SessionProvider, SessionState, SignUpForm};
pub use slices::{CommentThread, Inbox, OwnPosts, PostFeed};
pub use uploads::ImageUpload;
