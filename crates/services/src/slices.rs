//! The collection slices the screens fetch.

use crate::fetcher::{CollectionSlice, DEFAULT_NOTIFICATION_LIMIT};
use domains::{Collection, Comment, Filter, Notification, Order, Post, PostKind, PostStatus, Query};
use uuid::Uuid;

/// Open notices on the home board, newest first, optionally narrowed to one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostFeed {
    pub kind: Option<PostKind>,
}

impl CollectionSlice for PostFeed {
    type Item = Post;

    fn query(&self) -> Query {
        let query = Query::on(Collection::Posts)
            .eq("status", PostStatus::Open.as_str())
            .order(Order::desc("created_at"));
        match self.kind {
            Some(kind) => query.eq("type", kind.as_str()),
            None => query,
        }
    }
}

/// Every notice of one user, any status, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnPosts {
    pub user_id: Uuid,
}

impl CollectionSlice for OwnPosts {
    type Item = Post;

    fn query(&self) -> Query {
        Query::on(Collection::Posts)
            .eq("user_id", self.user_id.to_string())
            .order(Order::desc("created_at"))
    }
}

/// Comments under one notice, oldest first, refreshed live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentThread {
    pub post_id: i64,
}

impl CollectionSlice for CommentThread {
    type Item = Comment;

    fn query(&self) -> Query {
        Query::on(Collection::Comments)
            .eq("post_id", self.post_id)
            .order(Order::asc("created_at"))
    }

    fn change_scope(&self) -> Option<(Collection, Filter)> {
        Some((Collection::Comments, Filter::eq("post_id", self.post_id)))
    }
}

/// A user's notifications, newest first and bounded, refreshed live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbox {
    pub user_id: Uuid,
    pub limit: usize,
}

impl Inbox {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            limit: DEFAULT_NOTIFICATION_LIMIT,
        }
    }
}

impl CollectionSlice for Inbox {
    type Item = Notification;

    fn query(&self) -> Query {
        Query::on(Collection::Notifications)
            .eq("user_id", self.user_id.to_string())
            .order(Order::desc("created_at"))
            .limit(self.limit)
    }

    fn change_scope(&self) -> Option<(Collection, Filter)> {
        Some((Collection::Notifications, Filter::eq("user_id", self.user_id.to_string())))
    }
}
