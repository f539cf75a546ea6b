//! # View Projections
//!
//! Pure, synchronous reductions over a fetcher's cached rows. They hold no
//! state of their own and are recomputed on every read, so they can never
//! drift from the cache they are computed from.

use domains::{ItemCategory, Notification, Post, PostKind, PostStatus};

/// Keyword / category / location narrowing of the home board.
///
/// An empty keyword or location and a `None` category match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub keyword: String,
    pub category: Option<ItemCategory>,
    pub location: String,
}

impl PostFilter {
    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty() && self.category.is_none() && self.location.is_empty()
    }

    pub fn matches(&self, post: &Post) -> bool {
        self.matches_keyword(post) && self.matches_category(post) && self.matches_location(post)
    }

    /// Matching posts in cache order.
    pub fn apply<'a>(&self, posts: &'a [Post]) -> Vec<&'a Post> {
        if self.is_empty() {
            return posts.iter().collect();
        }
        posts.iter().filter(|p| self.matches(p)).collect()
    }

    fn matches_keyword(&self, post: &Post) -> bool {
        if self.keyword.is_empty() {
            return true;
        }
        let needle = self.keyword.to_lowercase();
        post.title.to_lowercase().contains(&needle)
            || post
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }

    fn matches_category(&self, post: &Post) -> bool {
        self.category.is_none() || post.item_category == self.category
    }

    fn matches_location(&self, post: &Post) -> bool {
        if self.location.is_empty() {
            return true;
        }
        let needle = self.location.to_lowercase();
        post.location
            .as_deref()
            .is_some_and(|l| l.to_lowercase().contains(&needle))
    }
}

/// Status selector on the profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(PostStatus),
}

impl StatusFilter {
    pub fn matches(self, post: &Post) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => post.status == status,
        }
    }

    pub fn apply(self, posts: &[Post]) -> Vec<&Post> {
        posts.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Counters shown above a user's own notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostTallies {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub lost: usize,
    pub found: usize,
}

impl PostTallies {
    pub fn from_posts(posts: &[Post]) -> Self {
        posts.iter().fold(Self::default(), |mut t, post| {
            t.total += 1;
            match post.status {
                PostStatus::Open => t.open += 1,
                PostStatus::Closed => t.closed += 1,
            }
            match post.kind {
                PostKind::Lost => t.lost += 1,
                PostKind::Found => t.found += 1,
            }
            t
        })
    }
}

/// Badge count: notifications not yet read.
pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.is_read).count()
}
