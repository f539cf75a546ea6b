//! Board filters, tallies and the unread badge over generated caches.

use chrono::{TimeZone, Utc};
use domains::{ItemCategory, Notification, Post, PostKind, PostStatus};
use proptest::prelude::*;
use services::{unread_count, PostFilter, PostTallies, StatusFilter};
use uuid::Uuid;

const WORDS: [&str; 6] = ["Card", "雨伞", "耳机", "blue", "图书馆", "Lab"];

fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS.to_vec()), 0..3).prop_map(|parts| parts.join(" "))
}

fn arb_category() -> impl Strategy<Value = Option<ItemCategory>> {
    prop::option::of(prop::sample::select(ItemCategory::ALL.to_vec()))
}

fn arb_post() -> impl Strategy<Value = Post> {
    (
        1i64..10_000,
        any::<bool>(),
        any::<bool>(),
        arb_text(),
        prop::option::of(arb_text()),
        arb_category(),
        prop::option::of(arb_text()),
        0i64..1_000_000,
    )
        .prop_map(|(id, lost, open, title, description, item_category, location, secs)| Post {
            id,
            user_id: Uuid::nil(),
            kind: if lost { PostKind::Lost } else { PostKind::Found },
            title,
            description,
            item_category,
            location,
            lost_found_date: None,
            image_urls: None,
            status: if open { PostStatus::Open } else { PostStatus::Closed },
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap_or_default(),
            author: None,
        })
}

fn arb_filter() -> impl Strategy<Value = PostFilter> {
    (
        prop_oneof![Just(String::new()), prop::sample::select(WORDS.to_vec()).prop_map(str::to_uppercase)],
        arb_category(),
        prop_oneof![Just(String::new()), prop::sample::select(WORDS.to_vec()).prop_map(String::from)],
    )
        .prop_map(|(keyword, category, location)| PostFilter {
            keyword,
            category,
            location,
        })
}

fn arb_notification() -> impl Strategy<Value = Notification> {
    (1i64..10_000, any::<bool>()).prop_map(|(id, is_read)| Notification {
        id,
        post_id: 1,
        user_id: Uuid::nil(),
        content: "有人评论了你的帖子「x」".into(),
        is_read,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
    })
}

/// Straightforward restatement of the board filter.
fn reference_match(filter: &PostFilter, post: &Post) -> bool {
    let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());
    let keyword = filter.keyword.is_empty()
        || contains(&post.title, &filter.keyword)
        || post.description.as_deref().is_some_and(|d| contains(d, &filter.keyword));
    let category = match filter.category {
        None => true,
        Some(c) => post.item_category == Some(c),
    };
    let location = filter.location.is_empty()
        || post.location.as_deref().is_some_and(|l| contains(l, &filter.location));
    keyword && category && location
}

proptest! {
    #[test]
    fn filter_agrees_with_reference(posts in prop::collection::vec(arb_post(), 0..30), filter in arb_filter()) {
        let expected: Vec<i64> = posts.iter().filter(|p| reference_match(&filter, p)).map(|p| p.id).collect();
        let actual: Vec<i64> = filter.apply(&posts).into_iter().map(|p| p.id).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn empty_filter_keeps_everything(posts in prop::collection::vec(arb_post(), 0..30)) {
        prop_assert_eq!(PostFilter::default().apply(&posts).len(), posts.len());
    }

    #[test]
    fn tallies_partition_the_list(posts in prop::collection::vec(arb_post(), 0..40)) {
        let tallies = PostTallies::from_posts(&posts);
        prop_assert_eq!(tallies.total, posts.len());
        prop_assert_eq!(tallies.open + tallies.closed, tallies.total);
        prop_assert_eq!(tallies.lost + tallies.found, tallies.total);
        prop_assert_eq!(StatusFilter::Only(PostStatus::Closed).apply(&posts).len(), tallies.closed);
        prop_assert_eq!(StatusFilter::All.apply(&posts).len(), tallies.total);
    }

    #[test]
    fn badge_counts_unread(notifications in prop::collection::vec(arb_notification(), 0..60)) {
        let expected = notifications.iter().filter(|n| !n.is_read).count();
        prop_assert_eq!(unread_count(&notifications), expected);
    }
}
