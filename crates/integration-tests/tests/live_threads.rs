//! Comment threads and inboxes that refresh on change events.

use domains::{BoardError, PostKind, ANONYMOUS_NAME};
use integration_tests::{draft, settle, World};
use services::{CommentService, Discussion, NotificationCenter, PostService};

#[tokio::test]
async fn comment_from_another_client_reaches_open_thread() {
    let world = World::new();
    let owner = world.register("owner@campus.edu", "失主").await;
    let finder = world.register("finder@campus.edu", "好心人").await;
    let post = PostService::new(&world.client, &world.options)
        .publish(&owner, draft(PostKind::Lost, "钱包", "食堂"))
        .await
        .unwrap()
        .post;

    let discussion = Discussion::open(&world.client, post.id, &world.options).await;
    assert!(discussion.comments().is_empty());

    // A separate client writes; the open thread only learns of it through the feed.
    CommentService::new(&world.client, &world.options)
        .submit(Some(&finder), post.id, "我在食堂捡到一个钱包", false)
        .await
        .unwrap();

    let state = settle(discussion.thread(), |s| s.items().len() == 1).await;
    assert_eq!(state.items()[0].author().name, "好心人");

    discussion.close().await;
    assert_eq!(world.backend.subscription_count(), 0);
}

#[tokio::test]
async fn anonymous_comment_renders_without_author() {
    let world = World::new();
    let owner = world.register("owner@campus.edu", "失主").await;
    let shy = world.register("shy@campus.edu", "害羞的人").await;
    let post = PostService::new(&world.client, &world.options)
        .publish(&owner, draft(PostKind::Found, "耳机", "操场"))
        .await
        .unwrap()
        .post;
    let discussion = Discussion::open(&world.client, post.id, &world.options).await;

    discussion.submit(Some(&shy), "  是我的，谢谢  ", true).await.unwrap();

    let comments = discussion.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].content, "是我的，谢谢");
    assert_eq!(comments[0].user_id, Some(shy.id));
    let byline = comments[0].author();
    assert_eq!(byline.name, ANONYMOUS_NAME);
    assert!(byline.avatar_url.is_none());

    let err = discussion.submit(None, "hello", false).await.unwrap_err();
    assert!(matches!(err, BoardError::Unauthenticated(_)));
    discussion.close().await;
}

#[tokio::test]
async fn independent_inboxes_refresh_on_their_own() {
    let world = World::new();
    let owner = world.register("owner@campus.edu", "失主").await;
    let finder = world.register("finder@campus.edu", "好心人").await;
    let post = PostService::new(&world.client, &world.options)
        .publish(&owner, draft(PostKind::Lost, "学生卡", "图书馆"))
        .await
        .unwrap()
        .post;

    let badge = NotificationCenter::open(&world.client, owner.id, &world.options).await;
    let messages = NotificationCenter::open(&world.client, owner.id, &world.options).await;
    assert_eq!(world.backend.subscription_count(), 2);

    let comments = CommentService::new(&world.client, &world.options);
    comments.submit(Some(&finder), post.id, "在这", false).await.unwrap();
    comments.submit(Some(&finder), post.id, "还在吗", true).await.unwrap();

    settle(badge.inbox(), |s| s.items().len() == 2).await;
    settle(messages.inbox(), |s| s.items().len() == 2).await;
    assert_eq!(badge.unread_count(), 2);

    let newest = messages.notifications()[0].id;
    messages.mark_as_read(newest).await.unwrap();
    assert_eq!(messages.unread_count(), 1);
    settle(badge.inbox(), |s| s.items().iter().filter(|n| !n.is_read).count() == 1).await;
    assert_eq!(badge.unread_count(), 1);

    messages.mark_all_as_read().await.unwrap();
    assert_eq!(messages.unread_count(), 0);
    settle(badge.inbox(), |s| s.items().iter().all(|n| n.is_read)).await;
    assert_eq!(badge.unread_count(), 0);

    badge.close().await;
    messages.close().await;
    assert_eq!(world.backend.subscription_count(), 0);
}

#[tokio::test]
async fn own_comments_do_not_notify() {
    let world = World::new();
    let owner = world.register("owner@campus.edu", "失主").await;
    let post = PostService::new(&world.client, &world.options)
        .publish(&owner, draft(PostKind::Lost, "U盘", "实验室"))
        .await
        .unwrap()
        .post;
    let inbox = NotificationCenter::open(&world.client, owner.id, &world.options).await;

    CommentService::new(&world.client, &world.options)
        .submit(Some(&owner), post.id, "补充：蓝色的", false)
        .await
        .unwrap();
    inbox.refresh().await;

    assert!(inbox.notifications().is_empty());
    inbox.close().await;
}
