//! Publishing notices and browsing the home board.

use domains::{Collection, ItemCategory, PostKind, PostStatus, MAX_IMAGE_BYTES, POST_IMAGES_BUCKET};
use integration_tests::{draft, RecordingStore, World};
use services::{Board, ImageUpload, PostFilter, PostService};
use std::sync::Arc;

#[tokio::test]
async fn publish_inserts_once_with_backend_defaults() {
    let world = World::new();
    let me = world.register("owner@campus.edu", "小白").await;
    let recorder = Arc::new(RecordingStore::new(world.client.records.clone()));
    let client = world.with_records(recorder.clone());
    let posts = PostService::new(&client, &world.options);

    let published = posts
        .publish(&me, draft(PostKind::Lost, "白色校园卡", "图书馆"))
        .await
        .unwrap();

    let inserts = recorder.inserts();
    assert_eq!(inserts.len(), 1);
    let (collection, payload) = &inserts[0];
    assert_eq!(*collection, Collection::Posts);
    assert!(payload.get("status").is_none());
    assert!(payload["image_urls"].is_null());
    assert_eq!(payload["lost_found_date"], "2024-01-01");

    assert_eq!(published.post.status, PostStatus::Open);
    assert_eq!(published.post.author.as_ref().unwrap().nickname.as_deref(), Some("小白"));
}

#[tokio::test]
async fn publish_uploads_photos_and_skips_oversized_ones() {
    let world = World::new();
    let me = world.register("photos@campus.edu", "摄影").await;
    let posts = PostService::new(&world.client, &world.options);

    let mut form = draft(PostKind::Found, "黑色耳机", "操场");
    form.item_category = Some(ItemCategory::Electronic);
    form.images = vec![
        ImageUpload::new("front.jpg", vec![1u8; 128]),
        ImageUpload::new("raw.png", vec![0u8; MAX_IMAGE_BYTES + 1]),
        ImageUpload::new("back.jpg", vec![2u8; 64]),
    ];

    let published = posts.publish(&me, form).await.unwrap();

    assert_eq!(published.skipped_images, vec!["raw.png".to_string()]);
    let urls = published.post.images();
    assert_eq!(urls.len(), 2);
    let prefix = format!("https://lostboard.test/storage/v1/object/public/{POST_IMAGES_BUCKET}/{}/", me.id);
    assert!(urls.iter().all(|u| u.starts_with(&prefix) && u.ends_with(".jpg")));
    assert_eq!(world.backend.object_count(), 2);
}

#[tokio::test]
async fn board_tabs_and_filters() {
    let world = World::new();
    let me = world.register("board@campus.edu", "同学").await;
    let board = Board::open(&world.client, &world.options).await;
    assert!(board.feed().items().is_empty());

    board.publish(&me, draft(PostKind::Lost, "蓝色雨伞", "食堂")).await.unwrap();
    board.publish(&me, draft(PostKind::Found, "学生证", "图书馆一楼")).await.unwrap();
    let mut card = draft(PostKind::Lost, "Campus Card", "图书馆");
    card.description = "white, with a red lanyard".into();
    card.item_category = Some(ItemCategory::IdCard);
    board.publish(&me, card).await.unwrap();

    let everything = board.visible(&PostFilter::default());
    let titles: Vec<_> = everything.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["Campus Card", "学生证", "蓝色雨伞"]);

    let library = PostFilter {
        location: "图书馆".into(),
        ..Default::default()
    };
    assert_eq!(board.visible(&library).len(), 2);

    let lanyard = PostFilter {
        keyword: "RED LANYARD".into(),
        category: Some(ItemCategory::IdCard),
        location: String::new(),
    };
    assert_eq!(board.visible(&lanyard)[0].title, "Campus Card");

    assert!(board.select_tab(Some(PostKind::Found)).await.is_applied());
    assert_eq!(board.tab(), Some(PostKind::Found));
    let found = board.visible(&PostFilter::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, PostKind::Found);

    board.close().await;
}

#[tokio::test]
async fn closed_posts_leave_the_board() {
    let world = World::new();
    let me = world.register("closer@campus.edu", "c").await;
    let board = Board::open(&world.client, &world.options).await;
    let posts = PostService::new(&world.client, &world.options);

    let published = board.publish(&me, draft(PostKind::Lost, "钥匙", "宿舍")).await.unwrap();
    assert_eq!(board.feed().items().len(), 1);

    assert!(posts.mark_found(me.id, published.post.id).await.unwrap());
    board.refresh().await;
    assert!(board.feed().items().is_empty());
}
