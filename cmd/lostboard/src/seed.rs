//! Demo accounts and notices for a fresh in-memory backend.

use anyhow::Context;
use chrono::NaiveDate;
use domains::{BackendClient, Identity, ItemCategory, PostKind, SignUpMetadata};
use services::{CommentService, PostDraft, PostService, SyncOptions};
use tracing::info;

pub const DEMO_PASSWORD: &str = "lostboard-demo";

pub struct Seeded {
    pub owner: Identity,
    pub finder: Identity,
}

struct Notice {
    kind: PostKind,
    title: &'static str,
    description: &'static str,
    category: ItemCategory,
    location: &'static str,
    day: u32,
}

const OWNER_NOTICES: [Notice; 3] = [
    Notice {
        kind: PostKind::Lost,
        title: "白色校园卡",
        description: "卡套是蓝色的，背面贴了贴纸",
        category: ItemCategory::IdCard,
        location: "图书馆",
        day: 3,
    },
    Notice {
        kind: PostKind::Lost,
        title: "黑色雨伞",
        description: "",
        category: ItemCategory::Daily,
        location: "第一教学楼",
        day: 5,
    },
    Notice {
        kind: PostKind::Found,
        title: "蓝牙耳机",
        description: "在座位上捡到，充电盒有划痕",
        category: ItemCategory::Electronic,
        location: "学生食堂",
        day: 7,
    },
];

async fn register(client: &BackendClient, email: &str, nickname: &str) -> anyhow::Result<Identity> {
    let metadata = SignUpMetadata {
        nickname: nickname.to_string(),
        college: "信息学院".to_string(),
    };
    client
        .auth
        .sign_up(email, DEMO_PASSWORD, metadata)
        .await?
        .with_context(|| format!("no identity issued for {email}"))
}

/// Registers two users, publishes the owner's notices and leaves the
/// finder's comments under the first one.
pub async fn run(client: &BackendClient, options: &SyncOptions) -> anyhow::Result<Seeded> {
    let owner = register(client, "owner@lostboard.test", "小林").await?;
    let finder = register(client, "finder@lostboard.test", "热心同学").await?;

    let posts = PostService::new(client, options);
    let mut first = None;
    for notice in &OWNER_NOTICES {
        let mut draft = PostDraft::new(notice.kind);
        draft.title = notice.title.to_string();
        draft.description = notice.description.to_string();
        draft.item_category = Some(notice.category);
        draft.location = notice.location.to_string();
        draft.lost_found_date = NaiveDate::from_ymd_opt(2024, 3, notice.day);
        let published = posts.publish(&owner, draft).await?;
        first.get_or_insert(published.post.id);
    }
    let first = first.context("no notices published")?;

    let comments = CommentService::new(client, options);
    comments.submit(Some(&finder), first, "我好像在三楼见过", false).await?;
    comments.submit(Some(&finder), first, "已经交到服务台了", true).await?;

    info!(posts = OWNER_NOTICES.len(), comments = 2, "demo data seeded");
    Ok(Seeded { owner, finder })
}
