//! Publishing and managing notices, plus the two post screens built on them.

use crate::fetcher::{FetchOutcome, Fetcher, SyncOptions};
use crate::io::{bounded, decode_row, encode};
use crate::projections::{PostFilter, PostTallies, StatusFilter};
use crate::slices::{OwnPosts, PostFeed};
use crate::uploads::{retain_uploadable, storage_path_from_url, upload_post_images, ImageUpload};
use chrono::NaiveDate;
use domains::{
    BackendClient, BoardError, Collection, Filter, Identity, ItemCategory, NewPost, ObjectStore, Post, PostKind,
    PostStatus, RecordStore, Result, POST_IMAGES_BUCKET,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// The publish form as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub kind: PostKind,
    pub title: String,
    pub description: String,
    pub item_category: Option<ItemCategory>,
    pub location: String,
    pub lost_found_date: Option<NaiveDate>,
    pub images: Vec<ImageUpload>,
}

impl PostDraft {
    pub fn new(kind: PostKind) -> Self {
        Self {
            kind,
            title: String::new(),
            description: String::new(),
            item_category: None,
            location: String::new(),
            lost_found_date: None,
            images: Vec::new(),
        }
    }

    /// Required-field checks, run before anything is uploaded or inserted.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(BoardError::validation("请输入物品名称"));
        }
        if self.location.trim().is_empty() {
            return Err(BoardError::validation("请输入地点"));
        }
        if self.lost_found_date.is_none() {
            return Err(BoardError::validation("请选择日期"));
        }
        Ok(())
    }

    fn into_new_post(self, user_id: Uuid, image_urls: Vec<String>) -> NewPost {
        let description = self.description.trim();
        NewPost {
            user_id,
            kind: self.kind,
            title: self.title.trim().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            item_category: self.item_category,
            location: Some(self.location.trim().to_string()),
            lost_found_date: self.lost_found_date,
            image_urls: (!image_urls.is_empty()).then_some(image_urls),
            status: None,
        }
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub post: Post,
    /// Names of picked images left out for exceeding the size limit.
    pub skipped_images: Vec<String>,
}

/// What a delete did to the post's stored photos.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub images_removed: usize,
    /// Photo URLs whose objects could not be removed.
    pub image_failures: Vec<String>,
}

/// One-shot post commands. Callers refresh the affected fetchers afterwards.
#[derive(Clone)]
pub struct PostService {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl PostService {
    pub fn new(client: &BackendClient, options: &SyncOptions) -> Self {
        Self {
            records: client.records.clone(),
            objects: client.objects.clone(),
            timeout: options.fetch_timeout,
        }
    }

    /// Validates the draft, uploads its photos and inserts the notice.
    pub async fn publish(&self, author: &Identity, draft: PostDraft) -> Result<Published> {
        draft.validate()?;

        let mut draft = draft;
        let (images, skipped_images) = retain_uploadable(std::mem::take(&mut draft.images));
        for name in &skipped_images {
            warn!(file = %name, "image exceeds 5MB; skipped");
        }
        let image_urls = upload_post_images(self.objects.as_ref(), author.id, &images, self.timeout).await?;

        let payload = encode(&draft.into_new_post(author.id, image_urls))?;
        let row = bounded(self.timeout, self.records.insert(Collection::Posts, payload)).await?;
        let post: Post = decode_row(row)?;
        info!(post_id = post.id, kind = post.kind.as_str(), "post published");
        Ok(Published { post, skipped_images })
    }

    /// A single notice with its author, `None` when it does not exist.
    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let row = bounded(
            self.timeout,
            self.records.query_one(Collection::Posts, vec![Filter::eq("id", post_id)]),
        )
        .await?;
        row.map(decode_row).transpose()
    }

    /// Sets the status of a notice owned by `user_id`. Returns whether a row
    /// changed; a non-owner matches nothing.
    pub async fn set_status(&self, user_id: Uuid, post_id: i64, status: PostStatus) -> Result<bool> {
        let rows = bounded(
            self.timeout,
            self.records.update(
                Collection::Posts,
                owner_filters(user_id, post_id),
                json!({ "status": status.as_str() }),
            ),
        )
        .await?;
        let changed = !rows.is_empty();
        if changed {
            info!(post_id, status = status.as_str(), "post status changed");
        } else {
            warn!(post_id, %user_id, "status change matched no owned post");
        }
        Ok(changed)
    }

    pub async fn mark_found(&self, user_id: Uuid, post_id: i64) -> Result<bool> {
        self.set_status(user_id, post_id, PostStatus::Closed).await
    }

    pub async fn reopen(&self, user_id: Uuid, post_id: i64) -> Result<bool> {
        self.set_status(user_id, post_id, PostStatus::Open).await
    }

    /// Deletes a notice owned by `user_id`. Photos are removed first, one by
    /// one; a failed removal is logged and reported but does not stop the
    /// delete. Comments and notifications go with the post on the backend.
    pub async fn delete_post(&self, user_id: Uuid, post_id: i64) -> Result<DeleteReport> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| BoardError::not_found("post", post_id))?;
        if !post.is_owned_by(user_id) {
            return Err(BoardError::backend("只能删除自己发布的信息"));
        }

        let mut report = DeleteReport::default();
        for url in post.images() {
            let Some(path) = storage_path_from_url(url, POST_IMAGES_BUCKET) else {
                warn!(%url, "image url outside the post-images bucket; left in place");
                report.image_failures.push(url.clone());
                continue;
            };
            match bounded(self.timeout, self.objects.remove_object(POST_IMAGES_BUCKET, &path)).await {
                Ok(()) => report.images_removed += 1,
                Err(err) => {
                    warn!(%path, error = %err, "failed to remove post image");
                    report.image_failures.push(url.clone());
                }
            }
        }

        bounded(
            self.timeout,
            self.records.delete(Collection::Posts, owner_filters(user_id, post_id)),
        )
        .await?;
        info!(post_id, images_removed = report.images_removed, "post deleted");
        Ok(report)
    }
}

fn owner_filters(user_id: Uuid, post_id: i64) -> Vec<Filter> {
    vec![Filter::eq("id", post_id), Filter::eq("user_id", user_id.to_string())]
}

/// The home board: open notices under a lost/found/all tab.
pub struct Board {
    feed: Fetcher<PostFeed>,
    posts: PostService,
}

impl Board {
    /// Opens the board on the "all" tab.
    pub async fn open(client: &BackendClient, options: &SyncOptions) -> Self {
        Self {
            feed: Fetcher::initialize(client, PostFeed::default(), options).await,
            posts: PostService::new(client, options),
        }
    }

    /// Switches tab. `None` is "all"; this changes the server-side query.
    pub async fn select_tab(&self, kind: Option<PostKind>) -> FetchOutcome {
        self.feed.set_params(PostFeed { kind }).await
    }

    pub fn tab(&self) -> Option<PostKind> {
        self.feed.params().kind
    }

    /// Cached notices narrowed by `filter`, newest first.
    pub fn visible(&self, filter: &PostFilter) -> Vec<Post> {
        let posts = self.feed.items();
        filter.apply(&posts).into_iter().cloned().collect()
    }

    pub async fn publish(&self, author: &Identity, draft: PostDraft) -> Result<Published> {
        let published = self.posts.publish(author, draft).await?;
        self.feed.refresh().await;
        Ok(published)
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.feed.refresh().await
    }

    pub fn feed(&self) -> &Fetcher<PostFeed> {
        &self.feed
    }

    pub async fn close(&self) {
        self.feed.teardown().await;
    }
}

/// A user's own notices with their tallies and management actions.
pub struct MyPosts {
    user_id: Uuid,
    fetcher: Fetcher<OwnPosts>,
    posts: PostService,
}

impl MyPosts {
    pub async fn open(client: &BackendClient, user_id: Uuid, options: &SyncOptions) -> Self {
        Self {
            user_id,
            fetcher: Fetcher::initialize(client, OwnPosts { user_id }, options).await,
            posts: PostService::new(client, options),
        }
    }

    pub fn tallies(&self) -> PostTallies {
        PostTallies::from_posts(&self.fetcher.items())
    }

    pub fn visible(&self, status: StatusFilter) -> Vec<Post> {
        let posts = self.fetcher.items();
        status.apply(&posts).into_iter().cloned().collect()
    }

    pub async fn mark_found(&self, post_id: i64) -> Result<bool> {
        let changed = self.posts.mark_found(self.user_id, post_id).await?;
        self.fetcher.refresh().await;
        Ok(changed)
    }

    pub async fn reopen(&self, post_id: i64) -> Result<bool> {
        let changed = self.posts.reopen(self.user_id, post_id).await?;
        self.fetcher.refresh().await;
        Ok(changed)
    }

    pub async fn delete(&self, post_id: i64) -> Result<DeleteReport> {
        let report = self.posts.delete_post(self.user_id, post_id).await?;
        self.fetcher.refresh().await;
        Ok(report)
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.fetcher.refresh().await
    }

    pub fn fetcher(&self) -> &Fetcher<OwnPosts> {
        &self.fetcher
    }

    pub async fn close(&self) {
        self.fetcher.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockAuthGateway, MockChangeFeed, MockObjectStore, MockRecordStore};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn service(records: MockRecordStore, objects: MockObjectStore) -> PostService {
        let client = BackendClient::new(
            Arc::new(records),
            Arc::new(MockChangeFeed::new()),
            Arc::new(objects),
            Arc::new(MockAuthGateway::new()),
        );
        PostService::new(&client, &SyncOptions::default())
    }

    fn author() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: None,
        }
    }

    fn stored_post(id: i64, user_id: Uuid, image_urls: Option<Vec<&str>>) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "type": "lost",
            "title": "雨伞",
            "description": null,
            "item_category": null,
            "location": "食堂",
            "lost_found_date": "2024-03-01",
            "image_urls": image_urls,
            "status": "open",
            "created_at": "2024-03-01T08:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_invalid_draft_never_reaches_backend() {
        let mut records = MockRecordStore::new();
        records.expect_insert().never();
        let mut draft = PostDraft::new(PostKind::Lost);
        draft.title = "钥匙".into();
        draft.location = "  ".into();

        let err = service(records, MockObjectStore::new())
            .publish(&author(), draft)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(m) if m == "请输入地点"));
    }

    #[tokio::test]
    async fn test_publish_without_images_omits_status() {
        let user = author();
        let user_id = user.id;
        let mut records = MockRecordStore::new();
        records
            .expect_insert()
            .withf(|collection, record| {
                *collection == Collection::Posts
                    && record.get("status").is_none()
                    && record["image_urls"].is_null()
                    && record["description"].is_null()
                    && record["title"] == "白色校园卡"
            })
            .times(1)
            .returning(move |_, _| Ok(stored_post(7, user_id, None)));

        let mut draft = PostDraft::new(PostKind::Lost);
        draft.title = " 白色校园卡 ".into();
        draft.location = "图书馆".into();
        draft.lost_found_date = NaiveDate::from_ymd_opt(2024, 1, 1);

        let published = service(records, MockObjectStore::new())
            .publish(&user, draft)
            .await
            .unwrap();
        assert_eq!(published.post.id, 7);
        assert!(published.skipped_images.is_empty());
    }

    #[tokio::test]
    async fn test_non_owner_status_change_reports_no_effect() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let mut records = MockRecordStore::new();
        records
            .expect_update()
            .withf(move |_, filters, patch| {
                filters.contains(&Filter::eq("user_id", stranger.to_string())) && patch["status"] == "closed"
            })
            .returning(|_, _, _| Ok(Vec::new()));
        records
            .expect_update()
            .withf(move |_, filters, _| filters.contains(&Filter::eq("user_id", owner.to_string())))
            .returning(|_, _, patch| Ok(vec![patch]));

        let posts = service(records, MockObjectStore::new());
        assert!(!posts.mark_found(stranger, 3).await.unwrap());
        assert!(posts.mark_found(owner, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_survives_image_removal_failure() {
        let owner = Uuid::new_v4();
        let base = "https://demo/storage/v1/object/public/post-images";
        let urls = vec![format!("{base}/{owner}/a.jpg"), format!("{base}/{owner}/b.jpg")];
        let stored = stored_post(5, owner, Some(urls.iter().map(String::as_str).collect()));

        let mut seq = Sequence::new();
        let mut records = MockRecordStore::new();
        records
            .expect_query_one()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(stored.clone())));
        let mut objects = MockObjectStore::new();
        objects
            .expect_remove_object()
            .with(eq(POST_IMAGES_BUCKET), eq(format!("{owner}/a.jpg")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(BoardError::backend("object locked")));
        objects
            .expect_remove_object()
            .with(eq(POST_IMAGES_BUCKET), eq(format!("{owner}/b.jpg")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        records
            .expect_delete()
            .withf(move |collection, filters| {
                *collection == Collection::Posts && filters.contains(&Filter::eq("user_id", owner.to_string()))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let report = service(records, objects).delete_post(owner, 5).await.unwrap();
        assert_eq!(report.images_removed, 1);
        assert_eq!(report.image_failures, vec![urls[0].clone()]);
    }

    #[tokio::test]
    async fn test_delete_missing_post_is_not_found() {
        let mut records = MockRecordStore::new();
        records.expect_query_one().returning(|_, _| Ok(None));
        records.expect_delete().never();

        let err = service(records, MockObjectStore::new())
            .delete_post(Uuid::new_v4(), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound { entity: "post", .. }));
    }
}
