//! Commenting on a notice.

use crate::fetcher::{FetchOutcome, Fetcher, SyncOptions};
use crate::io::{bounded, decode_row, encode};
use crate::slices::CommentThread;
use domains::{BackendClient, BoardError, Collection, Comment, Identity, NewComment, RecordStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct CommentService {
    records: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl CommentService {
    pub fn new(client: &BackendClient, options: &SyncOptions) -> Self {
        Self {
            records: client.records.clone(),
            timeout: options.fetch_timeout,
        }
    }

    /// Posts a comment under `post_id`. Anonymous comments still carry the
    /// author's id; only the rendering hides it.
    pub async fn submit(
        &self,
        author: Option<&Identity>,
        post_id: i64,
        content: &str,
        is_anonymous: bool,
    ) -> Result<Comment> {
        let author = author.ok_or_else(|| BoardError::Unauthenticated("请先登录后评论".into()))?;
        let content = content.trim();
        if content.is_empty() {
            return Err(BoardError::validation("请输入评论内容"));
        }

        let payload = encode(&NewComment {
            post_id,
            user_id: Some(author.id),
            content: content.to_string(),
            is_anonymous,
        })?;
        let row = bounded(self.timeout, self.records.insert(Collection::Comments, payload)).await?;
        let comment: Comment = decode_row(row)?;
        info!(post_id, comment_id = comment.id, is_anonymous, "comment submitted");
        Ok(comment)
    }
}

/// The comment thread under one notice, kept live.
pub struct Discussion {
    post_id: i64,
    thread: Fetcher<CommentThread>,
    comments: CommentService,
}

impl Discussion {
    pub async fn open(client: &BackendClient, post_id: i64, options: &SyncOptions) -> Self {
        Self {
            post_id,
            thread: Fetcher::initialize(client, CommentThread { post_id }, options).await,
            comments: CommentService::new(client, options),
        }
    }

    pub fn post_id(&self) -> i64 {
        self.post_id
    }

    /// Cached comments, oldest first.
    pub fn comments(&self) -> Arc<Vec<Comment>> {
        self.thread.items()
    }

    pub async fn submit(&self, author: Option<&Identity>, content: &str, is_anonymous: bool) -> Result<Comment> {
        let comment = self.comments.submit(author, self.post_id, content, is_anonymous).await?;
        self.thread.refresh().await;
        Ok(comment)
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.thread.refresh().await
    }

    pub fn thread(&self) -> &Fetcher<CommentThread> {
        &self.thread
    }

    pub async fn close(&self) {
        self.thread.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockAuthGateway, MockChangeFeed, MockObjectStore, MockRecordStore};
    use serde_json::json;
    use tokio_test::assert_err;
    use uuid::Uuid;

    fn service(records: MockRecordStore) -> CommentService {
        let client = BackendClient::new(
            Arc::new(records),
            Arc::new(MockChangeFeed::new()),
            Arc::new(MockObjectStore::new()),
            Arc::new(MockAuthGateway::new()),
        );
        CommentService::new(&client, &SyncOptions::default())
    }

    #[tokio::test]
    async fn test_signed_out_user_cannot_comment() {
        let mut records = MockRecordStore::new();
        records.expect_insert().never();

        let err = service(records).submit(None, 1, "我见过", false).await.unwrap_err();
        assert!(matches!(err, BoardError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_blank_comment_is_rejected() {
        let mut records = MockRecordStore::new();
        records.expect_insert().never();
        let me = Identity {
            id: Uuid::new_v4(),
            email: None,
        };

        let err = assert_err!(service(records).submit(Some(&me), 1, " \n ", false).await);
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_anonymous_comment_keeps_user_id_but_hides_author() {
        let me = Identity {
            id: Uuid::new_v4(),
            email: None,
        };
        let user_id = me.id;
        let mut records = MockRecordStore::new();
        records
            .expect_insert()
            .withf(move |collection, record| {
                *collection == Collection::Comments
                    && record["user_id"] == json!(user_id)
                    && record["is_anonymous"] == true
                    && record["content"] == "在食堂门口"
            })
            .returning(move |_, record| {
                let mut stored = record;
                stored["id"] = json!(11);
                stored["created_at"] = json!("2024-05-01T10:00:00Z");
                stored["profiles"] = json!({ "nickname": "小王", "avatar_url": "https://a/b.png" });
                Ok(stored)
            });

        let comment = service(records)
            .submit(Some(&me), 4, "  在食堂门口 ", true)
            .await
            .unwrap();
        let byline = comment.author();
        assert_eq!(byline.name, "匿名用户");
        assert!(byline.avatar_url.is_none());
    }
}
