//! Photo and avatar uploads to the `post-images` bucket.
//!
//! Objects live under `{user_id}/{file}`; post photos get a random file name,
//! avatars a fixed `avatar.{ext}` that is overwritten on every change.

use crate::io::bounded;
use bytes::Bytes;
use domains::{ObjectStore, Result, UploadOptions, MAX_IMAGE_BYTES, POST_IMAGES_BUCKET};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Cache lifetime requested for avatars, in seconds.
pub const AVATAR_CACHE_CONTROL: &str = "3600";

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    pub fn is_oversized(&self) -> bool {
        self.data.len() > MAX_IMAGE_BYTES
    }

    /// Extension after the last dot, or the whole name if there is none.
    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or_default()
    }

    fn content_type(&self) -> Option<String> {
        mime_guess::from_path(&self.file_name)
            .first()
            .map(|m| m.essence_str().to_string())
    }
}

/// Splits picked files into those within the size limit and the names of
/// those that were dropped.
pub fn retain_uploadable(images: Vec<ImageUpload>) -> (Vec<ImageUpload>, Vec<String>) {
    let (kept, dropped): (Vec<_>, Vec<_>) = images.into_iter().partition(|i| !i.is_oversized());
    (kept, dropped.into_iter().map(|i| i.file_name).collect())
}

/// Uploads post photos in order and returns their public URLs.
/// The first failure aborts the batch.
pub async fn upload_post_images(
    objects: &dyn ObjectStore,
    user_id: Uuid,
    images: &[ImageUpload],
    timeout: Duration,
) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(images.len());
    for image in images {
        let path = format!("{user_id}/{}.{}", Uuid::new_v4().simple(), image.extension());
        let options = UploadOptions {
            content_type: image.content_type(),
            ..UploadOptions::default()
        };
        let stored = bounded(
            timeout,
            objects.upload_object(POST_IMAGES_BUCKET, &path, image.data.clone(), options),
        )
        .await?;
        debug!(path = %stored, bytes = image.data.len(), "uploaded post image");
        urls.push(objects.public_url(POST_IMAGES_BUCKET, &stored));
    }
    Ok(urls)
}

/// Uploads (or replaces) a user's avatar and returns its public URL.
pub async fn upload_avatar(
    objects: &dyn ObjectStore,
    user_id: Uuid,
    image: &ImageUpload,
    timeout: Duration,
) -> Result<String> {
    let path = format!("{user_id}/avatar.{}", image.extension());
    let options = UploadOptions {
        upsert: true,
        cache_control: Some(AVATAR_CACHE_CONTROL.to_string()),
        content_type: image.content_type(),
    };
    let stored = bounded(
        timeout,
        objects.upload_object(POST_IMAGES_BUCKET, &path, image.data.clone(), options),
    )
    .await?;
    Ok(objects.public_url(POST_IMAGES_BUCKET, &stored))
}

/// Recovers the object path from a public URL of `bucket`
/// (everything after `/{bucket}/`, query string excluded).
pub fn storage_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let marker = format!("/{bucket}/");
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let (_, path) = without_query.split_once(&marker)?;
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockObjectStore;
    use mockall::predicate::eq;

    #[test]
    fn test_storage_path_from_public_url() {
        let url = "https://demo.supabase.co/storage/v1/object/public/post-images/u1/abc.jpg?t=1";
        assert_eq!(storage_path_from_url(url, "post-images").as_deref(), Some("u1/abc.jpg"));
        assert_eq!(storage_path_from_url("https://elsewhere/x.png", "post-images"), None);
        assert_eq!(storage_path_from_url("https://h/post-images/", "post-images"), None);
    }

    #[test]
    fn test_oversized_images_are_dropped() {
        let small = ImageUpload::new("a.png", vec![0u8; 10]);
        let big = ImageUpload::new("huge.jpg", vec![0u8; MAX_IMAGE_BYTES + 1]);
        let (kept, dropped) = retain_uploadable(vec![small.clone(), big]);
        assert_eq!(kept, vec![small]);
        assert_eq!(dropped, vec!["huge.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_avatar_upload_overwrites_fixed_path() {
        let user = Uuid::new_v4();
        let expected_path = format!("{user}/avatar.png");
        let mut objects = MockObjectStore::new();
        objects
            .expect_upload_object()
            .withf(move |bucket, path, _, options| {
                bucket == POST_IMAGES_BUCKET
                    && path == expected_path
                    && options.upsert
                    && options.cache_control.as_deref() == Some("3600")
                    && options.content_type.as_deref() == Some("image/png")
            })
            .times(1)
            .returning(|_, path, _, _| Ok(path.to_string()));
        objects
            .expect_public_url()
            .with(eq(POST_IMAGES_BUCKET), eq(format!("{user}/avatar.png")))
            .returning(|bucket, path| format!("https://cdn/{bucket}/{path}"));

        let url = upload_avatar(&objects, user, &ImageUpload::new("me.png", vec![1, 2, 3]), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(url, format!("https://cdn/post-images/{user}/avatar.png"));
    }
}
