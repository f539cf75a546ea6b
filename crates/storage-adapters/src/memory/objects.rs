use super::MemoryBackend;
use async_trait::async_trait;
use bytes::Bytes;
use domains::{BoardError, ObjectStore, Result, UploadOptions};
use tracing::debug;

/// An uploaded object with the headers it was stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

fn key(bucket: &str, path: &str) -> (String, String) {
    (bucket.to_string(), path.trim_start_matches('/').to_string())
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload_object(&self, bucket: &str, path: &str, data: Bytes, options: UploadOptions) -> Result<String> {
        let key = key(bucket, path);
        if !options.upsert && self.objects.contains_key(&key) {
            return Err(BoardError::backend("The resource already exists"));
        }
        debug!(bucket, path = %key.1, bytes = data.len(), "object stored");
        let stored_path = key.1.clone();
        self.objects.insert(
            key,
            StoredObject {
                data,
                content_type: options.content_type,
                cache_control: options.cache_control,
            },
        );
        Ok(stored_path)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }

    async fn remove_object(&self, bucket: &str, path: &str) -> Result<()> {
        let key = key(bucket, path);
        if self.failing_removals.contains(&key.1) {
            return Err(BoardError::backend(format!("could not remove {bucket}/{}", key.1)));
        }
        if self.objects.remove(&key).is_some() {
            debug!(bucket, path = %key.1, "object removed");
        }
        Ok(())
    }
}

impl MemoryBackend {
    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects.get(&key(bucket, path)).map(|o| o.value().clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Makes every later removal of `path` fail, for exercising partial
    /// cleanup.
    pub fn fail_removal_of(&self, path: impl Into<String>) {
        self.failing_removals.insert(path.into());
    }
}
