//! S3-compatible object store backend
//!
//! Artifacts are objects under a key prefix (`backups/` by default). The
//! client is built per call from settings so a missing bucket or credential
//! surfaces as a configuration error only when the backend is used.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::{ensure_kind, sort_newest_first, BackendKind, Entry, Locator, StorageBackend};
use crate::config::settings::ObjectStoreSettings;
use crate::error::{VaultError, VaultResult};

pub struct ObjectStoreBackend {
    settings: ObjectStoreSettings,
    timeout: Duration,
}

impl ObjectStoreBackend {
    pub fn new(settings: ObjectStoreSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    /// Build a client and return it with the bucket name
    fn client(&self) -> VaultResult<(Client, String)> {
        let missing = |what: &str| VaultError::Configuration(format!("{} is not set", what));
        let bucket = self
            .settings
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| missing("AWS_BACKUP_BUCKET_NAME"))?;
        let access_key = self
            .settings
            .access_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing("AWS_ACCESS_KEY_ID"))?;
        let secret_key = self
            .settings
            .secret_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing("AWS_SECRET_ACCESS_KEY"))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "centervault");

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .credentials_provider(credentials)
            .region(Region::new(self.settings.region.clone()))
            .force_path_style(self.settings.path_style);

        if let Some(endpoint) = &self.settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok((Client::from_conf(builder.build()), bucket))
    }

    fn key_for(&self, name: &str) -> String {
        if name.starts_with(&self.settings.prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.settings.prefix, name)
        }
    }

    /// Run one SDK call under the configured timeout
    async fn bounded<T, E, F>(&self, call: F) -> VaultResult<Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            VaultError::unavailable(
                BackendKind::ObjectStore,
                format!("timed out after {}s", self.timeout.as_secs()),
            )
        })
    }
}

fn unavailable<E: std::error::Error>(err: E) -> VaultError {
    VaultError::unavailable(
        BackendKind::ObjectStore,
        DisplayErrorContext(err).to_string(),
    )
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<Locator> {
        let (client, bucket) = self.client()?;
        let key = self.key_for(name);

        let request = client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .content_type(content_type)
            .metadata("backup-type", "centervault-data")
            .metadata("timestamp", Utc::now().to_rfc3339())
            .body(ByteStream::from(bytes))
            .send();
        self.bounded(request).await?.map_err(unavailable)?;

        info!(bucket = %bucket, key = %key, "Uploaded object");
        Ok(Locator::new(BackendKind::ObjectStore, key))
    }

    async fn list(&self, prefix: &str) -> VaultResult<Vec<Entry>> {
        let (client, bucket) = self.client()?;
        let full_prefix = format!("{}{}", self.settings.prefix, prefix);

        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let request = client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&full_prefix)
                .set_continuation_token(continuation.take())
                .send();
            let page = self.bounded(request).await?.map_err(unavailable)?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let name = key
                    .strip_prefix(&self.settings.prefix)
                    .unwrap_or(key)
                    .to_string();
                if name.is_empty() || name.contains('/') {
                    continue;
                }
                entries.push(Entry {
                    name,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    modified_at: object.last_modified().and_then(to_chrono),
                    locator: Locator::new(BackendKind::ObjectStore, key),
                    download_count: None,
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        sort_newest_first(&mut entries);
        debug!(bucket = %bucket, count = entries.len(), "Listed objects");
        Ok(entries)
    }

    async fn get(&self, locator: &Locator) -> VaultResult<Vec<u8>> {
        ensure_kind(BackendKind::ObjectStore, locator)?;
        let (client, bucket) = self.client()?;
        let key = self.key_for(&locator.reference);

        let request = client.get_object().bucket(&bucket).key(&key).send();
        let response = match self.bounded(request).await? {
            Ok(response) => response,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    return Err(VaultError::backup_not_found(key));
                }
                return Err(unavailable(err));
            }
        };

        let body = self
            .bounded(response.body.collect())
            .await?
            .map_err(|e| VaultError::unavailable(BackendKind::ObjectStore, e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, locator: &Locator) -> VaultResult<bool> {
        ensure_kind(BackendKind::ObjectStore, locator)?;
        let (client, bucket) = self.client()?;
        let key = self.key_for(&locator.reference);

        let head = client.head_object().bucket(&bucket).key(&key).send();
        if let Err(err) = self.bounded(head).await? {
            if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                return Ok(false);
            }
            return Err(unavailable(err));
        }

        let request = client.delete_object().bucket(&bucket).key(&key).send();
        self.bounded(request).await?.map_err(unavailable)?;

        info!(bucket = %bucket, key = %key, "Deleted object");
        Ok(true)
    }
}
