//! Webhook sink
//!
//! Pushes the artifact as base64 inside a JSON body. The sink is write-only:
//! nothing can be listed, read back or deleted through it.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use super::{http_client, BackendKind, Entry, Locator, StorageBackend};
use crate::codec::is_gzip;
use crate::error::{VaultError, VaultResult};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    filename: &'a str,
    data: String,
    compressed: bool,
    timestamp: String,
}

pub struct WebhookBackend {
    client: Client,
    url: Option<String>,
}

impl WebhookBackend {
    pub fn new(url: Option<String>, timeout: std::time::Duration) -> VaultResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url,
        })
    }

    fn unsupported(operation: &'static str) -> VaultError {
        VaultError::Unsupported {
            backend: BackendKind::Webhook,
            operation,
        }
    }
}

#[async_trait]
impl StorageBackend for WebhookBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Webhook
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> VaultResult<Locator> {
        let url = self
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| VaultError::Configuration("WEBHOOK_BACKUP_URL is not set".into()))?;

        let payload = WebhookPayload {
            filename: name,
            compressed: is_gzip(&bytes),
            data: STANDARD.encode(&bytes),
            timestamp: Utc::now().to_rfc3339(),
        };

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Webhook, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VaultError::unavailable(
                BackendKind::Webhook,
                format!("webhook responded {}", response.status()),
            ));
        }

        info!(filename = name, "Pushed artifact to webhook");
        Ok(Locator::new(BackendKind::Webhook, name))
    }

    async fn list(&self, _prefix: &str) -> VaultResult<Vec<Entry>> {
        Err(Self::unsupported("list"))
    }

    async fn get(&self, _locator: &Locator) -> VaultResult<Vec<u8>> {
        Err(Self::unsupported("get"))
    }

    async fn delete(&self, _locator: &Locator) -> VaultResult<bool> {
        Err(Self::unsupported("delete"))
    }
}
