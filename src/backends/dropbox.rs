//! Dropbox backend (files API v2)
//!
//! Snapshots live as plain files under one folder. Uploads overwrite an
//! existing file of the same name. Listing follows the `list_folder` cursor
//! until `has_more` is false.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use super::{
    ensure_kind, http_client, sort_newest_first, BackendKind, Entry, Locator, StorageBackend,
};
use crate::config::settings::DropboxSettings;
use crate::error::{VaultError, VaultResult};

const API_ARG: &str = "Dropbox-API-Arg";

/// `Dropbox-API-Arg` for uploads
#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    #[serde(rename = ".tag", default)]
    tag: String,
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListFolder {
    entries: Vec<FileMetadata>,
    cursor: String,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_summary: String,
}

pub struct DropboxBackend {
    client: Client,
    api_base: String,
    content_base: String,
    folder: String,
    token: Option<String>,
}

impl DropboxBackend {
    pub fn new(settings: &DropboxSettings, timeout: std::time::Duration) -> VaultResult<Self> {
        let folder = format!("/{}", settings.folder.trim_matches('/'));
        Ok(Self {
            client: http_client(timeout)?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            content_base: settings.content_base.trim_end_matches('/').to_string(),
            folder: if folder == "/" { String::new() } else { folder },
            token: settings.token.clone(),
        })
    }

    fn token(&self) -> VaultResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Configuration("DROPBOX_TOKEN is not set".into()))
    }

    fn path_for(&self, name: &str) -> String {
        format!("{}/{}", self.folder, name)
    }

    fn rpc(&self, endpoint: &str, token: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/2/files/{}", self.api_base, endpoint))
            .bearer_auth(token)
    }

    fn content(&self, endpoint: &str, token: &str, arg: String) -> RequestBuilder {
        self.client
            .post(format!("{}/2/files/{}", self.content_base, endpoint))
            .bearer_auth(token)
            .header(API_ARG, arg)
    }

    async fn send(&self, request: RequestBuilder) -> VaultResult<Response> {
        request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Dropbox, e.to_string()))
    }

    /// Endpoint-specific failures come back as 409 with an `error_summary`
    async fn conflict_summary(response: Response) -> String {
        response
            .json::<ApiError>()
            .await
            .map(|e| e.error_summary)
            .unwrap_or_default()
    }

    async fn expect_success(response: Response, action: &str) -> VaultResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(VaultError::unavailable(
            BackendKind::Dropbox,
            format!("{} failed: {} {}", action, status, body.trim()),
        ))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> VaultResult<T> {
        response
            .json()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Dropbox, e.to_string()))
    }

    fn entry(&self, file: FileMetadata) -> Entry {
        let reference = file
            .path_display
            .unwrap_or_else(|| self.path_for(&file.name));
        Entry {
            locator: Locator::new(BackendKind::Dropbox, reference),
            size: file.size,
            modified_at: file.server_modified,
            download_count: None,
            name: file.name,
        }
    }
}

fn is_not_found(summary: &str) -> bool {
    summary.contains("not_found")
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dropbox
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> VaultResult<Locator> {
        let token = self.token()?;
        let path = self.path_for(name);
        let arg = serde_json::to_string(&UploadArg {
            path: &path,
            mode: "overwrite",
            autorename: false,
        })
        .map_err(|e| VaultError::Json(format!("Failed to encode upload argument: {}", e)))?;
        let request = self
            .content("upload", token, arg)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let response = self.send(request).await?;
        let file: FileMetadata =
            Self::decode(Self::expect_success(response, "Uploading file").await?).await?;

        let entry = self.entry(file);
        info!(path = %entry.locator.reference, size = entry.size, "Uploaded to Dropbox");
        Ok(entry.locator)
    }

    async fn list(&self, prefix: &str) -> VaultResult<Vec<Entry>> {
        let token = self.token()?;
        let response = self
            .send(self.rpc("list_folder", token).json(&json!({ "path": self.folder })))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            let summary = Self::conflict_summary(response).await;
            if is_not_found(&summary) {
                debug!(folder = %self.folder, "Dropbox folder does not exist yet");
                return Ok(Vec::new());
            }
            return Err(VaultError::unavailable(
                BackendKind::Dropbox,
                format!("Listing folder failed: {}", summary),
            ));
        }
        let mut page: ListFolder =
            Self::decode(Self::expect_success(response, "Listing folder").await?).await?;

        let mut files = Vec::new();
        loop {
            files.extend(page.entries.into_iter().filter(|f| f.tag == "file"));
            if !page.has_more {
                break;
            }
            let response = self
                .send(
                    self.rpc("list_folder/continue", token)
                        .json(&json!({ "cursor": page.cursor })),
                )
                .await?;
            page = Self::decode(Self::expect_success(response, "Listing folder").await?).await?;
        }

        let mut entries: Vec<Entry> = files
            .into_iter()
            .filter(|f| f.name.starts_with(prefix))
            .map(|f| self.entry(f))
            .collect();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, locator: &Locator) -> VaultResult<Vec<u8>> {
        ensure_kind(BackendKind::Dropbox, locator)?;
        let token = self.token()?;

        let arg = json!({ "path": locator.reference }).to_string();
        let request = self.content("download", token, arg);
        let response = self.send(request).await?;
        if response.status() == StatusCode::CONFLICT {
            let summary = Self::conflict_summary(response).await;
            if is_not_found(&summary) {
                return Err(VaultError::backup_not_found(&locator.reference));
            }
            return Err(VaultError::unavailable(
                BackendKind::Dropbox,
                format!("Downloading file failed: {}", summary),
            ));
        }
        let bytes = Self::expect_success(response, "Downloading file")
            .await?
            .bytes()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Dropbox, e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, locator: &Locator) -> VaultResult<bool> {
        ensure_kind(BackendKind::Dropbox, locator)?;
        let token = self.token()?;

        let response = self
            .send(self.rpc("delete_v2", token).json(&json!({ "path": locator.reference })))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            let summary = Self::conflict_summary(response).await;
            if is_not_found(&summary) {
                return Ok(false);
            }
            return Err(VaultError::unavailable(
                BackendKind::Dropbox,
                format!("Deleting file failed: {}", summary),
            ));
        }
        Self::expect_success(response, "Deleting file").await?;
        info!(path = %locator.reference, "Deleted from Dropbox");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> DropboxBackend {
        let settings = DropboxSettings {
            token: Some("secret".into()),
            folder: "backups/".into(),
            api_base: server.uri(),
            content_base: server.uri(),
        };
        DropboxBackend::new(&settings, Duration::from_secs(5)).unwrap()
    }

    fn file(name: &str, modified: &str) -> serde_json::Value {
        json!({
            ".tag": "file",
            "name": name,
            "path_display": format!("/backups/{}", name),
            "size": 12,
            "server_modified": modified
        })
    }

    #[tokio::test]
    async fn test_put_uploads_with_overwrite() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/upload"))
            .and(header("authorization", "Bearer secret"))
            .and(header(
                API_ARG,
                concat!(
                    r#"{"path":"/backups/backup_20250115_020000.json.gz","#,
                    r#""mode":"overwrite","autorename":false}"#
                ),
            ))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(file("backup_20250115_020000.json.gz", "2025-01-15T02:00:05Z")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let locator = backend(&server)
            .put("backup_20250115_020000.json.gz", vec![1, 2, 3], "application/gzip")
            .await
            .unwrap();
        assert_eq!(locator.backend, BackendKind::Dropbox);
        assert_eq!(locator.reference, "/backups/backup_20250115_020000.json.gz");
    }

    #[tokio::test]
    async fn test_list_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/list_folder"))
            .and(body_json(json!({ "path": "/backups" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    file("backup_20250115_020000.json.gz", "2025-01-15T02:00:05Z"),
                    { ".tag": "folder", "name": "old", "path_display": "/backups/old" }
                ],
                "cursor": "c1",
                "has_more": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/files/list_folder/continue"))
            .and(body_json(json!({ "cursor": "c1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    file("backup_20250116_020000.json.gz", "2025-01-16T02:00:05Z"),
                    file("media_20250116_020000.tar.gz", "2025-01-16T02:00:09Z")
                ],
                "cursor": "c2",
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let entries = backend(&server).list("backup_").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["backup_20250116_020000.json.gz", "backup_20250115_020000.json.gz"]
        );
        assert_eq!(entries[0].size, 12);
    }

    #[tokio::test]
    async fn test_missing_folder_lists_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/list_folder"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error_summary": "path/not_found/..",
                "error": { ".tag": "path" }
            })))
            .mount(&server)
            .await;

        assert!(backend(&server).list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/download"))
            .and(header(API_ARG, r#"{"path":"/backups/backup_1.json"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/files/delete_v2"))
            .and(body_json(json!({ "path": "/backups/backup_1.json" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": file("backup_1.json", "2025-01-15T02:00:05Z")
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/files/delete_v2"))
            .and(body_json(json!({ "path": "/backups/gone.json" })))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error_summary": "path_lookup/not_found/"
            })))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let locator = Locator::new(BackendKind::Dropbox, "/backups/backup_1.json");
        assert_eq!(backend.get(&locator).await.unwrap(), b"{}");
        assert!(backend.delete(&locator).await.unwrap());

        let gone = Locator::new(BackendKind::Dropbox, "/backups/gone.json");
        assert!(!backend.delete(&gone).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let backend = DropboxBackend::new(&DropboxSettings::default(), Duration::from_secs(1))
            .unwrap();
        let err = backend.list("").await.unwrap_err();
        assert!(err.is_configuration());
    }
}
