//! Release-asset backend (GitHub releases API)
//!
//! Writing is two-phase: create a prerelease tagged `backup-<timestamp>`, then
//! upload assets to it. Related artifacts (the media archive) attach to the
//! same release. Deleting removes the whole release.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{
    ensure_kind, http_client, sort_newest_first, BackendKind, Entry, Locator, StorageBackend,
};
use crate::config::settings::ReleaseSettings;
use crate::error::{VaultError, VaultResult};
use crate::models::snapshot::{artifact_timestamp, TIMESTAMP_FORMAT};

const TAG_PREFIX: &str = "backup-";
const ACCEPT: &str = "application/vnd.github.v3+json";
/// Largest page the releases API serves
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    tag_name: String,
    #[serde(default)]
    upload_url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    browser_download_url: String,
    #[serde(default)]
    download_count: Option<u64>,
}

pub struct ReleaseBackend {
    client: Client,
    api_base: String,
    repo: Option<String>,
    token: Option<String>,
    /// release id -> upload URL, for attaching related assets
    upload_urls: DashMap<u64, String>,
}

impl ReleaseBackend {
    pub fn new(settings: &ReleaseSettings, timeout: std::time::Duration) -> VaultResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            repo: settings.repo.clone(),
            token: settings.token.clone(),
            upload_urls: DashMap::new(),
        })
    }

    fn credentials(&self) -> VaultResult<(&str, &str)> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Configuration("GITHUB_TOKEN is not set".into()))?;
        let repo = self
            .repo
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| VaultError::Configuration("GITHUB_BACKUP_REPO is not set".into()))?;
        Ok((token, repo))
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("token {}", token))
            .header(header::ACCEPT, ACCEPT)
    }

    async fn send(&self, request: RequestBuilder) -> VaultResult<Response> {
        request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))
    }

    async fn expect_success(response: Response, action: &str) -> VaultResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(VaultError::unavailable(
            BackendKind::Release,
            format!("{} failed: {} {}", action, status, body.trim()),
        ))
    }

    async fn create_release(&self, name: &str) -> VaultResult<Release> {
        let (token, repo) = self.credentials()?;
        let stamp = artifact_timestamp(name)
            .unwrap_or_else(Utc::now)
            .format(TIMESTAMP_FORMAT)
            .to_string();

        let body = json!({
            "tag_name": format!("{}{}", TAG_PREFIX, stamp),
            "name": format!("Data Backup {}", stamp),
            "body": format!(
                "Automated backup created on {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
            "draft": false,
            "prerelease": true,
        });

        let url = format!("{}/repos/{}/releases", self.api_base, repo);
        let response = self
            .send(self.authorized(self.client.post(url), token).json(&body))
            .await?;
        let release: Release = Self::expect_success(response, "Creating release")
            .await?
            .json()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))?;

        info!(release_id = release.id, tag = %release.tag_name, "Created release");
        self.upload_urls
            .insert(release.id, strip_template(&release.upload_url));
        Ok(release)
    }

    async fn upload_url(&self, release_id: u64) -> VaultResult<String> {
        if let Some(url) = self.upload_urls.get(&release_id) {
            return Ok(url.clone());
        }
        let (token, repo) = self.credentials()?;
        let url = format!("{}/repos/{}/releases/{}", self.api_base, repo, release_id);
        let response = self.send(self.authorized(self.client.get(url), token)).await?;
        let release: Release = Self::expect_success(response, "Fetching release")
            .await?
            .json()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))?;
        let upload = strip_template(&release.upload_url);
        self.upload_urls.insert(release_id, upload.clone());
        Ok(upload)
    }

    async fn upload_asset(
        &self,
        release_id: u64,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> VaultResult<Locator> {
        let (token, _) = self.credentials()?;
        let upload_url = self.upload_url(release_id).await?;

        let request = self
            .client
            .post(upload_url)
            .query(&[("name", name)])
            .header(header::AUTHORIZATION, format!("token {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes);
        let response = self.send(request).await?;
        let asset: Asset = Self::expect_success(response, "Uploading asset")
            .await?
            .json()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))?;

        debug!(release_id, url = %asset.browser_download_url, "Uploaded asset");
        Ok(Locator::new(BackendKind::Release, asset.browser_download_url)
            .with_group(release_id.to_string()))
    }

    /// Every `backup-` release, following pagination until a short page
    async fn releases(&self) -> VaultResult<Vec<Release>> {
        let (token, repo) = self.credentials()?;
        let url = format!("{}/repos/{}/releases", self.api_base, repo);
        let mut releases = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .send(
                    self.authorized(self.client.get(&url), token).query(&[
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ]),
                )
                .await?;
            let batch: Vec<Release> = Self::expect_success(response, "Listing releases")
                .await?
                .json()
                .await
                .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))?;

            let fetched = batch.len();
            debug!(page, fetched, "Fetched release page");
            releases.extend(
                batch
                    .into_iter()
                    .filter(|r| r.tag_name.starts_with(TAG_PREFIX)),
            );
            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(releases)
    }

    /// Remove a release with all of its assets; `false` when it was already gone
    async fn delete_release(&self, release_id: u64) -> VaultResult<bool> {
        let (token, repo) = self.credentials()?;
        let url = format!("{}/repos/{}/releases/{}", self.api_base, repo, release_id);
        let response = self
            .send(self.authorized(self.client.delete(url), token))
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                self.upload_urls.remove(&release_id);
                info!(release_id, "Deleted release");
                Ok(true)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                Self::expect_success(response, "Deleting release").await?;
                Ok(true)
            }
        }
    }
}

/// Upload URLs come back as an RFC 6570 template: `.../assets{?name,label}`
fn strip_template(url: &str) -> String {
    match url.find('{') {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

fn parse_group(locator: &Locator) -> Option<u64> {
    locator.group.as_deref().and_then(|g| g.parse().ok())
}

#[async_trait]
impl StorageBackend for ReleaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Release
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<Locator> {
        let release = self.create_release(name).await?;
        match self.upload_asset(release.id, name, bytes, content_type).await {
            Ok(locator) => Ok(locator),
            Err(e) => {
                // An asset-less release is invisible to list and retention
                if let Err(cleanup) = self.delete_release(release.id).await {
                    warn!(
                        release_id = release.id,
                        error = %cleanup,
                        "Failed to remove empty release"
                    );
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put_related(
        &self,
        anchor: &Locator,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> VaultResult<Locator> {
        match parse_group(anchor) {
            Some(release_id) => {
                self.upload_asset(release_id, name, bytes, content_type)
                    .await
            }
            None => self.put(name, bytes, content_type).await,
        }
    }

    async fn list(&self, prefix: &str) -> VaultResult<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .releases()
            .await?
            .into_iter()
            .flat_map(|release| {
                let id = release.id.to_string();
                let created = release.created_at;
                release.assets.into_iter().map(move |asset| Entry {
                    modified_at: asset.updated_at.or(created),
                    locator: Locator::new(BackendKind::Release, asset.browser_download_url)
                        .with_group(id.clone()),
                    size: asset.size,
                    download_count: asset.download_count,
                    name: asset.name,
                })
            })
            .filter(|e| e.name.starts_with(prefix))
            .collect();

        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, locator: &Locator) -> VaultResult<Vec<u8>> {
        ensure_kind(BackendKind::Release, locator)?;
        let (token, _) = self.credentials()?;

        let request = self
            .client
            .get(&locator.reference)
            .header(header::AUTHORIZATION, format!("token {}", token))
            .header(header::ACCEPT, "application/octet-stream");
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VaultError::backup_not_found(&locator.reference));
        }
        let bytes = Self::expect_success(response, "Downloading asset")
            .await?
            .bytes()
            .await
            .map_err(|e| VaultError::unavailable(BackendKind::Release, e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, locator: &Locator) -> VaultResult<bool> {
        ensure_kind(BackendKind::Release, locator)?;
        self.credentials()?;

        let release_id = match parse_group(locator) {
            Some(id) => id,
            None => {
                let found = self
                    .list("")
                    .await?
                    .into_iter()
                    .find(|e| e.locator.reference == locator.reference);
                match found.as_ref().and_then(|e| parse_group(&e.locator)) {
                    Some(id) => id,
                    None => return Ok(false),
                }
            }
        };

        self.delete_release(release_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> ReleaseBackend {
        let settings = ReleaseSettings {
            repo: Some("owner/backups".into()),
            token: Some("secret".into()),
            api_base: server.uri(),
        };
        ReleaseBackend::new(&settings, Duration::from_secs(5)).unwrap()
    }

    fn release_body(server: &MockServer, id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "tag_name": "backup-20250115_020000",
            "upload_url": format!("{}/uploads/{}/assets{{?name,label}}", server.uri(), id),
            "created_at": "2025-01-15T02:00:00Z",
            "assets": []
        })
    }

    #[test]
    fn test_strip_template() {
        assert_eq!(
            strip_template("https://uploads.github.com/repos/o/r/releases/1/assets{?name,label}"),
            "https://uploads.github.com/repos/o/r/releases/1/assets"
        );
        assert_eq!(strip_template("https://x/assets"), "https://x/assets");
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let settings = ReleaseSettings {
            repo: Some("owner/backups".into()),
            token: None,
            api_base: "http://127.0.0.1:9".into(),
        };
        let backend = ReleaseBackend::new(&settings, Duration::from_secs(1)).unwrap();
        let err = backend
            .put("backup_20250115_020000.json.gz", vec![1], "application/gzip")
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_put_creates_release_and_uploads() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/repos/owner/backups/releases"))
            .and(header("authorization", "token secret"))
            .and(header("accept", ACCEPT))
            .respond_with(ResponseTemplate::new(201).set_body_json(release_body(&server, 42)))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/uploads/42/assets"))
            .and(query_param("name", "backup_20250115_020000.json.gz"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "backup_20250115_020000.json.gz",
                "size": 3,
                "browser_download_url":
                    format!("{}/download/backup_20250115_020000.json.gz", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/uploads/42/assets"))
            .and(query_param("name", "media_20250115_020000.tar.gz"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "media_20250115_020000.tar.gz",
                "size": 2,
                "browser_download_url":
                    format!("{}/download/media_20250115_020000.tar.gz", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let data = backend
            .put("backup_20250115_020000.json.gz", vec![1, 2, 3], "application/gzip")
            .await
            .unwrap();
        assert_eq!(data.group.as_deref(), Some("42"));

        let media = backend
            .put_related(&data, "media_20250115_020000.tar.gz", vec![9, 9], "application/gzip")
            .await
            .unwrap();
        assert_eq!(media.group.as_deref(), Some("42"));
        assert!(media.reference.ends_with("media_20250115_020000.tar.gz"));
    }

    #[tokio::test]
    async fn test_list_filters_backup_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/backups/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 1,
                    "tag_name": "backup-20250115_020000",
                    "upload_url": "",
                    "assets": [{
                        "name": "backup_20250115_020000.json.gz",
                        "size": 10,
                        "updated_at": "2025-01-15T02:00:05Z",
                        "browser_download_url": "https://example.invalid/a",
                        "download_count": 3
                    }]
                },
                {
                    "id": 2,
                    "tag_name": "v1.0.0",
                    "upload_url": "",
                    "assets": [{
                        "name": "backup_other.json",
                        "size": 1,
                        "browser_download_url": "https://example.invalid/b"
                    }]
                }
            ])))
            .mount(&server)
            .await;

        let entries = backend(&server).list("backup_").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "backup_20250115_020000.json.gz");
        assert_eq!(entries[0].download_count, Some(3));
        assert_eq!(entries[0].locator.group.as_deref(), Some("1"));
    }

    fn release_with_asset(id: u64, asset_name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "tag_name": format!("backup-{}", id),
            "upload_url": "",
            "assets": [{
                "name": asset_name,
                "size": 10,
                "browser_download_url": format!("https://example.invalid/{}", asset_name)
            }]
        })
    }

    #[tokio::test]
    async fn test_list_follows_pages_and_retention_sees_old_releases() {
        let server = MockServer::start().await;

        let recent: Vec<serde_json::Value> = (0..100u64)
            .map(|i| {
                let name = format!("backup_20260330_{:02}{:02}00.json.gz", i / 60, i % 60);
                release_with_asset(1000 + i, &name)
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/repos/owner/backups/releases"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(recent))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/backups/releases"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                release_with_asset(7, "backup_20250101_020000.json.gz")
            ])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/owner/backups/releases/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = std::sync::Arc::new(backend(&server));
        let entries = backend.list("").await.unwrap();
        assert_eq!(entries.len(), 101);
        assert!(entries
            .iter()
            .any(|e| e.name == "backup_20250101_020000.json.gz"));

        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 31, 12, 0, 0).unwrap();
        let report = crate::backup::RetentionJob::new(backend, 30)
            .run_at(now)
            .await
            .unwrap();
        assert_eq!(report.examined, 101);
        assert_eq!(report.deleted, vec!["backup_20250101_020000.json.gz".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_upload_removes_empty_release() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/backups/releases"))
            .respond_with(ResponseTemplate::new(201).set_body_json(release_body(&server, 42)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/uploads/42/assets"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/owner/backups/releases/42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server)
            .put("backup_20250115_020000.json.gz", vec![1], "application/gzip")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_get_downloads_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/backup_1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}".to_vec()))
            .mount(&server)
            .await;

        let locator = Locator::new(
            BackendKind::Release,
            format!("{}/download/backup_1.json", server.uri()),
        );
        assert_eq!(backend(&server).get(&locator).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_delete_removes_release() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/owner/backups/releases/42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let locator =
            Locator::new(BackendKind::Release, "https://example.invalid/a").with_group("42");
        assert!(backend(&server).delete(&locator).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/backups/releases"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .put("backup_20250115_020000.json.gz", vec![1], "application/gzip")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
