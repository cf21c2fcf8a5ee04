//! HTTP client for the remote release API.
//!
//! Wire protocol: assets are created with a POST of raw bytes under a
//! release (bearer auth, JSON response carrying the new asset id), read with
//! ranged GETs, and removed with DELETE. Rate-limited responses (403/429)
//! are slept through per the policy in [`crate::ratelimit`] and retried
//! transparently; every other error surfaces to the caller.

use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::ratelimit::{backoff_for, unix_now};
use crate::release::ReleaseRotator;
use crate::remote::{Asset, RemoteAssetRef, RemoteStore};

const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";
const MEDIA_TYPE_JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
struct AssetResponse {
    id: u64,
    #[serde(default)]
    name: String,
}

/// [`RemoteStore`] backed by the release HTTP API.
pub struct HttpRemoteStore {
    http: reqwest::blocking::Client,
    rotator: Arc<ReleaseRotator>,
    api_base: String,
    upload_base: String,
}

impl HttpRemoteStore {
    /// Creates a client against the given API and upload hosts.
    pub fn new(rotator: Arc<ReleaseRotator>, api_base: &str, upload_base: &str) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            rotator,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    fn asset_url(&self, aref: &RemoteAssetRef) -> String {
        format!(
            "{}/repos/{}/{}/releases/assets/{}",
            self.api_base, aref.username, aref.repository, aref.remote_id
        )
    }

    /// Sends a request, sleeping through rate-limit responses and retrying.
    fn send_with_backoff<F>(&self, build: F) -> StorageResult<reqwest::blocking::Response>
    where
        F: Fn() -> reqwest::blocking::RequestBuilder,
    {
        loop {
            let response = build()
                .send()
                .map_err(|e| StorageError::Http(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let lookup = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            if let Some(wait) = backoff_for(status, lookup, unix_now()) {
                warn!(status, wait_secs = wait.as_secs(), "rate limited, backing off");
                std::thread::sleep(wait);
                continue;
            }
            return Ok(response);
        }
    }

    fn token_for(&self, username: &str) -> StorageResult<String> {
        self.rotator
            .token_for(username)
            .map(str::to_string)
            .ok_or_else(|| StorageError::MissingToken {
                username: username.to_string(),
            })
    }
}

fn error_from_response(response: reqwest::blocking::Response) -> StorageError {
    let status = response.status().as_u16();
    let message = response.text().unwrap_or_default();
    StorageError::Remote { status, message }
}

impl RemoteStore for HttpRemoteStore {
    fn upload(&self, name: &str, data: &[u8]) -> StorageResult<Asset> {
        let release = self.rotator.next_writable();
        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets?name={}",
            self.upload_base, release.username, release.repository, release.release_id, name
        );

        let body = data.to_vec();
        let response = self.send_with_backoff(|| {
            self.http
                .post(&url)
                .bearer_auth(&release.auth_token)
                .header(reqwest::header::ACCEPT, MEDIA_TYPE_JSON)
                .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE_OCTET_STREAM)
                .body(body.clone())
        })?;

        if response.status().as_u16() != 201 {
            return Err(error_from_response(response));
        }
        let parsed: AssetResponse = response
            .json()
            .map_err(|e| StorageError::Codec(e.to_string()))?;
        debug!(
            asset = parsed.id,
            release = release.release_id,
            bytes = data.len(),
            "uploaded asset"
        );

        Ok(Asset {
            remote_id: parsed.id,
            name: name.to_string(),
            username: release.username,
            repository: release.repository,
            release_id: release.release_id,
            release_tag: release.release_tag,
            size: data.len() as u64,
            part_number: 0,
        })
    }

    fn open_range(
        &self,
        asset: &Asset,
        start: u64,
        end: u64,
    ) -> StorageResult<Box<dyn Read + Send>> {
        let token = self.token_for(&asset.username)?;
        let url = self.asset_url(&asset.to_ref());

        let response = self.send_with_backoff(|| {
            self.http
                .get(&url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, MEDIA_TYPE_OCTET_STREAM)
                .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end))
        })?;

        match response.status().as_u16() {
            200 | 206 => Ok(Box::new(response)),
            _ => Err(error_from_response(response)),
        }
    }

    fn delete(&self, aref: &RemoteAssetRef) -> StorageResult<()> {
        let token = self.token_for(&aref.username)?;
        let url = self.asset_url(aref);

        let response =
            self.send_with_backoff(|| self.http.delete(&url).bearer_auth(&token))?;
        match response.status().as_u16() {
            204 | 404 => Ok(()),
            _ => Err(error_from_response(response)),
        }
    }

    fn list_assets(&self) -> StorageResult<Vec<RemoteAssetRef>> {
        let mut refs = Vec::new();
        for release in self.rotator.releases() {
            let token = self.token_for(&release.username)?;
            let mut page = 1u32;
            loop {
                let url = format!(
                    "{}/repos/{}/{}/releases/{}/assets?per_page=100&page={}",
                    self.api_base, release.username, release.repository, release.release_id, page
                );
                let response = self.send_with_backoff(|| {
                    self.http
                        .get(&url)
                        .bearer_auth(&token)
                        .header(reqwest::header::ACCEPT, MEDIA_TYPE_JSON)
                })?;
                if !response.status().is_success() {
                    return Err(error_from_response(response));
                }
                let assets: Vec<AssetResponse> = response
                    .json()
                    .map_err(|e| StorageError::Codec(e.to_string()))?;
                let full_page = assets.len() == 100;
                refs.extend(assets.into_iter().map(|a| RemoteAssetRef {
                    remote_id: a.id,
                    name: a.name,
                    username: release.username.clone(),
                    repository: release.repository.clone(),
                    release_id: release.release_id,
                }));
                if !full_page {
                    break;
                }
                page += 1;
            }
        }
        Ok(refs)
    }
}
