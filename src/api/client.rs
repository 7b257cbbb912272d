// Photosync - Google Photos library synchronizer
// Copyright (C) 2025 Photosync contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP client for the Photos Library API: bearer auth injection, status
//! mapping, and streaming downloads to disk.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::api::auth::TokenProvider;
use crate::api::library::{
    ApiMediaItem, ListMediaItemsRequest, ListMediaItemsResponse, PhotosApi,
};
use crate::error::{Result, SyncError};

/// Photos Library API base
pub const API_BASE_URL: &str = "https://photoslibrary.googleapis.com/v1";

/// The one scope this tool needs
pub const LIBRARY_SCOPE: &str = "photoslibrary.readonly";

/// Authenticated client for the Photos Library API
pub struct PhotosClient {
    http: reqwest::Client,
    base_url: String,
    auth: TokenProvider,
}

impl PhotosClient {
    pub fn new(http: reqwest::Client, auth: TokenProvider) -> Self {
        Self {
            http,
            base_url: API_BASE_URL.to_string(),
            auth,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let token = self.auth.token_for(LIBRARY_SCOPE).await?;
        let response = self
            .http
            .get(format!("{}/{endpoint}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode(response, endpoint).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let token = self.auth.token_for(LIBRARY_SCOPE).await?;
        let response = self
            .http
            .post(format!("{}/{endpoint}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::decode(response, endpoint).await
    }

    /// Map response status onto our error taxonomy, decoding 2xx bodies
    async fn decode<T: DeserializeOwned>(response: reqwest::Response, endpoint: &str) -> Result<T> {
        let status = response.status();
        match status {
            s if s.is_success() => Ok(response.json().await?),
            StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited {
                endpoint: endpoint.to_string(),
                body: response.text().await.ok(),
            }),
            StatusCode::BAD_REQUEST => Err(SyncError::BadRequest {
                endpoint: endpoint.to_string(),
                body: response.text().await.ok(),
            }),
            s => Err(SyncError::api_failed(
                format!("unexpected status {s}"),
                Some(s.as_u16()),
                Some(endpoint.to_string()),
            )),
        }
    }

    /// Stream a (already suffixed) download URL into `dest`
    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let token = self.auth.token_for(LIBRARY_SCOPE).await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::api_failed(
                format!("download returned {status}"),
                Some(status.as_u16()),
                Some(url.to_string()),
            ));
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(dest = %dest.display(), bytes = written, "download written");
        Ok(())
    }
}

#[async_trait]
impl PhotosApi for PhotosClient {
    async fn list_page(&self, request: &ListMediaItemsRequest) -> Result<ListMediaItemsResponse> {
        self.post_json("mediaItems:search", request).await
    }

    async fn media_item(&self, id: &str) -> Result<ApiMediaItem> {
        self.get_json(&format!("mediaItems/{id}")).await
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        self.download_to_file(url, dest).await
    }

    async fn authenticate(&self) -> Result<()> {
        self.auth.token_for(LIBRARY_SCOPE).await?;
        Ok(())
    }
}
