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

//! Library catalogue: wire types for the media items endpoints, item
//! normalization into [`MediaRecord`]s, and the paginated full-library walk.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manifest::{Manifest, MediaKind, MediaMetadata, MediaRecord};

/// Items requested per search page (API maximum)
pub const PAGE_SIZE: i32 = 100;

/// Request body for `mediaItems:search`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMediaItemsRequest {
    pub page_size: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    pub filters: SearchFilters,
}

impl ListMediaItemsRequest {
    /// Page request covering the whole library, archived items included
    pub fn page(page_token: Option<String>) -> Self {
        Self {
            page_size: PAGE_SIZE,
            page_token,
            filters: SearchFilters {
                include_archived_media: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub include_archived_media: bool,
}

/// One page of search results
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMediaItemsResponse {
    #[serde(default)]
    pub media_items: Vec<ApiMediaItem>,
    /// Absent on the final page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A media item as the API returns it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMediaItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub media_metadata: ApiMediaMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMediaMetadata {
    /// RFC 3339 timestamp
    #[serde(default)]
    pub creation_time: String,
    /// Dimensions arrive as decimal strings
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub video: Option<ApiVideoMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVideoMetadata {
    #[serde(default)]
    pub status: Option<String>,
}

/// The remote API surface the fetcher and scheduler run against.
///
/// The production implementation is [`PhotosClient`](super::client::PhotosClient);
/// tests substitute in-memory stubs.
#[async_trait]
pub trait PhotosApi: Send + Sync {
    /// Fetch one page of the library catalogue
    async fn list_page(&self, request: &ListMediaItemsRequest) -> Result<ListMediaItemsResponse>;

    /// Fetch a single media item, yielding a fresh `base_url`
    async fn media_item(&self, id: &str) -> Result<ApiMediaItem>;

    /// Stream a download URL's bytes to `dest`
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<()>;

    /// Make sure credentials are usable before a pass begins. Interactive
    /// implementations may block on user input here.
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }
}

/// Replace characters that are awkward in filenames
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Normalize an API item into our manifest record.
///
/// `now` becomes the record's `last_checked_at`; `downloaded` carries over the
/// prior local state for items we already know.
pub fn normalize_item(item: &ApiMediaItem, now: i64, downloaded: bool) -> MediaRecord {
    let creation_time = match chrono::DateTime::parse_from_rfc3339(&item.media_metadata.creation_time)
    {
        Ok(ts) => ts.timestamp(),
        Err(_) => {
            if !item.media_metadata.creation_time.is_empty() {
                warn!(
                    id = %item.id,
                    raw = %item.media_metadata.creation_time,
                    "unparseable creation time, storing zero"
                );
            }
            0
        }
    };

    let (width, height) = match (&item.media_metadata.width, &item.media_metadata.height) {
        (Some(w), Some(h)) => (w.parse::<i64>().ok(), h.parse::<i64>().ok()),
        _ => (None, None),
    };

    let video_ready = item
        .media_metadata
        .video
        .as_ref()
        .map(|v| v.status.as_deref() == Some("READY"));

    let (mime_kind, extension) = match item.mime_type.split_once('/') {
        Some((kind, ext)) => (kind, ext.to_string()),
        None => ("image", String::from("bin")),
    };
    let kind = MediaKind::from_mime_kind(mime_kind);

    let stem = sanitize_filename(item.filename.trim());
    let stem = match stem.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base.to_string(),
        _ if !stem.is_empty() => stem,
        _ => item.id.clone(),
    };
    let filename = format!("{stem}.{extension}");

    MediaRecord {
        id: item.id.clone(),
        url: item.base_url.clone(),
        filename,
        kind,
        extension,
        metadata: MediaMetadata {
            creation_time,
            width,
            height,
            video_ready,
        },
        last_checked_at: now,
        downloaded,
    }
}

/// Walk the entire library and merge every item into `manifest`.
///
/// Known items get refreshed metadata and URLs but keep their `downloaded`
/// flag; new items enter in API order. Scan timing lands in the manifest
/// stats on success. A failed page aborts the walk with `stats` untouched.
pub async fn fetch_library<A: PhotosApi + ?Sized>(api: &A, manifest: &mut Manifest) -> Result<()> {
    let started_at = chrono::Utc::now().timestamp();
    let mut page_token: Option<String> = None;
    let mut pages = 0u32;
    let mut seen = 0u64;

    loop {
        let request = ListMediaItemsRequest::page(page_token.take());
        let response = api.list_page(&request).await?;
        pages += 1;

        let now = chrono::Utc::now().timestamp();
        for item in &response.media_items {
            if item.id.is_empty() {
                warn!("skipping media item without id");
                continue;
            }
            seen += 1;
            let downloaded = manifest
                .media
                .get(&item.id)
                .map(|existing| existing.downloaded)
                .unwrap_or(false);
            manifest
                .media
                .insert(item.id.clone(), normalize_item(item, now, downloaded));
        }
        debug!(pages, page_items = response.media_items.len(), "library page merged");

        match response.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let finished_at = chrono::Utc::now().timestamp();
    manifest.stats.last_check.started_check_at = started_at;
    manifest.stats.last_check.finished_check_at = finished_at;
    manifest.stats.last_check.time_taken = finished_at - started_at;
    manifest.stats.items_found = seen;

    info!(
        pages,
        items = seen,
        total = manifest.media.len(),
        "library scan complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn item(id: &str, mime: &str) -> ApiMediaItem {
        ApiMediaItem {
            id: id.to_string(),
            base_url: format!("https://lh3.example.com/{id}"),
            filename: format!("IMG_{id}.jpg"),
            mime_type: mime.to_string(),
            media_metadata: ApiMediaMetadata {
                creation_time: "2023-06-01T12:00:00Z".to_string(),
                width: Some("4000".to_string()),
                height: Some("3000".to_string()),
                video: None,
            },
        }
    }

    #[test]
    fn video_mime_maps_to_video_kind_and_extension() {
        let mut api_item = item("v1", "video/mp4");
        api_item.media_metadata.video = Some(ApiVideoMetadata {
            status: Some("READY".to_string()),
        });
        let record = normalize_item(&api_item, 100, false);
        assert_eq!(record.kind, MediaKind::Video);
        assert_eq!(record.extension, "mp4");
        assert_eq!(record.filename, "IMG_v1.mp4");
        assert_eq!(record.metadata.video_ready, Some(true));
    }

    #[test]
    fn video_status_tri_state() {
        let mut api_item = item("v2", "video/mp4");
        api_item.media_metadata.video = Some(ApiVideoMetadata {
            status: Some("PROCESSING".to_string()),
        });
        assert_eq!(
            normalize_item(&api_item, 0, false).metadata.video_ready,
            Some(false)
        );

        let photo = item("p1", "image/jpeg");
        assert_eq!(normalize_item(&photo, 0, false).metadata.video_ready, None);
    }

    #[test]
    fn creation_time_parses_rfc3339() {
        let record = normalize_item(&item("t1", "image/jpeg"), 0, false);
        assert_eq!(record.metadata.creation_time, 1_685_620_800);

        let mut bad = item("t2", "image/jpeg");
        bad.media_metadata.creation_time = "yesterday".to_string();
        assert_eq!(normalize_item(&bad, 0, false).metadata.creation_time, 0);
    }

    #[test]
    fn dimensions_require_both_sides() {
        let mut half = item("d1", "image/jpeg");
        half.media_metadata.height = None;
        let record = normalize_item(&half, 0, false);
        assert_eq!(record.metadata.width, None);
        assert_eq!(record.metadata.height, None);
    }

    #[test]
    fn filenames_are_sanitized() {
        let mut tricky = item("s1", "image/png");
        tricky.filename = "my: photo?.HEIC".to_string();
        let record = normalize_item(&tricky, 0, false);
        assert_eq!(record.filename, "my_ photo_.png");
    }

    #[test]
    fn empty_filename_falls_back_to_id() {
        let mut anon = item("anon-id", "image/gif");
        anon.filename = String::new();
        let record = normalize_item(&anon, 0, false);
        assert_eq!(record.filename, "anon-id.gif");
    }

    /// Stub yielding a fixed sequence of pages
    struct PagedStub {
        pages: Mutex<Vec<ListMediaItemsResponse>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PhotosApi for PagedStub {
        async fn list_page(
            &self,
            request: &ListMediaItemsRequest,
        ) -> Result<ListMediaItemsResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // first request carries no token, later ones must
            if call == 0 {
                assert!(request.page_token.is_none());
            } else {
                assert!(request.page_token.is_some());
            }
            assert_eq!(request.page_size, PAGE_SIZE);
            assert!(request.filters.include_archived_media);
            Ok(self.pages.lock().unwrap().remove(0))
        }

        async fn media_item(&self, _id: &str) -> Result<ApiMediaItem> {
            unimplemented!()
        }

        async fn fetch_to_file(&self, _url: &str, _dest: &Path) -> Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn walks_all_pages_and_merges() {
        let stub = PagedStub {
            pages: Mutex::new(vec![
                ListMediaItemsResponse {
                    media_items: vec![item("a", "image/jpeg"), item("b", "image/jpeg")],
                    next_page_token: Some("t1".to_string()),
                },
                // empty page mid-walk still advances
                ListMediaItemsResponse {
                    media_items: vec![],
                    next_page_token: Some("t2".to_string()),
                },
                ListMediaItemsResponse {
                    media_items: vec![item("c", "video/mp4")],
                    next_page_token: None,
                },
            ]),
            calls: AtomicUsize::new(0),
        };

        let mut manifest = Manifest::empty();
        fetch_library(&stub, &mut manifest).await.unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
        assert_eq!(manifest.media.len(), 3);
        assert_eq!(manifest.stats.items_found, 3);
        assert!(manifest.stats.last_check.finished_check_at > 0);
        let ids: Vec<_> = manifest.media.keys().cloned().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn rescan_preserves_downloaded_flag() {
        let mut manifest = Manifest::empty();
        let stub = PagedStub {
            pages: Mutex::new(vec![ListMediaItemsResponse {
                media_items: vec![item("a", "image/jpeg")],
                next_page_token: None,
            }]),
            calls: AtomicUsize::new(0),
        };
        fetch_library(&stub, &mut manifest).await.unwrap();
        manifest.media.get_mut("a").unwrap().downloaded = true;

        // second scan returns the same item with a fresh URL
        let mut refreshed = item("a", "image/jpeg");
        refreshed.base_url = "https://lh3.example.com/a-fresh".to_string();
        let stub = PagedStub {
            pages: Mutex::new(vec![ListMediaItemsResponse {
                media_items: vec![refreshed],
                next_page_token: None,
            }]),
            calls: AtomicUsize::new(0),
        };
        fetch_library(&stub, &mut manifest).await.unwrap();

        let record = &manifest.media["a"];
        assert!(record.downloaded);
        assert_eq!(record.url, "https://lh3.example.com/a-fresh");
    }
}
