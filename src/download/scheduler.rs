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

//! Bounded batch download scheduler.
//!
//! Pending items are processed in manifest order, `concurrent_downloads` at a
//! time; each batch runs to completion before the next starts. Download URLs
//! expire about an hour after issue, so any entry whose URL is older than the
//! refresh threshold gets a fresh one from the single-item endpoint first.
//!
//! An entry is marked `downloaded` only after its transfer succeeds, or when
//! the target file already exists on disk. A failed item is logged and left
//! pending; the batch carries on.

use std::path::PathBuf;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::api::library::PhotosApi;
use crate::error::Result;
use crate::manifest::Manifest;

/// How long issued base URLs stay usable
pub const URL_VALIDITY_SECS: i64 = 3600;

/// Age past which we refresh a URL before attempting a download.
/// Comfortably inside the one-hour validity window.
pub const URL_REFRESH_AFTER_SECS: i64 = 50 * 60;

/// Outcome counters for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped_existing: usize,
}

/// Dispatches pending manifest entries as bounded download batches
pub struct DownloadScheduler {
    media_dir: PathBuf,
    concurrent_downloads: usize,
}

impl DownloadScheduler {
    pub fn new(media_dir: PathBuf, concurrent_downloads: usize) -> Self {
        Self {
            media_dir,
            concurrent_downloads: concurrent_downloads.max(1),
        }
    }

    /// Download everything not yet marked downloaded, updating the manifest
    /// in place.
    pub async fn run<A: PhotosApi + ?Sized>(
        &self,
        api: &A,
        manifest: &mut Manifest,
    ) -> Result<DownloadReport> {
        tokio::fs::create_dir_all(&self.media_dir).await?;

        let pending = manifest.pending_ids();
        if pending.is_empty() {
            debug!("nothing pending, skipping download phase");
            return Ok(DownloadReport::default());
        }
        info!(
            pending = pending.len(),
            batch_size = self.concurrent_downloads,
            "starting download phase"
        );

        let mut report = DownloadReport::default();

        for chunk in pending.chunks(self.concurrent_downloads) {
            let mut batch = Vec::with_capacity(chunk.len());

            for id in chunk {
                let now = chrono::Utc::now().timestamp();
                let needs_refresh = manifest
                    .media
                    .get(id)
                    .map(|r| now - r.last_checked_at > URL_REFRESH_AFTER_SECS)
                    .unwrap_or(false);

                if needs_refresh {
                    debug!(id = %id, "download URL stale, refreshing");
                    match api.media_item(id).await {
                        Ok(fresh) => {
                            if let Some(record) = manifest.media.get_mut(id) {
                                record.url = fresh.base_url;
                                record.last_checked_at = now;
                            }
                        }
                        Err(e) => {
                            warn!(id = %id, error = %e, "URL refresh failed, item stays pending");
                            report.failed += 1;
                            continue;
                        }
                    }
                }

                let Some(record) = manifest.media.get(id) else {
                    continue;
                };
                let dest = self.media_dir.join(&record.filename);

                if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                    debug!(id = %id, file = %record.filename, "file already present");
                    if let Some(record) = manifest.media.get_mut(id) {
                        record.downloaded = true;
                    }
                    report.skipped_existing += 1;
                    continue;
                }

                let url = format!("{}{}", record.url, record.kind.download_suffix());
                batch.push((id.clone(), url, dest));
            }

            report.attempted += batch.len();
            let outcomes = join_all(batch.into_iter().map(|(id, url, dest)| async move {
                let outcome = api.fetch_to_file(&url, &dest).await;
                (id, outcome)
            }))
            .await;

            for (id, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        if let Some(record) = manifest.media.get_mut(&id) {
                            record.downloaded = true;
                        }
                        report.completed += 1;
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "download failed, item stays pending");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            attempted = report.attempted,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped_existing,
            "download phase finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::library::{ApiMediaItem, ListMediaItemsRequest, ListMediaItemsResponse};
    use crate::error::SyncError;
    use crate::manifest::{MediaKind, MediaMetadata, MediaRecord};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn record(id: &str, kind: MediaKind, last_checked_at: i64) -> MediaRecord {
        let extension = match kind {
            MediaKind::Photo => "jpeg",
            MediaKind::Video => "mp4",
        };
        MediaRecord {
            id: id.to_string(),
            url: format!("https://lh3.example.com/{id}"),
            filename: format!("{id}.{extension}"),
            kind,
            extension: extension.to_string(),
            metadata: MediaMetadata::default(),
            last_checked_at,
            downloaded: false,
        }
    }

    fn manifest_with(records: Vec<MediaRecord>) -> Manifest {
        let mut manifest = Manifest::empty();
        for r in records {
            manifest.media.insert(r.id.clone(), r);
        }
        manifest
    }

    #[derive(Default)]
    struct StubApi {
        fetched: Mutex<Vec<String>>,
        refreshed: Mutex<Vec<String>>,
        fail_ids: HashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl crate::api::library::PhotosApi for StubApi {
        async fn list_page(
            &self,
            _request: &ListMediaItemsRequest,
        ) -> crate::error::Result<ListMediaItemsResponse> {
            unimplemented!()
        }

        async fn media_item(&self, id: &str) -> crate::error::Result<ApiMediaItem> {
            self.refreshed.lock().unwrap().push(id.to_string());
            Ok(ApiMediaItem {
                id: id.to_string(),
                base_url: format!("https://lh3.example.com/{id}-fresh"),
                ..Default::default()
            })
        }

        async fn fetch_to_file(&self, url: &str, dest: &Path) -> crate::error::Result<()> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.fetched.lock().unwrap().push(url.to_string());
            let failing = self.fail_ids.iter().any(|id| url.contains(id.as_str()));
            if failing {
                return Err(SyncError::download_failed("item", "stub failure"));
            }
            tokio::fs::write(dest, b"bytes").await?;
            Ok(())
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[tokio::test]
    async fn downloads_every_pending_item_once() {
        let dir = tempfile::tempdir().unwrap();
        let api = StubApi::default();
        let mut manifest = manifest_with(vec![
            record("a", MediaKind::Photo, now()),
            record("b", MediaKind::Video, now()),
        ]);

        let scheduler = DownloadScheduler::new(dir.path().to_path_buf(), 4);
        let report = scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        assert!(manifest.media["a"].downloaded);
        assert!(manifest.media["b"].downloaded);

        let fetched = api.fetched.lock().unwrap();
        assert!(fetched.iter().any(|u| u.ends_with("/a=d")));
        assert!(fetched.iter().any(|u| u.ends_with("/b=dv")));
        assert!(dir.path().join("a.jpeg").exists());
        assert!(dir.path().join("b.mp4").exists());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let api = StubApi::default();
        let records = (0..10)
            .map(|i| record(&format!("item{i}"), MediaKind::Photo, now()))
            .collect();
        let mut manifest = manifest_with(records);

        let scheduler = DownloadScheduler::new(dir.path().to_path_buf(), 3);
        let report = scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(report.completed, 10);
        assert!(api.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn stale_urls_are_refreshed_first() {
        let dir = tempfile::tempdir().unwrap();
        let api = StubApi::default();
        let stale_at = now() - 51 * 60;
        let mut manifest = manifest_with(vec![
            record("old", MediaKind::Photo, stale_at),
            record("new", MediaKind::Photo, now() - 60),
        ]);

        let scheduler = DownloadScheduler::new(dir.path().to_path_buf(), 2);
        scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(*api.refreshed.lock().unwrap(), vec!["old".to_string()]);
        assert!(manifest.media["old"].url.ends_with("old-fresh"));
        assert!(manifest.media["old"].last_checked_at >= stale_at + 50 * 60);
        // fresh entry kept its original URL
        assert!(manifest.media["new"].url.ends_with("/new"));
    }

    #[tokio::test]
    async fn failed_item_stays_pending_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let api = StubApi {
            fail_ids: HashSet::from(["bad".to_string()]),
            ..Default::default()
        };
        let mut manifest = manifest_with(vec![
            record("good1", MediaKind::Photo, now()),
            record("bad", MediaKind::Photo, now()),
            record("good2", MediaKind::Photo, now()),
        ]);

        let scheduler = DownloadScheduler::new(dir.path().to_path_buf(), 3);
        let report = scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert!(manifest.media["good1"].downloaded);
        assert!(!manifest.media["bad"].downloaded);
        assert!(manifest.media["good2"].downloaded);
    }

    #[tokio::test]
    async fn existing_files_are_skipped_and_marked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpeg"), b"already here").unwrap();

        let api = StubApi::default();
        let mut manifest = manifest_with(vec![
            record("a", MediaKind::Photo, now()),
            record("b", MediaKind::Photo, now()),
        ]);

        let scheduler = DownloadScheduler::new(dir.path().to_path_buf(), 2);
        let report = scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.completed, 1);
        assert!(manifest.media["a"].downloaded);
        assert!(manifest.media["b"].downloaded);
        // the pre-existing file was not re-fetched
        assert_eq!(api.fetched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_manifest_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let api = StubApi::default();
        let mut manifest = Manifest::empty();

        let scheduler = DownloadScheduler::new(dir.path().join("media"), 2);
        let report = scheduler.run(&api, &mut manifest).await.unwrap();

        assert_eq!(report, DownloadReport::default());
        assert!(api.fetched.lock().unwrap().is_empty());
    }
}
