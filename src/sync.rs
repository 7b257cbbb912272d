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

//! The sync orchestrator: one full pass is authenticate, scan the catalogue
//! (when due), download, persist.
//!
//! The primary manifest is written at the end of every pass, success or not,
//! so progress from a partially failed pass survives. The backup file is only
//! refreshed after a pass that completed cleanly.

use tracing::{error, info, warn};

use crate::api::library::{fetch_library, PhotosApi};
use crate::config::SyncConfig;
use crate::download::{DownloadReport, DownloadScheduler};
use crate::error::Result;
use crate::manifest::{Manifest, ManifestStore};

/// Drives complete sync passes against an API implementation
pub struct SyncEngine<A: PhotosApi> {
    config: SyncConfig,
    store: ManifestStore,
    scheduler: DownloadScheduler,
    api: A,
}

impl<A: PhotosApi> SyncEngine<A> {
    pub fn new(config: SyncConfig, api: A) -> Self {
        let store = ManifestStore::new(
            config.manifest_file.clone(),
            config.manifest_backup_file.clone(),
        );
        let scheduler =
            DownloadScheduler::new(config.media_dir.clone(), config.concurrent_downloads);
        Self {
            config,
            store,
            scheduler,
            api,
        }
    }

    /// Run one sync pass. The manifest is saved whatever happens; the error,
    /// if any, is returned after persistence.
    pub async fn run_pass(&self) -> Result<DownloadReport> {
        let mut manifest = self.store.load().await;
        let outcome = self.fetch_and_download(&mut manifest).await;

        match &outcome {
            Ok(_) => {
                if let Err(e) = self.store.save_backup(&manifest).await {
                    warn!(error = %e, "could not write manifest backup");
                }
            }
            Err(e) => {
                warn!(error = %e, "pass failed, persisting partial progress");
            }
        }
        self.store.save(&manifest).await?;

        outcome
    }

    async fn fetch_and_download(&self, manifest: &mut Manifest) -> Result<DownloadReport> {
        self.api.authenticate().await?;

        let now = chrono::Utc::now().timestamp();
        let next_scan_due =
            manifest.stats.last_check.finished_check_at + self.config.interval_secs();
        if now >= next_scan_due {
            fetch_library(&self.api, manifest).await?;
        } else {
            info!(
                seconds_until_due = next_scan_due - now,
                "catalogue scan not due yet, downloads only"
            );
        }

        self.scheduler.run(&self.api, manifest).await
    }

    /// Run passes forever, sleeping the scan interval between them. Errors
    /// are logged and the loop continues.
    pub async fn run_loop(&self) -> ! {
        let mut lapse = 0u64;
        loop {
            lapse += 1;
            info!(lapse, "starting sync pass");
            match self.run_pass().await {
                Ok(report) => info!(
                    lapse,
                    completed = report.completed,
                    failed = report.failed,
                    "sync pass finished"
                ),
                Err(e) => error!(lapse, error = %e, "sync pass failed"),
            }
            tokio::time::sleep(self.config.interval()).await;
        }
    }
}
