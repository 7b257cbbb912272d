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

//! The local manifest: every remote media item we know about and its local
//! download state, backed by a flat JSON file.
//!
//! A manifest file must carry both `stats` and `media` top-level keys to be
//! considered valid; deserialization fails otherwise and the store falls back
//! to the backup file, then to an empty manifest. The media map preserves
//! insertion order so download dispatch order is stable across passes.
//!
//! Concurrent invocations against the same manifest files are undefined
//! behavior: the tool assumes single-instance execution and takes no lock.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

/// Media kind, derived from the first half of the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Map a MIME kind ("image", "video") onto our two buckets
    pub fn from_mime_kind(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("video") {
            MediaKind::Video
        } else {
            MediaKind::Photo
        }
    }

    /// Suffix appended to a base URL to request the full-resolution bytes.
    /// Videos use `=dv`, photos `=d`.
    pub fn download_suffix(&self) -> &'static str {
        match self {
            MediaKind::Video => "=dv",
            MediaKind::Photo => "=d",
        }
    }
}

/// Normalized remote metadata for one media item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Capture time as a Unix timestamp (0 when the API gave none)
    pub creation_time: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,

    /// Video processing state: ready / not ready / unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_ready: Option<bool>,
}

/// One remote media item and its local state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Opaque stable identifier from the API; primary key
    pub id: String,

    /// Time-limited base download URL; expires roughly an hour after issue
    /// and must get a kind suffix appended before use
    pub url: String,

    /// Sanitized local filename
    pub filename: String,

    pub kind: MediaKind,

    /// Format extension taken from the MIME type
    pub extension: String,

    pub metadata: MediaMetadata,

    /// When `url` was last refreshed from the API (Unix timestamp)
    pub last_checked_at: i64,

    /// Local-only: a download for this id has completed
    #[serde(default)]
    pub downloaded: bool,
}

/// Timing of the most recent catalogue scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCheck {
    pub started_check_at: i64,
    pub finished_check_at: i64,
    pub time_taken: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub last_check: LastCheck,
    #[serde(default)]
    pub items_found: u64,
}

/// The full local state. Both fields are required on disk; a file missing
/// either does not deserialize and is treated as corrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub stats: Stats,
    pub media: IndexMap<String, MediaRecord>,
}

impl Manifest {
    /// Fresh manifest: no media, `finished_check_at` of zero so the next
    /// pass always re-walks the catalogue.
    pub fn empty() -> Self {
        Self {
            stats: Stats::default(),
            media: IndexMap::new(),
        }
    }

    /// Ids of entries not yet downloaded, in insertion order
    pub fn pending_ids(&self) -> Vec<String> {
        self.media
            .iter()
            .filter(|(_, record)| !record.downloaded)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// JSON-backed persistence for the manifest, with a primary and a backup
/// path.
///
/// Load tries primary, then backup, then gives up and starts empty; a failed
/// parse is logged, never propagated. Save writes the primary path and is
/// meant to run even when a pass fails partway; the backup is copied
/// separately only after a known-good pass.
pub struct ManifestStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl ManifestStore {
    pub fn new(primary: PathBuf, backup: PathBuf) -> Self {
        Self { primary, backup }
    }

    /// Load the manifest, falling back to the backup file and finally to an
    /// empty manifest.
    pub async fn load(&self) -> Manifest {
        match Self::read(&self.primary).await {
            Ok(manifest) => manifest,
            Err(primary_err) => {
                warn!(
                    path = %self.primary.display(),
                    error = %primary_err,
                    "manifest unreadable, trying backup"
                );
                match Self::read(&self.backup).await {
                    Ok(manifest) => manifest,
                    Err(backup_err) => {
                        warn!(
                            path = %self.backup.display(),
                            error = %backup_err,
                            "backup unreadable, starting from an empty manifest"
                        );
                        Manifest::empty()
                    }
                }
            }
        }
    }

    async fn read(path: &Path) -> Result<Manifest> {
        let text = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the manifest to the primary path
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        Self::write(&self.primary, manifest).await?;
        debug!(path = %self.primary.display(), "manifest saved");
        Ok(())
    }

    /// Write the manifest to the backup path
    pub async fn save_backup(&self, manifest: &Manifest) -> Result<()> {
        Self::write(&self.backup, manifest).await?;
        debug!(path = %self.backup.display(), "manifest backup saved");
        Ok(())
    }

    async fn write(path: &Path, manifest: &Manifest) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(path, json).await?;
        Ok(())
    }
}
