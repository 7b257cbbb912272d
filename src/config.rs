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

//! Sync configuration.
//!
//! A single explicit struct, built once at startup and passed into the
//! orchestrator and component constructors. Every field has a default so a
//! partial config file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Credentials file holding app client id/secret and per-scope tokens
    pub credentials_file: PathBuf,

    /// Primary manifest path
    pub manifest_file: PathBuf,

    /// Backup manifest path, refreshed only after a successful pass
    pub manifest_backup_file: PathBuf,

    /// Directory downloaded media files are written to (flat)
    pub media_dir: PathBuf,

    /// Batch size for the download scheduler
    pub concurrent_downloads: usize,

    /// Hours between catalogue re-scans (and between looped passes)
    pub scan_library_interval: u64,

    /// Open the authorization URL in a browser during first-time auth
    pub open_browser_to_auth: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("auth.json"),
            manifest_file: PathBuf::from("output/manifest.json"),
            manifest_backup_file: PathBuf::from("output/manifest.backup.json"),
            media_dir: PathBuf::from("output/media"),
            concurrent_downloads: 6,
            scan_library_interval: 6,
            open_browser_to_auth: true,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a JSON file, filling missing fields with
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Scan interval in seconds, for comparing against manifest timestamps
    pub fn interval_secs(&self) -> i64 {
        self.scan_library_interval as i64 * 3600
    }

    /// Scan interval as a Duration, for looped mode sleeps
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scan_library_interval * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrent_downloads, 6);
        assert_eq!(config.scan_library_interval, 6);
        assert_eq!(config.interval_secs(), 6 * 3600);
        assert!(config.open_browser_to_auth);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"concurrent_downloads": 2, "media_dir": "photos", "open_browser_to_auth": false}}"#
        )
        .unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.concurrent_downloads, 2);
        assert_eq!(config.media_dir, PathBuf::from("photos"));
        assert!(!config.open_browser_to_auth);
        // untouched fields keep their defaults
        assert_eq!(config.scan_library_interval, 6);
        assert_eq!(config.credentials_file, PathBuf::from("auth.json"));
    }
}
