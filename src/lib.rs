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

//! Photosync keeps a local mirror of a personal Google Photos library.
//!
//! One sync pass authenticates (OAuth2 with PKCE, tokens cached per scope in
//! a credentials file), walks the paginated library catalogue into a local
//! JSON manifest, then downloads every item not yet on disk in bounded
//! batches. The manifest is persisted after every pass, with a backup file
//! kept from the last clean pass.

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod manifest;
pub mod sync;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use sync::SyncEngine;
