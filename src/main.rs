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

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use photosync::api::auth::{AuthCodePrompt, TokenProvider};
use photosync::api::client::PhotosClient;
use photosync::{SyncConfig, SyncEngine};

/// Mirror a Google Photos library to local disk
#[derive(Parser, Debug)]
#[command(name = "photosync", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "photosync.json")]
    config: PathBuf,

    /// Keep running, syncing once per scan interval
    #[arg(short, long)]
    watch: bool,
}

/// First-time auth over the terminal: print (and optionally open) the
/// authorization URL, then read the code from stdin.
struct ConsolePrompt {
    open_browser: bool,
}

#[async_trait]
impl AuthCodePrompt for ConsolePrompt {
    async fn authorize(&self, auth_url: &str) -> photosync::Result<String> {
        println!("Authorize this application by visiting:\n\n  {auth_url}\n");
        if self.open_browser {
            open_in_browser(auth_url);
        }
        println!("Paste the authorization code here and press enter:");

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        stdin.read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }
}

fn open_in_browser(url: &str) {
    #[cfg(target_os = "linux")]
    let program = "xdg-open";
    #[cfg(target_os = "macos")]
    let program = "open";
    #[cfg(target_os = "windows")]
    let program = "explorer";
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    let program = "xdg-open";

    if let Err(e) = std::process::Command::new(program).arg(url).spawn() {
        warn!(error = %e, "could not open a browser, use the printed URL");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        SyncConfig::load(&cli.config)
            .with_context(|| format!("loading config from {}", cli.config.display()))?
    } else {
        info!(path = %cli.config.display(), "no config file, using defaults");
        SyncConfig::default()
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("building HTTP client")?;

    let prompt = ConsolePrompt {
        open_browser: config.open_browser_to_auth,
    };
    let auth = TokenProvider::new(
        http.clone(),
        config.credentials_file.clone(),
        Box::new(prompt),
    );
    let client = PhotosClient::new(http, auth);
    let engine = SyncEngine::new(config, client);

    if cli.watch {
        engine.run_loop().await
    } else {
        let report = engine.run_pass().await.context("sync pass failed")?;
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped_existing,
            "sync complete"
        );
        Ok(())
    }
}
