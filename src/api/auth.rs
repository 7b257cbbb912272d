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

//! OAuth2 authorization with PKCE and per-scope token persistence.
//!
//! The credentials file carries the app client id/secret plus one token
//! record per scope. [`TokenProvider::token_for`] hands out a valid access
//! token for a scope, refreshing or running the interactive authorization
//! flow as needed and persisting the updated record before returning.
//!
//! How the user gets from the authorization URL to a code is not this
//! module's business: callers inject an [`AuthCodePrompt`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Google's OAuth2 token endpoint
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Google's OAuth2 authorization endpoint
pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Out-of-band redirect: the code is shown to the user for manual copy
pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Prefix expanding a short scope name to the full scope URL
pub const SCOPE_URL_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Seconds shaved off the advertised token lifetime
const EXPIRY_SKEW_SECS: i64 = 1;

/// Token state for one scope as stored in the credentials file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp after which `access_token` is no longer trusted
    #[serde(default)]
    pub expires_at: i64,
}

impl TokenRecord {
    /// A usable cached token: present and not past its expiry
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.access_token.is_some() && now < self.expires_at
    }
}

/// OAuth application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppData {
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// On-disk layout of the credentials file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsFile {
    pub appdata: AppData,
    #[serde(default)]
    pub scopes: HashMap<String, TokenRecord>,
}

/// PKCE verifier/challenge pair (S256)
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub method: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge.
    ///
    /// 96 random bytes encode to a 128-character base64url verifier, the
    /// maximum length RFC 7636 allows.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 96];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);

        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);

        Self {
            verifier,
            challenge,
            method: "S256".to_string(),
        }
    }
}

/// Build the user-facing authorization URL for a scope
pub fn authorization_url(client_id: &str, scope: &str, pkce: &PkceChallenge) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", client_id)
        .append_pair("scope", &format!("{SCOPE_URL_PREFIX}{scope}"))
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", &pkce.method)
        .finish();
    format!("{AUTHORIZATION_ENDPOINT}?{query}")
}

/// How an authorization code reaches us during first-time auth.
///
/// Implementations present `auth_url` to the user however they like (console,
/// browser, test stub) and resolve with the code the user obtained.
#[async_trait]
pub trait AuthCodePrompt: Send + Sync {
    async fn authorize(&self, auth_url: &str) -> Result<String>;
}

/// Token endpoint response; unknown fields ignored
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

/// Hands out access tokens per scope, persisting state to the credentials
/// file after every exchange.
pub struct TokenProvider {
    http: reqwest::Client,
    credentials_path: PathBuf,
    prompt: Box<dyn AuthCodePrompt>,
    token_endpoint: String,
    cache: Mutex<Option<CredentialsFile>>,
}

impl TokenProvider {
    pub fn new(
        http: reqwest::Client,
        credentials_path: PathBuf,
        prompt: Box<dyn AuthCodePrompt>,
    ) -> Self {
        Self {
            http,
            credentials_path,
            prompt,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Return a valid access token for `scope`.
    ///
    /// Uses the cached token when still fresh, otherwise refreshes with the
    /// stored refresh token, otherwise walks the full interactive PKCE flow.
    /// The updated record is written back to the credentials file before the
    /// token is returned.
    pub async fn token_for(&self, scope: &str) -> Result<String> {
        let mut guard = self.cache.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_credentials().await?);
        }
        let creds = match guard.as_mut() {
            Some(creds) => creds,
            None => {
                return Err(SyncError::auth_failed(
                    "credentials cache unavailable",
                    Some(scope),
                ))
            }
        };

        let now = chrono::Utc::now().timestamp();
        let (refresh_token, appdata) = {
            let record = creds.scopes.entry(scope.to_string()).or_default();
            if record.is_valid_at(now) {
                if let Some(token) = &record.access_token {
                    return Ok(token.clone());
                }
            }
            (record.refresh_token.clone(), creds.appdata.clone())
        };

        let response = match refresh_token.as_deref() {
            Some(refresh) => {
                debug!(scope, "refreshing access token");
                self.refresh_exchange(&appdata, refresh).await?
            }
            None => {
                info!(scope, "no stored token, starting interactive authorization");
                self.interactive_exchange(&appdata, scope).await?
            }
        };

        let access_token = response.access_token.ok_or_else(|| {
            SyncError::auth_failed("token response carried no access token", Some(scope))
        })?;

        let record = creds.scopes.entry(scope.to_string()).or_default();
        record.access_token = Some(access_token.clone());
        if response.refresh_token.is_some() {
            record.refresh_token = response.refresh_token;
        }
        record.expires_at = chrono::Utc::now().timestamp() + response.expires_in - EXPIRY_SKEW_SECS;

        self.persist(creds).await?;
        Ok(access_token)
    }

    /// Exchange a refresh token for a new access token
    async fn refresh_exchange(
        &self,
        appdata: &AppData,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("client_id", appdata.client_id.as_str()),
            ("client_secret", appdata.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.token_request(&params).await
    }

    /// Full interactive flow: PKCE challenge, prompt for the code, exchange
    async fn interactive_exchange(&self, appdata: &AppData, scope: &str) -> Result<TokenResponse> {
        let pkce = PkceChallenge::generate();
        let auth_url = authorization_url(&appdata.client_id, scope, &pkce);
        let code = self.prompt.authorize(&auth_url).await?;
        let code = code.trim();

        let params = [
            ("client_id", appdata.client_id.as_str()),
            ("client_secret", appdata.client_secret.as_str()),
            ("code", code),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", REDIRECT_URI),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::auth_failed(
                format!("token endpoint returned {status}: {body}"),
                None,
            ));
        }
        Ok(response.json().await?)
    }

    async fn load_credentials(&self) -> Result<CredentialsFile> {
        let text = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| {
                SyncError::auth_failed(
                    format!(
                        "cannot read credentials file {}: {e}",
                        self.credentials_path.display()
                    ),
                    None,
                )
            })?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn persist(&self, creds: &CredentialsFile) -> Result<()> {
        write_credentials(&self.credentials_path, creds).await
    }
}

async fn write_credentials(path: &Path, creds: &CredentialsFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(creds)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
