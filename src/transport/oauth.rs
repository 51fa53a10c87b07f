use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use colored::Colorize;
use rand::RngCore as _;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::{HttpClient, JsonApi};
use crate::error::{SyncError, SyncResult};
use crate::store::{read_json, write_json_atomic};

const TOKEN_URL: &str = "https://myanimelist.net/v1/oauth2/token";
const AUTHORIZE_URL: &str = "https://myanimelist.net/v1/oauth2/authorize";
const STATE: &str = "malexport";

/// Tokens returned by the OAuth token endpoint, stored as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An authenticated session against the MAL v2 REST API.
///
/// Tokens live in the account's refresh file. A 401 triggers one refresh of
/// the access token and one retry of the request.
pub struct MalApiSession {
    http: HttpClient,
    client_id: String,
    refresh_path: PathBuf,
    redirect_uri: String,
}

/// A random PKCE verifier. MAL only supports the `plain` method, so the
/// verifier doubles as the challenge.
pub fn pkce_verifier() -> String {
    let mut bytes = [0u8; 40];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Build the URL the user opens to approve the application
pub fn authorize_url(client_id: &str, redirect_uri: &str, verifier: &str) -> SyncResult<Url> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("state", STATE),
            ("redirect_uri", redirect_uri),
            ("code_challenge", verifier),
            ("code_challenge_method", "plain"),
        ],
    )
    .map_err(|e| SyncError::Precondition(format!("invalid authorize url: {e}")))
}

/// Pull the `code` query parameter out of the URL the user was redirected to
pub fn code_from_redirect(redirected: &str) -> SyncResult<String> {
    let url = Url::parse(redirected.trim())
        .map_err(|e| SyncError::Precondition(format!("'{redirected}' is not a URL: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| SyncError::Precondition(format!("no 'code' parameter in {redirected}")))
}

impl MalApiSession {
    pub fn new(http: HttpClient, client_id: impl Into<String>, refresh_path: impl Into<PathBuf>) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            refresh_path: refresh_path.into(),
            redirect_uri: std::env::var("MALEXPORT_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost".to_string()),
        }
    }

    /// Attach a bearer token, running the interactive OAuth flow if no
    /// usable token is stored.
    pub fn authenticate(&mut self) -> SyncResult<()> {
        let tokens = match read_json::<TokenInfo>(&self.refresh_path) {
            Ok(Some(tokens)) => tokens,
            Ok(None) => self.oauth_flow()?,
            Err(e) => {
                log::warn!("Could not read {}: {}", self.refresh_path.display(), e);
                self.oauth_flow()?
            }
        };
        log::debug!("Using access token from {}", self.refresh_path.display());
        self.http.set_bearer(tokens.access_token);
        Ok(())
    }

    fn oauth_flow(&mut self) -> SyncResult<TokenInfo> {
        if !crate::credentials::is_interactive() {
            return Err(SyncError::AuthExpired(format!(
                "no tokens at {} and no terminal to run the login flow on",
                self.refresh_path.display()
            )));
        }
        log::info!("Logging in to MAL...");
        let verifier = pkce_verifier();
        let url = authorize_url(&self.client_id, &self.redirect_uri, &verifier)?;
        println!("Go to\n\n{}\n", url.as_str().cyan());
        let redirected = inquire::Text::new(
            "Approve the application, and paste the whole URL it redirects you back to:",
        )
        .prompt()
        .map_err(|e| SyncError::Precondition(format!("failed to read redirect url: {e}")))?;
        let code = code_from_redirect(&redirected)?;

        let reply = self.http.post_form(
            TOKEN_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier.as_str()),
            ],
            Some((self.client_id.as_str(), "")),
        )?;
        self.store_tokens(reply)
    }

    /// Exchange the stored refresh token for a new access token
    pub fn refresh_token(&mut self) -> SyncResult<()> {
        let old = read_json::<TokenInfo>(&self.refresh_path)?.ok_or_else(|| {
            SyncError::AuthExpired(format!("no refresh token at {}", self.refresh_path.display()))
        })?;
        log::info!("Refreshing token...");
        let reply = self.http.post_form(
            TOKEN_URL,
            &[
                ("refresh_token", old.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
            Some((self.client_id.as_str(), "")),
        )?;
        let tokens = self.store_tokens(reply)?;
        self.http.set_bearer(tokens.access_token);
        Ok(())
    }

    fn store_tokens(&self, reply: Value) -> SyncResult<TokenInfo> {
        let tokens: TokenInfo = serde_json::from_value(reply).map_err(|e| {
            SyncError::AuthExpired(format!("token endpoint returned no usable tokens: {e}"))
        })?;
        log::info!("Saving refresh information to {}", self.refresh_path.display());
        write_json_atomic(&self.refresh_path, &tokens)?;
        Ok(tokens)
    }
}

impl JsonApi for MalApiSession {
    fn get_json(&mut self, url: &str) -> SyncResult<Value> {
        match self.http.get_json(url) {
            Err(SyncError::AuthExpired(reason)) => {
                log::info!("Access token rejected ({}), refreshing", reason);
                self.refresh_token()?;
                self.http.get_json(url)
            }
            other => other,
        }
    }
}
