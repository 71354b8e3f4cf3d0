//! Authenticated session.
//!
//! A `Session` owns the OAuth tokens and the shared HTTP transport. Every
//! request to the cloud or a device goes through `authorized_request`,
//! which transparently refreshes an expired access token (at most one
//! refresh in flight; a failed refresh fails only the requesting
//! operation).

use chrono::Utc;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::{ClientError, ClientResult};
use crate::jwt;

const PASSWORD_GRANT: &str = "http://auth0.com/oauth/grant-type/password-realm";
const REFRESH_GRANT: &str = "refresh_token";
const AUTH_REALM: &str = "Username-Password-Authentication";
const AUTH_AUDIENCE: &str = "mycloud.com";
const AUTH_SCOPE: &str =
    "openid offline_access nas_read_write nas_read_only user_read device_read";
const AUTH_CLIENT_ID: &str = "9B0Gi617tROKHc2rS95sT1yJzR6MkQDm";
const AUTH_CLIENT_SECRET: &str =
    "oSJOB1KOWnLVZm11DVknu2wZkTj5AGKxcINEDtEUPE30jHKvEqorM8ocWbyo17Hd";

/// Host OS tag sent as the `hidden` parameter on directory listings so the
/// server filters out the other platforms' hidden files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Linux,
    Windows,
    Mac,
    None,
}

impl OsType {
    pub fn current() -> OsType {
        if cfg!(target_os = "linux") {
            OsType::Linux
        } else if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(target_os = "macos") {
            OsType::Mac
        } else {
            OsType::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Linux => "linux",
            OsType::Windows => "windows",
            OsType::Mac => "mac",
            OsType::None => "none",
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    id_token: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: u64,
}

/// The token set of an authenticated session.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub scope: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user_id: String,
}

/// An authenticated My Cloud Home session.
pub struct Session {
    http: reqwest::Client,
    config: ServiceConfig,
    os_type: OsType,
    tokens: RwLock<Tokens>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl Session {
    /// Sign in with a username and password.
    ///
    /// Fetches the service configuration from the bootstrap URL, then runs
    /// the password-realm grant against the authentication service.
    pub async fn login(username: &str, password: &str) -> ClientResult<Session> {
        let http = reqwest::Client::new();
        let config = ServiceConfig::fetch(&http).await?;
        Session::login_with_config(http, config, username, password).await
    }

    /// Sign in against an already-fetched service configuration.
    pub async fn login_with_config(
        http: reqwest::Client,
        config: ServiceConfig,
        username: &str,
        password: &str,
    ) -> ClientResult<Session> {
        let url = format!("{}/oauth/token", config.auth_url()?);
        let body = serde_json::json!({
            "grant_type": PASSWORD_GRANT,
            "realm": AUTH_REALM,
            "audience": AUTH_AUDIENCE,
            "username": username,
            "password": password,
            "scope": AUTH_SCOPE,
            "client_id": AUTH_CLIENT_ID,
            "client_secret": AUTH_CLIENT_SECRET,
        });

        let resp = http.post(&url).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }
        let tokens = parse_auth_response(resp.json().await?)?;
        info!(user_id = %tokens.user_id, "signed in");

        Ok(Session {
            http,
            config,
            os_type: OsType::current(),
            tokens: RwLock::new(tokens),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn user_id(&self) -> String {
        self.tokens.read().user_id.clone()
    }

    pub fn os_type(&self) -> OsType {
        self.os_type
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Whether the stored access token has expired.
    ///
    /// Reads the token's own `exp` claim; a token that cannot be decoded
    /// counts as expired.
    pub fn is_access_token_expired(&self) -> bool {
        let access_token = self.tokens.read().access_token.clone();
        let claims = match jwt::decode_claims(&access_token) {
            Ok(claims) => claims,
            Err(_) => return true,
        };
        let exp = claims
            .get("exp")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        match exp {
            Some(exp) => Utc::now().timestamp() >= exp,
            None => true,
        }
    }

    /// Exchange the refresh token for a fresh token set, replacing every
    /// stored token field.
    pub async fn refresh_access_token(&self) -> ClientResult<()> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> ClientResult<()> {
        let refresh_token = self.tokens.read().refresh_token.clone();
        let body = serde_json::json!({
            "audience": AUTH_AUDIENCE,
            "client_id": self.config.portal_client_id()?,
            "grant_type": REFRESH_GRANT,
            "refresh_token": refresh_token,
        });
        let url = format!("{}/oauth/token", self.config.auth_url()?);

        let resp = self.http.post(&url).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }
        let tokens = parse_auth_response(resp.json().await?)?;
        *self.tokens.write() = tokens;
        debug!("access token refreshed");
        Ok(())
    }

    /// Build a request carrying a valid bearer token, refreshing first if
    /// the current access token has expired. A refresh failure is
    /// propagated and terminal for this call only.
    pub async fn authorized_request(
        &self,
        method: Method,
        url: &str,
    ) -> ClientResult<reqwest::RequestBuilder> {
        if self.is_access_token_expired() {
            let _gate = self.refresh_gate.lock().await;
            // Another caller may have refreshed while we waited.
            if self.is_access_token_expired() {
                self.refresh_locked().await?;
            }
        }
        let access_token = self.tokens.read().access_token.clone();
        Ok(self.http.request(method, url).bearer_auth(access_token))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tokens: Tokens) -> Session {
        Session {
            http: reqwest::Client::new(),
            config: ServiceConfig {
                configuration_id: String::new(),
                component_map: Default::default(),
            },
            os_type: OsType::current(),
            tokens: RwLock::new(tokens),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.tokens.read().user_id)
            .field("os_type", &self.os_type)
            .finish()
    }
}

fn parse_auth_response(raw: AuthResponse) -> ClientResult<Tokens> {
    let claims = jwt::decode_claims(&raw.id_token)?;
    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ClientError::Auth("id token is missing the sub claim".into()))?
        .to_string();

    Ok(Tokens {
        access_token: raw.access_token,
        refresh_token: raw.refresh_token,
        id_token: raw.id_token,
        scope: raw.scope,
        token_type: raw.token_type,
        expires_in: raw.expires_in,
        user_id,
    })
}

#[cfg(test)]
pub(crate) fn test_tokens(access_claims: &serde_json::Value) -> Tokens {
    Tokens {
        access_token: jwt::encode_unsigned_token(access_claims),
        refresh_token: "refresh-token".into(),
        id_token: jwt::encode_unsigned_token(&serde_json::json!({"sub": "user-1"})),
        scope: String::new(),
        token_type: "Bearer".into(),
        expires_in: 3600,
        user_id: "user-1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_type_tags() {
        let os = OsType::current();
        assert!(matches!(
            os.as_str(),
            "linux" | "windows" | "mac" | "none"
        ));
        #[cfg(target_os = "linux")]
        assert_eq!(os.as_str(), "linux");
    }

    #[test]
    fn test_token_with_future_exp_is_valid() {
        let exp = Utc::now().timestamp() + 3600;
        let session = Session::for_tests(test_tokens(&serde_json::json!({"exp": exp})));
        assert!(!session.is_access_token_expired());
    }

    #[test]
    fn test_token_with_past_exp_is_expired() {
        let exp = Utc::now().timestamp() - 10;
        let session = Session::for_tests(test_tokens(&serde_json::json!({"exp": exp})));
        assert!(session.is_access_token_expired());
    }

    #[test]
    fn test_undecodable_token_is_expired() {
        let mut tokens = test_tokens(&serde_json::json!({"exp": 0}));
        tokens.access_token = "garbage".into();
        let session = Session::for_tests(tokens);
        assert!(session.is_access_token_expired());
    }

    #[test]
    fn test_token_without_exp_claim_is_expired() {
        let session =
            Session::for_tests(test_tokens(&serde_json::json!({"sub": "user-1"})));
        assert!(session.is_access_token_expired());
    }

    #[test]
    fn test_float_exp_claim_is_read() {
        let exp = (Utc::now().timestamp() + 3600) as f64 + 0.5;
        let session = Session::for_tests(test_tokens(&serde_json::json!({"exp": exp})));
        assert!(!session.is_access_token_expired());
    }

    #[test]
    fn test_parse_auth_response_extracts_user_id() {
        let raw = AuthResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            id_token: jwt::encode_unsigned_token(&serde_json::json!({"sub": "auth0|abc"})),
            scope: "openid".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
        };
        let tokens = parse_auth_response(raw).unwrap();
        assert_eq!(tokens.user_id, "auth0|abc");
        assert_eq!(tokens.expires_in, 3600);
    }

    #[test]
    fn test_parse_auth_response_missing_sub_fails() {
        let raw = AuthResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            id_token: jwt::encode_unsigned_token(&serde_json::json!({"exp": 1})),
            scope: String::new(),
            token_type: String::new(),
            expires_in: 0,
        };
        assert!(matches!(
            parse_auth_response(raw),
            Err(ClientError::Auth(_))
        ));
    }
}
