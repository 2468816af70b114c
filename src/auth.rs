//! Access tokens for the Web API.
//!
//! The adapter only consumes a bearer token. Obtaining the first token is left
//! to the caller; [`refresh_access_token`] exchanges a long-lived refresh token
//! for a new access token.

use crate::api::send_with_timeout;
use crate::headers::add_form_headers;
use crate::{HistoryError, Result};
use chrono::{DateTime, Duration, Utc};
use http_client::{HttpClient, Request};
use http_types::{Method, Url};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer token with an optional expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A token without an expiry never counts as expired locally; the
    /// service will reject it if it has.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Application credentials plus a user's refresh token.
#[derive(Clone)]
pub struct RefreshCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl RefreshCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub(crate) fn form_body(&self) -> String {
        format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}&client_secret={}",
            urlencoding::encode(&self.refresh_token),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.client_secret),
        )
    }
}

impl fmt::Debug for RefreshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Interpret a token endpoint response.
///
/// OAuth error bodies (`invalid_grant`, `invalid_client`) on a 400 or 401 are
/// authentication failures. Other statuses follow the Web API mapping.
pub fn parse_token_response(
    status: u16,
    retry_after: Option<&str>,
    body: &str,
    now: DateTime<Utc>,
) -> Result<AccessToken> {
    if !(200..300).contains(&status) {
        if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
            if status == 400 || status == 401 {
                let message = err
                    .error_description
                    .unwrap_or_else(|| err.error.clone());
                return Err(HistoryError::Authentication(format!(
                    "{}: {}",
                    err.error, message
                )));
            }
        }
        crate::api::check_status(status, retry_after, body)?;
    }

    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| HistoryError::Parse(format!("Malformed token response: {e}")))?;

    let token = AccessToken::new(response.access_token);
    Ok(match response.expires_in {
        Some(secs) => token.with_expiry(now + Duration::seconds(secs)),
        None => token,
    })
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &dyn HttpClient,
    accounts_url: &str,
    credentials: &RefreshCredentials,
    timeout_secs: Option<u64>,
) -> Result<AccessToken> {
    let url = format!("{}/api/token", accounts_url.trim_end_matches('/'));
    let parsed = url
        .parse::<Url>()
        .map_err(|e| HistoryError::Config(format!("Invalid accounts URL '{url}': {e}")))?;

    let mut request = Request::new(Method::Post, parsed);
    add_form_headers(&mut request);
    request.set_body(credentials.form_body());

    log::debug!("Refreshing access token via {url}");
    let mut response = send_with_timeout(client, request, timeout_secs).await?;
    let status: u16 = response.status().into();
    let retry_after = response
        .header("retry-after")
        .and_then(|h| h.get(0))
        .map(|v| v.as_str().to_string());
    let body = response
        .body_string()
        .await
        .map_err(|e| HistoryError::Http(e.to_string()))?;

    parse_token_response(status, retry_after.as_deref(), &body, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry() {
        let token = AccessToken::new("t");
        assert!(!token.is_expired(now()));

        let token = token.with_expiry(now());
        assert!(token.is_expired(now()));
        assert!(!token.is_expired(now() - Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", AccessToken::new("super-secret"));
        assert!(!debug.contains("super-secret"));

        let creds = RefreshCredentials::new("id", "shh", "refresh");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("shh"));
    }

    #[test]
    fn test_form_body_is_encoded() {
        let creds = RefreshCredentials::new("id", "a&b", "r/t=");
        assert_eq!(
            creds.form_body(),
            "grant_type=refresh_token&refresh_token=r%2Ft%3D&client_id=id&client_secret=a%26b"
        );
    }

    #[test]
    fn test_parse_token_success() {
        let body = r#"{"access_token":"new","token_type":"Bearer","expires_in":3600,"scope":"user-read-recently-played"}"#;
        let token = parse_token_response(200, None, body, now()).unwrap();
        assert_eq!(token.secret(), "new");
        assert_eq!(token.expires_at(), Some(now() + Duration::hours(1)));
    }

    #[test]
    fn test_parse_token_invalid_grant() {
        let body = r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#;
        match parse_token_response(400, None, body, now()) {
            Err(HistoryError::Authentication(msg)) => {
                assert!(msg.contains("Refresh token revoked"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_token_rate_limited() {
        assert!(matches!(
            parse_token_response(429, Some("12"), "", now()),
            Err(HistoryError::RateLimit { retry_after: 12 })
        ));
    }
}
