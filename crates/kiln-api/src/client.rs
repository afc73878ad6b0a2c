// Kiln Aid HTTP client
//
// Wraps `reqwest::Client` with the vendor's header conventions and
// status-code mapping. Every endpoint is a JSON POST; the app identifies
// itself through a fixed set of headers and authenticated calls add the
// session cookie as an `auth-token` header.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::auth::{Credentials, Endpoints, SessionToken};
use crate::error::Error;
use crate::models::{KilnInfo, KilnSettingsEntry, LoginResponse, RawPayload};
use crate::transport::TransportConfig;

const APP_ORIGIN: &str = "ionic://localhost";
const KAID_VERSION: &str = "kaid-plus";
const APP_NAME_TOKEN: &str = "kiln-aid";

/// Async client for the three Kiln Aid endpoints.
///
/// Cheap to clone (the inner `reqwest::Client` is reference counted), so
/// one client can serve a coordinator per kiln.
#[derive(Debug, Clone)]
pub struct KilnClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    timeout: Duration,
}

impl KilnClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(endpoints: Endpoints, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            endpoints,
            timeout: transport.timeout,
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            timeout: TransportConfig::default().timeout,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ── Headers ──────────────────────────────────────────────────────

    fn app_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("kaid-version", HeaderValue::from_static(KAID_VERSION));
        headers.insert("origin", HeaderValue::from_static(APP_ORIGIN));
        headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers
    }

    fn session_headers(token: &SessionToken) -> Result<HeaderMap, Error> {
        let mut headers = Self::app_headers();
        headers.insert("x-app-name-token", HeaderValue::from_static(APP_NAME_TOKEN));

        let mut cookie = HeaderValue::from_str(&token.cookie_value())
            .map_err(|_| Error::InvalidHeader { name: "auth-token" })?;
        cookie.set_sensitive(true);
        headers.insert(HeaderName::from_static("auth-token"), cookie);

        let email = HeaderValue::from_str(token.email())
            .map_err(|_| Error::InvalidHeader { name: "email" })?;
        headers.insert(HeaderName::from_static("email"), email);

        Ok(headers)
    }

    // ── Transport ────────────────────────────────────────────────────

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, Error> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                Error::Transport(e)
            }
        })
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    /// Map a non-success status from an authenticated endpoint.
    async fn status_error(status: StatusCode, resp: reqwest::Response) -> Error {
        match status {
            StatusCode::UNAUTHORIZED => Error::SessionExpired,
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
            s if s.is_server_error() => Error::Server { status: s.as_u16() },
            s => {
                let raw = resp.text().await.unwrap_or_default();
                Error::Api {
                    status: s.as_u16(),
                    message: if raw.is_empty() {
                        s.to_string()
                    } else {
                        raw.chars().take(200).collect()
                    },
                }
            }
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Exchange email/password for a session token.
    ///
    /// A 401 means the credentials are wrong; a 429 means the vendor is
    /// throttling logins. Anything else that is not a 2xx with an
    /// `authentication_token` is treated as a failed login.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, Error> {
        let url = self.endpoints.login.clone();
        debug!("logging in at {}", url);

        let body = json!({
            "email": credentials.email(),
            "password": credentials.password().expose_secret(),
        });

        let resp = self
            .send(
                self.http
                    .post(url)
                    .headers(Self::app_headers())
                    .json(&body),
            )
            .await?;

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Authentication {
                    message: "invalid credentials - check email and password".into(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(Error::RateLimited),
            s if !s.is_success() => {
                return Err(Error::Authentication {
                    message: format!("login failed (HTTP {s})"),
                });
            }
            _ => {}
        }

        let login: LoginResponse = Self::read_json(resp).await?;
        let token = login
            .authentication_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: "token not found in login response".into(),
            })?;

        debug!("login successful");
        Ok(SessionToken::new(credentials.email(), token))
    }

    /// List the kilns registered to the account.
    ///
    /// Entries without a `kiln_id` are skipped; an account with no usable
    /// kilns yields an empty `Vec`.
    pub async fn list_kilns(&self, token: &SessionToken) -> Result<Vec<KilnInfo>, Error> {
        let url = self.endpoints.settings.clone();
        debug!("POST {}", url);

        let resp = self
            .send(
                self.http
                    .post(url)
                    .headers(Self::session_headers(token)?)
                    .json(&json!({})),
            )
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error(status, resp).await);
        }

        let entries: Vec<KilnSettingsEntry> = Self::read_json(resp).await?;
        let total = entries.len();
        let kilns: Vec<KilnInfo> = entries
            .into_iter()
            .filter_map(KilnSettingsEntry::into_info)
            .collect();

        debug!(total, usable = kilns.len(), "fetched kiln settings");
        Ok(kilns)
    }

    /// Fetch current telemetry for one kiln.
    ///
    /// The endpoint answers with an array (one element per requested id);
    /// the first element is returned untouched.
    pub async fn fetch_status(
        &self,
        token: &SessionToken,
        kiln_id: &str,
    ) -> Result<RawPayload, Error> {
        let url = self.endpoints.data.clone();
        debug!(kiln_id, "POST {}", url);

        let resp = self
            .send(
                self.http
                    .post(url)
                    .headers(Self::session_headers(token)?)
                    .json(&json!({ "externalIds": [kiln_id] })),
            )
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::KilnNotFound);
        }
        if !status.is_success() {
            return Err(Self::status_error(status, resp).await);
        }

        let body: serde_json::Value = Self::read_json(resp).await?;
        match body {
            serde_json::Value::Array(items) => items
                .into_iter()
                .next()
                .map(RawPayload::new)
                .ok_or(Error::EmptyPayload),
            _ => Err(Error::EmptyPayload),
        }
    }
}
