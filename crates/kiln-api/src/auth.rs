use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://bartinst-user-service-prod.herokuapp.com/login";
pub const DEFAULT_SETTINGS_URL: &str = "https://kiln.bartinst.com/kilns/settings";
pub const DEFAULT_DATA_URL: &str = "https://kiln.bartinst.com/kilns/data";

/// Account credentials for the Kiln Aid cloud.
///
/// Supplied once by the host at setup time and kept in memory only.
#[derive(Debug, Clone)]
pub struct Credentials {
    email: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

/// Opaque session token issued by the login endpoint.
///
/// Authenticated endpoints also want the account email alongside the
/// token, so the two travel together.
#[derive(Debug, Clone)]
pub struct SessionToken {
    email: String,
    token: SecretString,
}

impl SessionToken {
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: SecretString::from(token.into()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Value for the `auth-token` header.
    pub(crate) fn cookie_value(&self) -> String {
        format!("binst-cookie={}", self.token.expose_secret())
    }

    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }
}

/// The three vendor endpoints. Overridable for testing and for the
/// (hypothetical) day the vendor moves hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub login: Url,
    pub settings: Url,
    pub data: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: Url::parse(DEFAULT_LOGIN_URL).expect("static login URL"),
            settings: Url::parse(DEFAULT_SETTINGS_URL).expect("static settings URL"),
            data: Url::parse(DEFAULT_DATA_URL).expect("static data URL"),
        }
    }
}

impl Endpoints {
    /// Lay the vendor paths out under a single base URL.
    ///
    /// `https://host` becomes `https://host/login`, `https://host/kilns/settings`
    /// and `https://host/kilns/data`.
    pub fn from_base(base: &str) -> Result<Self, Error> {
        let mut base = Url::parse(base)?;
        let path = base.path().trim_end_matches('/').to_owned();
        base.set_path(&format!("{path}/"));

        Ok(Self {
            login: base.join("login")?,
            settings: base.join("kilns/settings")?,
            data: base.join("kilns/data")?,
        })
    }
}
