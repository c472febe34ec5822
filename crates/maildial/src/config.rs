//! Serializable dialer settings.

use std::time::Duration;

use maildial_smtp::{Auth, AuthMechanism};
use serde::{Deserialize, Serialize};

use crate::dialer::{DEFAULT_TIMEOUT, Dialer, SMTPS_PORT};
use crate::error::{Error, Result};
use crate::policy::StartTlsPolicy;

/// Dialer settings as they appear in an application's config file.
///
/// ```json
/// {
///   "host": "smtp.example.com",
///   "port": 587,
///   "username": "user@example.com",
///   "password": "secret",
///   "starttls_policy": "mandatory"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialerConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Username, empty for no authentication.
    #[serde(default)]
    pub username: String,
    /// Password, or the access token for XOAUTH2.
    #[serde(default)]
    pub password: String,
    /// Force a mechanism (`PLAIN`, `LOGIN`, `CRAM-MD5`, `XOAUTH2`) instead of
    /// negotiating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,
    /// Implicit TLS. Defaults to `port == 465`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    /// STARTTLS policy.
    #[serde(default)]
    pub starttls_policy: StartTlsPolicy,
    /// Name to greet the server with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    /// Overall timeout in seconds, 0 to disable.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default)]
    pub read_timeout_secs: u64,
    /// Write timeout in seconds.
    #[serde(default)]
    pub write_timeout_secs: u64,
    /// Redial once when a send finds the connection dead.
    #[serde(default = "default_retry")]
    pub retry_failure: bool,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

const fn default_retry() -> bool {
    true
}

impl DialerConfig {
    /// Builds a [`Dialer`] from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the mechanism is
    /// unknown.
    pub fn into_dialer(self) -> Result<Dialer> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }

        let auth = self
            .mechanism
            .as_deref()
            .map(|name| {
                let mechanism = AuthMechanism::parse(name)
                    .ok_or_else(|| Error::Config(format!("unknown auth mechanism: {name}")))?;
                Ok::<_, Error>(match mechanism {
                    AuthMechanism::Plain => {
                        Auth::plain("", &self.username, &self.password, &self.host)
                    }
                    AuthMechanism::Login => Auth::login(&self.username, &self.password, &self.host),
                    AuthMechanism::CramMd5 => Auth::cram_md5(&self.username, &self.password),
                    AuthMechanism::XOAuth2 => Auth::xoauth2(&self.username, &self.password),
                })
            })
            .transpose()?;

        let mut dialer = Dialer::new(self.host, self.port, self.username, self.password)
            .ssl(self.ssl.unwrap_or(self.port == SMTPS_PORT))
            .starttls_policy(self.starttls_policy)
            .timeout(Duration::from_secs(self.timeout_secs))
            .read_timeout(Duration::from_secs(self.read_timeout_secs))
            .write_timeout(Duration::from_secs(self.write_timeout_secs))
            .retry_failure(self.retry_failure);
        if let Some(auth) = auth {
            dialer = dialer.auth(auth);
        }
        if let Some(name) = self.local_name {
            dialer = dialer.local_name(name);
        }
        Ok(dialer)
    }
}

impl TryFrom<DialerConfig> for Dialer {
    type Error = Error;

    fn try_from(config: DialerConfig) -> Result<Self> {
        config.into_dialer()
    }
}
