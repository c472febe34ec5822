//! SASL authentication mechanisms for SMTP `AUTH`.
//!
//! Implements:
//! - PLAIN (RFC 4616)
//! - LOGIN (legacy, draft-murchison-sasl-login)
//! - CRAM-MD5 (RFC 2195)
//! - XOAUTH2 (Google/Microsoft proprietary)
//!
//! Each mechanism is a two-step exchange driven by the client: [`Auth::start`]
//! picks the mechanism name and optional initial response, then
//! [`Auth::next`] answers every `334` challenge the server sends.

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};
use crate::types::AuthMechanism;

type HmacMd5 = Hmac<Md5>;

/// What the client knows about the server when authentication starts.
#[derive(Debug, Clone)]
pub struct ServerInfo<'a> {
    /// Server name the client was created for.
    pub name: &'a str,
    /// Whether the connection is encrypted.
    pub tls: bool,
    /// Mechanisms from the `AUTH` extension.
    pub mechanisms: &'a [String],
}

/// An authentication mechanism together with its credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// PLAIN: `identity \0 username \0 password` in a single response.
    Plain {
        /// Authorization identity (usually empty).
        identity: String,
        /// Authentication identity.
        username: String,
        /// Password.
        password: String,
        /// Host the credentials are meant for.
        host: String,
    },
    /// LOGIN: answers the `Username:` and `Password:` prompts.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
        /// Host the credentials are meant for.
        host: String,
    },
    /// CRAM-MD5: HMAC-MD5 of the server challenge keyed with the secret.
    CramMd5 {
        /// Username.
        username: String,
        /// Shared secret.
        secret: String,
    },
    /// XOAUTH2: `OAuth2` bearer token.
    XOAuth2 {
        /// User email address.
        user: String,
        /// Access token.
        token: String,
    },
}

impl Auth {
    /// PLAIN authentication bound to `host`.
    #[must_use]
    pub fn plain(
        identity: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self::Plain {
            identity: identity.into(),
            username: username.into(),
            password: password.into(),
            host: host.into(),
        }
    }

    /// LOGIN authentication bound to `host`.
    #[must_use]
    pub fn login(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self::Login {
            username: username.into(),
            password: password.into(),
            host: host.into(),
        }
    }

    /// CRAM-MD5 authentication.
    #[must_use]
    pub fn cram_md5(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::CramMd5 {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// XOAUTH2 authentication.
    #[must_use]
    pub fn xoauth2(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self::XOAuth2 {
            user: user.into(),
            token: token.into(),
        }
    }

    /// Returns the mechanism this value authenticates with.
    #[must_use]
    pub const fn mechanism(&self) -> AuthMechanism {
        match self {
            Self::Plain { .. } => AuthMechanism::Plain,
            Self::Login { .. } => AuthMechanism::Login,
            Self::CramMd5 { .. } => AuthMechanism::CramMd5,
            Self::XOAuth2 { .. } => AuthMechanism::XOAuth2,
        }
    }

    /// Begins the exchange and returns the initial response, if any.
    ///
    /// # Errors
    ///
    /// PLAIN refuses to run over an unencrypted connection to anything but
    /// localhost, LOGIN refuses unless the connection is encrypted or the
    /// server advertised LOGIN, and both refuse when the server name does
    /// not match the host the credentials were created for.
    pub fn start(&self, server: &ServerInfo<'_>) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Plain {
                identity,
                username,
                password,
                host,
            } => {
                if !server.tls && !is_localhost(server.name) {
                    return Err(Error::Auth("unencrypted connection".into()));
                }
                check_host(server, host)?;
                Ok(Some(
                    format!("{identity}\0{username}\0{password}").into_bytes(),
                ))
            }
            Self::Login { host, .. } => {
                let advertised = server
                    .mechanisms
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case("LOGIN"));
                if !server.tls && !advertised {
                    return Err(Error::Auth("unencrypted connection".into()));
                }
                check_host(server, host)?;
                Ok(None)
            }
            Self::CramMd5 { .. } => Ok(None),
            Self::XOAuth2 { user, token } => Ok(Some(
                format!("user={user}\x01auth=Bearer {token}\x01\x01").into_bytes(),
            )),
        }
    }

    /// Answers a server challenge. `more` is true for a `334` continuation
    /// and false once the server reported success; `None` ends the exchange.
    ///
    /// # Errors
    ///
    /// Returns an error when the server sends a challenge the mechanism does
    /// not expect.
    pub fn next(&self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if !more {
            return Ok(None);
        }
        match self {
            Self::Plain { .. } => Err(Error::Auth("unexpected server challenge".into())),
            Self::Login {
                username, password, ..
            } => match challenge {
                b"Username:" => Ok(Some(username.clone().into_bytes())),
                b"Password:" => Ok(Some(password.clone().into_bytes())),
                _ => Err(Error::Auth(format!(
                    "unexpected server challenge: {}",
                    String::from_utf8_lossy(challenge)
                ))),
            },
            Self::CramMd5 { username, secret } => {
                let digest = cram_md5_digest(secret, challenge)?;
                Ok(Some(format!("{username} {digest}").into_bytes()))
            }
            // The server sent a JSON error description; an empty reply
            // makes it finish with the final failure code.
            Self::XOAuth2 { .. } => Ok(Some(Vec::new())),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs.
        f.debug_struct("Auth")
            .field("mechanism", &self.mechanism())
            .finish_non_exhaustive()
    }
}

fn check_host(server: &ServerInfo<'_>, host: &str) -> Result<()> {
    if server.name == host {
        Ok(())
    } else {
        Err(Error::Auth("wrong host name".into()))
    }
}

fn is_localhost(name: &str) -> bool {
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}

/// Computes the CRAM-MD5 HMAC digest as a lowercase hex string.
fn cram_md5_digest(secret: &str, challenge: &[u8]) -> Result<String> {
    let mut mac = HmacMd5::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Auth(format!("CRAM-MD5 key rejected: {e}")))?;
    mac.update(challenge);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server<'a>(name: &'a str, tls: bool, mechanisms: &'a [String]) -> ServerInfo<'a> {
        ServerInfo {
            name,
            tls,
            mechanisms,
        }
    }

    #[test]
    fn plain_initial_response() {
        let auth = Auth::plain("", "user", "pass", "smtp.example.com");
        let resp = auth.start(&server("smtp.example.com", true, &[])).unwrap();
        assert_eq!(resp.as_deref(), Some(&b"\0user\0pass"[..]));
        assert_eq!(auth.next(b"", false).unwrap(), None);
    }

    #[test]
    fn plain_refuses_cleartext_to_remote_host() {
        let auth = Auth::plain("", "user", "pass", "smtp.example.com");
        let err = auth
            .start(&server("smtp.example.com", false, &[]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: unencrypted connection");
    }

    #[test]
    fn plain_allows_cleartext_to_localhost() {
        let auth = Auth::plain("", "user", "pass", "localhost");
        assert!(auth.start(&server("localhost", false, &[])).is_ok());
    }

    #[test]
    fn plain_rejects_wrong_host() {
        let auth = Auth::plain("", "user", "pass", "smtp.example.com");
        let err = auth.start(&server("evil.example.net", true, &[])).unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: wrong host name");
    }

    #[test]
    fn plain_rejects_challenge() {
        let auth = Auth::plain("", "user", "pass", "localhost");
        assert!(auth.next(b"what?", true).is_err());
    }

    #[test]
    fn login_answers_prompts() {
        let auth = Auth::login("user", "pass", "smtp.example.com");
        let mechs = vec!["LOGIN".to_string()];
        assert_eq!(
            auth.start(&server("smtp.example.com", false, &mechs)).unwrap(),
            None
        );
        assert_eq!(auth.next(b"Username:", true).unwrap(), Some(b"user".to_vec()));
        assert_eq!(auth.next(b"Password:", true).unwrap(), Some(b"pass".to_vec()));
        assert!(auth.next(b"Favourite colour:", true).is_err());
    }

    #[test]
    fn login_refuses_cleartext_when_not_advertised() {
        let auth = Auth::login("user", "pass", "smtp.example.com");
        assert!(auth.start(&server("smtp.example.com", false, &[])).is_err());
        assert!(auth.start(&server("smtp.example.com", true, &[])).is_ok());
    }

    #[test]
    fn cram_md5_rfc2195_vector() {
        let auth = Auth::cram_md5("tim", "tanstaaftanstaaf");
        assert_eq!(auth.start(&server("mx", false, &[])).unwrap(), None);
        let resp = auth
            .next(b"<1896.697170952@postoffice.reston.mci.net>", true)
            .unwrap()
            .unwrap();
        assert_eq!(resp, b"tim b913a602c7eda7a495b4e6e7334d3890".to_vec());
    }

    #[test]
    fn xoauth2_initial_response() {
        let auth = Auth::xoauth2("user@example.com", "ya29.token");
        let resp = auth.start(&server("mx", true, &[])).unwrap().unwrap();
        assert_eq!(
            resp,
            b"user=user@example.com\x01auth=Bearer ya29.token\x01\x01".to_vec()
        );
        assert_eq!(auth.next(b"{\"status\":\"401\"}", true).unwrap(), Some(vec![]));
    }

    #[test]
    fn debug_hides_credentials() {
        let auth = Auth::plain("", "user", "hunter2", "mx");
        let shown = format!("{auth:?}");
        assert!(shown.contains("Plain"));
        assert!(!shown.contains("hunter2"));
    }
}
