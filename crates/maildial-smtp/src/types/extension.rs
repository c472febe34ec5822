//! SMTP service extensions advertised in the EHLO reply.

use std::collections::HashMap;

/// Extensions advertised by the server, keyed by upper-cased keyword.
///
/// Each EHLO line after the first is `KEYWORD [params...]`; the parameters
/// are kept verbatim so callers can inspect them (for example the `AUTH`
/// mechanism list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    entries: HashMap<String, String>,
}

impl Extensions {
    /// Builds the extension table from EHLO reply lines, skipping the
    /// greeting line.
    #[must_use]
    pub fn from_ehlo<S: AsRef<str>>(lines: &[S]) -> Self {
        let entries = lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                let line = line.as_ref().trim();
                if line.is_empty() {
                    return None;
                }
                let (keyword, params) = line.split_once(' ').unwrap_or((line, ""));
                Some((keyword.to_ascii_uppercase(), params.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Returns the parameters of an extension if the server advertised it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Checks whether the server advertised an extension.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the advertised authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.get("AUTH")
            .map(|params| params.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.get("SIZE").and_then(|s| s.parse().ok())
    }

    /// Returns true when no extensions were advertised (e.g. after HELO).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SASL authentication mechanism names understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// CRAM-MD5 - challenge-response
    CramMd5,
    /// `XOAUTH2` - `OAuth2` bearer token (Google/Microsoft)
    XOAuth2,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as sent in `AUTH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
