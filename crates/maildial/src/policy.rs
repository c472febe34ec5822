//! STARTTLS policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the dialer treats STARTTLS on a plaintext connection.
///
/// Has no effect when the dialer uses implicit TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum StartTlsPolicy {
    /// Upgrade when the server advertises STARTTLS, otherwise continue in
    /// the clear.
    #[default]
    Opportunistic = 0,
    /// Upgrade or abort: dialing fails when the server does not advertise
    /// STARTTLS.
    Mandatory = 1,
    /// Never upgrade; messages are sent in the clear.
    None = -1,
}

impl StartTlsPolicy {
    /// Returns the stored discriminant (`None` is `-1`).
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        self as i8
    }

    /// Returns true if the dialer should ask the server about STARTTLS.
    #[must_use]
    pub const fn applies(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for StartTlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Opportunistic => "OpportunisticStartTLS",
            Self::Mandatory => "MandatoryStartTLS",
            Self::None => "NoStartTLS",
        })
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown STARTTLS policy: {0}")]
pub struct ParsePolicyError(String);

impl FromStr for StartTlsPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opportunistic" | "opportunisticstarttls" => Ok(Self::Opportunistic),
            "mandatory" | "mandatorystarttls" => Ok(Self::Mandatory),
            "none" | "nostarttls" => Ok(Self::None),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}
