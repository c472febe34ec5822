//! Error types for dialing and sending.

use std::io;

use crate::policy::StartTlsPolicy;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Dialer`](crate::Dialer) and [`Sender`](crate::Sender).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport error: the dial function failed, or writing the message
    /// body failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Implicit TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] maildial_smtp::Error),

    /// The policy requires STARTTLS but the server does not offer it.
    #[error("{policy} required, but SMTP server does not support STARTTLS")]
    StartTlsUnsupported {
        /// The policy that was in force.
        policy: StartTlsPolicy,
    },

    /// The STARTTLS upgrade failed.
    #[error("StartTLS failed: {0}")]
    StartTls(#[source] maildial_smtp::Error),

    /// Authentication failed.
    #[error("Auth failed: {0}")]
    Auth(#[source] maildial_smtp::Error),

    /// A recipient was rejected.
    #[error("RCPT TO failed for <{recipient}>: {source}")]
    Rcpt {
        /// The rejected recipient.
        recipient: String,
        /// Server or transport error.
        #[source]
        source: maildial_smtp::Error,
    },

    /// The server refused to start the DATA phase.
    #[error("DATA failed: {0}")]
    Data(#[source] maildial_smtp::Error),

    /// One envelope of a batch could not be sent.
    #[error("could not send envelope {index}: {source}")]
    Envelope {
        /// Position of the envelope in the batch.
        index: usize,
        /// Why it failed.
        #[source]
        source: Box<Error>,
    },

    /// Invalid dialer configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Any other protocol failure (greeting, HELO, MAIL, end of DATA, QUIT).
    #[error(transparent)]
    Smtp(#[from] maildial_smtp::Error),
}

impl Error {
    /// Returns true if dialing failed because STARTTLS was required but not
    /// offered.
    #[must_use]
    pub const fn is_starttls_unsupported(&self) -> bool {
        matches!(self, Self::StartTlsUnsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_error_message() {
        let err = Error::StartTlsUnsupported {
            policy: StartTlsPolicy::Mandatory,
        };
        assert!(err.is_starttls_unsupported());
        assert_eq!(
            err.to_string(),
            "MandatoryStartTLS required, but SMTP server does not support STARTTLS"
        );
    }

    #[test]
    fn wrapped_errors_keep_source() {
        use std::error::Error as _;

        let err = Error::Rcpt {
            recipient: "b@y.com".into(),
            source: maildial_smtp::Error::smtp_error(550, "unknown user"),
        };
        assert_eq!(
            err.to_string(),
            "RCPT TO failed for <b@y.com>: SMTP error 550: unknown user"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn io_is_transparent() {
        let err = Error::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(err.to_string(), "refused");
    }
}
