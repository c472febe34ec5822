//! SMTP commands and their wire form.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// A command line sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELO`, the fallback greeting.
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// `EHLO`
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH` with an optional initial response (RFC 4954).
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Base64 initial response; empty is sent as `=`.
        initial_response: Option<String>,
    },
    /// A base64 line answering a 334 challenge, or `*` to cancel.
    AuthResponse(String),
    /// `MAIL FROM`
    MailFrom {
        /// Reverse path
        from: Address,
        /// Append `BODY=8BITMIME`
        eight_bit_mime: bool,
        /// Append `SMTPUTF8`
        smtp_utf8: bool,
    },
    /// `RCPT TO`
    RcptTo {
        /// Forward path
        to: Address,
    },
    /// `DATA`
    Data,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Returns the command line including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// Returns the line for logging, with credentials masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {mechanism} ****"),
            Self::AuthResponse(line) if line != "*" => "****".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo { hostname } => write!(f, "HELO {hostname}"),
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => write!(f, "AUTH {mechanism}"),
            Self::Auth {
                mechanism,
                initial_response: Some(resp),
            } => {
                let resp = if resp.is_empty() { "=" } else { resp.as_str() };
                write!(f, "AUTH {mechanism} {resp}")
            }
            Self::AuthResponse(line) => f.write_str(line),
            Self::MailFrom {
                from,
                eight_bit_mime,
                smtp_utf8,
            } => {
                write!(f, "MAIL FROM:<{from}>")?;
                if *eight_bit_mime {
                    f.write_str(" BODY=8BITMIME")?;
                }
                if *smtp_utf8 {
                    f.write_str(" SMTPUTF8")?;
                }
                Ok(())
            }
            Self::RcptTo { to } => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}
