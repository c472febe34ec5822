//! Envelope paths for `MAIL FROM` and `RCPT TO`.

use std::fmt;

use crate::error::{Error, Result};

/// A mailbox as it appears between the angle brackets of an envelope path.
///
/// Only line breaks are rejected, since they would end the command line.
/// Syntax beyond that is the server's business, so `postmaster` (no domain)
/// and quoted local parts such as `"john doe"@example.com` pass through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a forward path (recipient).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is empty or contains
    /// CR or LF.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if addr.is_empty() {
            return Err(Error::InvalidAddress("recipient cannot be empty".into()));
        }
        check_path(&addr)?;
        Ok(Self(addr))
    }

    /// Creates a reverse path (sender). The empty string is the null
    /// reverse path `<>` used for bounces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address contains CR or LF.
    pub fn reverse_path(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        check_path(&addr)?;
        Ok(Self(addr))
    }

    /// Returns true for the null reverse path.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_path(addr: &str) -> Result<()> {
    if addr.contains(['\r', '\n']) {
        return Err(Error::InvalidAddress(format!("{addr:?} contains a line break")));
    }
    Ok(())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_mailboxes() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
        assert!(Address::new("postmaster").is_ok());
        assert!(Address::new("jörg@exämple.de").is_ok());
    }

    #[test]
    fn recipient_must_not_be_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn null_reverse_path() {
        let addr = Address::reverse_path("").unwrap();
        assert!(addr.is_null());
        assert!(!Address::reverse_path("a@b.c").unwrap().is_null());
    }

    #[test]
    fn passes_quoted_local_parts_through() {
        let addr = Address::new("\"john doe\"@example.com").unwrap();
        assert_eq!(addr.as_str(), "\"john doe\"@example.com");
        assert!(Address::reverse_path("\"a>b\"@example.com").is_ok());
    }

    #[test]
    fn rejects_line_breaks() {
        for bad in [
            "user@example.com\r\nRCPT TO:<x@y.z>",
            "user@example.com\n",
            "\ruser@example.com",
        ] {
            assert!(
                matches!(Address::new(bad), Err(Error::InvalidAddress(_))),
                "{bad:?}"
            );
            assert!(Address::reverse_path(bad).is_err(), "{bad:?}");
        }
    }
}
