//! SMTP connection management.
//!
//! - [`SmtpStream`]: buffered line I/O over any [`Transport`], with in-place
//!   STARTTLS upgrade
//! - [`Client`]: the command-level session (greeting, STARTTLS, AUTH,
//!   MAIL/RCPT/DATA, QUIT)
//! - [`DataWriter`]: dot-stuffing writer for the DATA phase

mod client;
mod data;
mod stream;

pub use client::{Client, DEFAULT_LOCAL_NAME};
pub use data::{DataWriter, DotStuffer};
pub use stream::{BoxedTransport, SmtpStream, Transport};
