//! # maildial
//!
//! Opens authenticated SMTP sessions and sends messages over them.
//!
//! A [`Dialer`] holds the connection settings. [`Dialer::dial`] connects,
//! upgrades with STARTTLS according to the [`StartTlsPolicy`], negotiates
//! authentication and returns a [`Sender`]. The sender transmits
//! [`Envelope`]s one at a time and transparently redials once when it finds
//! the connection dead.
//!
//! ## Quick Start
//!
//! ```ignore
//! use maildial::{Dialer, Envelope, StartTlsPolicy};
//!
//! #[tokio::main]
//! async fn main() -> maildial::Result<()> {
//!     let dialer = Dialer::new("smtp.example.com", 587, "user@example.com", "password")
//!         .starttls_policy(StartTlsPolicy::Mandatory);
//!
//!     let mut sender = dialer.dial().await?;
//!     let message = Envelope::new(
//!         "user@example.com",
//!         ["friend@example.org"],
//!         "Subject: Hello\r\n\r\nHi there!\r\n",
//!     );
//!     sender.send(&message).await?;
//!     sender.close().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: The traits the dialer drives and the default connector
//! - [`config`]: Serializable settings
//! - [`deadline`]: Read/write deadlines on the transport

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod deadline;
mod dialer;
mod envelope;
mod error;
mod policy;
mod sender;

pub use client::{Connector, DataChannel, SmtpClient, SmtpConnector};
pub use config::DialerConfig;
pub use dialer::{DEFAULT_TIMEOUT, DialFn, DialFuture, Dialer, SMTPS_PORT};
pub use envelope::{Envelope, MessageBody};
pub use error::{Error, Result};
pub use policy::{ParsePolicyError, StartTlsPolicy};
pub use sender::Sender;

pub use maildial_smtp::{Auth, AuthMechanism, BoxedTransport, TlsConfig, TlsVersion, Transport};
