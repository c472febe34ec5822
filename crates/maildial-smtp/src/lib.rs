//! # maildial-smtp
//!
//! The SMTP protocol client behind `maildial`: command serialization, reply
//! parsing, EHLO extension discovery, STARTTLS over rustls, SASL
//! authentication and the dot-stuffed DATA phase.
//!
//! ## Quick Start
//!
//! ```ignore
//! use maildial_smtp::{Auth, Client, SmtpStream, TlsConfig};
//! use tokio::io::AsyncWriteExt;
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> maildial_smtp::Result<()> {
//!     let tcp = TcpStream::connect("smtp.example.com:587").await?;
//!     let mut client = Client::new(SmtpStream::new(Box::new(tcp)), "smtp.example.com").await?;
//!
//!     client.hello("client.example.com").await?;
//!     client.start_tls(&TlsConfig::new("smtp.example.com")).await?;
//!     client
//!         .auth(&Auth::plain("", "user@example.com", "password", "smtp.example.com"))
//!         .await?;
//!
//!     client.mail("sender@example.com").await?;
//!     client.rcpt("recipient@example.com").await?;
//!     let mut data = client.data().await?;
//!     data.write_all(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!     data.close().await?;
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanisms (PLAIN, LOGIN, CRAM-MD5, XOAUTH2)
//! - [`command`]: SMTP command builders
//! - [`connection`]: Streams, the client session and the DATA writer
//! - [`parser`]: Reply parser
//! - [`tls`]: rustls client configuration
//! - [`types`]: Addresses, extensions and replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod tls;
pub mod types;

pub use auth::Auth;
pub use connection::{BoxedTransport, Client, DataWriter, SmtpStream, Transport};
pub use error::{Error, Result};
pub use tls::{TlsConfig, TlsVersion};
pub use types::{Address, AuthMechanism, Extensions, Reply, ReplyCode};
