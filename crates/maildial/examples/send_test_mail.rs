#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: Send a test message using settings from a JSON file
//!
//! ## Config file
//!
//! ```json
//! {
//!   "host": "smtp.office365.com",
//!   "port": 587,
//!   "username": "you@outlook.com",
//!   "password": "app-password",
//!   "starttls_policy": "mandatory"
//! }
//! ```
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=maildial=debug cargo run --package maildial --example send_test_mail -- smtp.json
//! ```

use std::io::{self, Write};

use maildial::{DialerConfig, Envelope};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .expect("usage: send_test_mail <config.json>");
    let config: DialerConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let from = config.username.clone();
    let dialer = config.into_dialer()?;

    print!("Recipient: ");
    io::stdout().flush()?;
    let mut to = String::new();
    io::stdin().read_line(&mut to)?;
    let to = to.trim().to_string();

    println!("\nConnecting to {}...", dialer.address());
    let mut sender = dialer.dial().await?;
    println!("✓ Connected and authenticated");

    let body = format!(
        "From: {from}\r\nTo: {to}\r\nSubject: maildial test\r\n\r\nIt works.\r\n"
    );
    sender.send(&Envelope::new(from, [to], body)).await?;
    println!("✓ Message accepted");

    sender.close().await?;
    println!("✓ Disconnected");

    Ok(())
}
