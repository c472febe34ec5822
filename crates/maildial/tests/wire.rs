//! Dialing and sending over scripted byte streams.
//!
//! Each dial pops the next `tokio_test` mock, so these tests check the exact
//! bytes the default connector puts on the wire, including the reconnect.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use maildial::{Dialer, Envelope, Error, StartTlsPolicy};
use tokio_test::io::{Builder, Mock};

const GREETING: &[u8] = b"220 localhost ESMTP\r\n";

fn dialer(username: &str, mocks: Vec<Mock>) -> Dialer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mocks = Arc::new(Mutex::new(VecDeque::from(mocks)));
    Dialer::new("localhost", 25, username, "pass").dial_proxy(move |network: &str, _addr: &str| {
        assert_eq!(network, "tcp");
        let next = mocks.lock().unwrap().pop_front();
        async move { next.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused)) }
    })
}

fn message() -> Envelope<&'static str> {
    Envelope::new("a@example.com", ["b@example.com"], "Subject: hi\n\nhello\n")
}

#[tokio::test]
async fn test_send_with_plain_auth() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"EHLO localhost\r\n")
        .read(b"250-localhost\r\n250 AUTH PLAIN\r\n")
        .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"235 2.7.0 Accepted\r\n")
        .write(b"MAIL FROM:<a@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<b@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go ahead\r\n")
        .write(b"Subject: hi\r\n\r\nhello\r\n.\r\n")
        .read(b"250 queued\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 bye\r\n")
        .build();

    let mut sender = dialer("user", vec![mock]).dial().await.unwrap();
    sender.send(&message()).await.unwrap();
    sender.close().await.unwrap();
}

#[tokio::test]
async fn test_redials_when_server_hung_up() {
    let stale = Builder::new()
        .read(GREETING)
        .write(b"EHLO localhost\r\n")
        .read(b"250 localhost\r\n")
        .write(b"MAIL FROM:<a@example.com>\r\n")
        .build();
    let fresh = Builder::new()
        .read(GREETING)
        .write(b"EHLO localhost\r\n")
        .read(b"250 localhost\r\n")
        .write(b"MAIL FROM:<a@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<b@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go ahead\r\n")
        .write(b"Subject: hi\r\n\r\nhello\r\n.\r\n")
        .read(b"250 queued\r\n")
        .build();

    let mut sender = dialer("", vec![stale, fresh]).dial().await.unwrap();
    sender.send(&message()).await.unwrap();
}

#[tokio::test]
async fn test_mandatory_starttls_not_offered() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"EHLO localhost\r\n")
        .read(b"250-localhost\r\n250 AUTH PLAIN\r\n")
        .build();

    let err = dialer("user", vec![mock])
        .starttls_policy(StartTlsPolicy::Mandatory)
        .dial()
        .await
        .unwrap_err();
    assert!(err.is_starttls_unsupported());
}

#[tokio::test]
async fn test_local_name_is_sent_in_ehlo() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"EHLO client.example.com\r\n")
        .read(b"250 localhost\r\n")
        .build();

    dialer("", vec![mock])
        .local_name("client.example.com")
        .dial()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bad_greeting_fails_dial() {
    let mock = Builder::new().read(b"554 go away\r\n").build();
    let err = dialer("", vec![mock]).dial().await.unwrap_err();
    assert!(matches!(err, Error::Smtp(ref e) if e.is_permanent()));
}

#[tokio::test]
async fn test_dial_error_is_returned_verbatim() {
    let err = dialer("", Vec::new()).dial().await.unwrap_err();
    assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
}
