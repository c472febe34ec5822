//! Seams between the dialer and the protocol client.
//!
//! [`Dialer`](crate::Dialer) drives an [`SmtpClient`] built by a
//! [`Connector`]. The default [`SmtpConnector`] speaks real SMTP through
//! `maildial_smtp`; tests substitute their own.

use std::future::Future;

use maildial_smtp::{Auth, BoxedTransport, Client, DataWriter, Result, SmtpStream, TlsConfig};
use tokio::io::AsyncWrite;

/// Command-level operations the dialer and sender need from a session.
pub trait SmtpClient: Send {
    /// Writer for the DATA phase.
    type Data<'a>: DataChannel
    where
        Self: 'a;

    /// Sends EHLO/HELO with `local_name`.
    fn hello(&mut self, local_name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns the parameters of an advertised extension, greeting first if
    /// needed.
    fn extension(&mut self, name: &str) -> impl Future<Output = Option<String>> + Send;

    /// Upgrades the connection with STARTTLS.
    fn start_tls(&mut self, config: &TlsConfig) -> impl Future<Output = Result<()>> + Send;

    /// Authenticates.
    fn auth(&mut self, auth: &Auth) -> impl Future<Output = Result<()>> + Send;

    /// Sends `MAIL FROM`.
    fn mail(&mut self, from: &str) -> impl Future<Output = Result<()>> + Send;

    /// Sends `RCPT TO`.
    fn rcpt(&mut self, to: &str) -> impl Future<Output = Result<()>> + Send;

    /// Opens the DATA channel.
    fn data(&mut self) -> impl Future<Output = Result<Self::Data<'_>>> + Send;

    /// Sends QUIT and closes the connection.
    fn quit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the connection without QUIT.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// The DATA phase writer.
pub trait DataChannel: AsyncWrite + Unpin + Send {
    /// Terminates the message and waits for the server to accept it.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Builds sessions on top of a freshly dialed transport.
pub trait Connector: Send + Sync {
    /// The session type produced.
    type Client: SmtpClient;

    /// Runs the implicit-TLS handshake over `transport`.
    fn wrap_tls(
        &self,
        transport: BoxedTransport,
        config: &TlsConfig,
    ) -> impl Future<Output = Result<BoxedTransport>> + Send;

    /// Reads the greeting and returns a session. `tls` tells the session
    /// whether `transport` is already encrypted.
    fn new_client(
        &self,
        transport: BoxedTransport,
        tls: bool,
        host: &str,
    ) -> impl Future<Output = Result<Self::Client>> + Send;
}

/// The connector used by default: rustls for TLS, [`Client`] for SMTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

impl Connector for SmtpConnector {
    type Client = Client;

    async fn wrap_tls(&self, transport: BoxedTransport, config: &TlsConfig) -> Result<BoxedTransport> {
        let tls = config.connect(transport).await?;
        Ok(Box::new(tls))
    }

    async fn new_client(&self, transport: BoxedTransport, tls: bool, host: &str) -> Result<Client> {
        let stream = if tls {
            SmtpStream::encrypted(transport)
        } else {
            SmtpStream::new(transport)
        };
        Client::new(stream, host).await
    }
}

impl SmtpClient for Client {
    type Data<'a> = DataWriter<'a>;

    fn hello(&mut self, local_name: &str) -> impl Future<Output = Result<()>> + Send {
        Client::hello(self, local_name)
    }

    fn extension(&mut self, name: &str) -> impl Future<Output = Option<String>> + Send {
        Client::extension(self, name)
    }

    fn start_tls(&mut self, config: &TlsConfig) -> impl Future<Output = Result<()>> + Send {
        Client::start_tls(self, config)
    }

    fn auth(&mut self, auth: &Auth) -> impl Future<Output = Result<()>> + Send {
        Client::auth(self, auth)
    }

    fn mail(&mut self, from: &str) -> impl Future<Output = Result<()>> + Send {
        Client::mail(self, from)
    }

    fn rcpt(&mut self, to: &str) -> impl Future<Output = Result<()>> + Send {
        Client::rcpt(self, to)
    }

    fn data(&mut self) -> impl Future<Output = Result<DataWriter<'_>>> + Send {
        Client::data(self)
    }

    fn quit(&mut self) -> impl Future<Output = Result<()>> + Send {
        Client::quit(self)
    }

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send {
        Client::close(self)
    }
}

impl DataChannel for DataWriter<'_> {
    fn close(self) -> impl Future<Output = Result<()>> + Send {
        DataWriter::close(self)
    }
}
