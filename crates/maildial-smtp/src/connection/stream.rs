//! Low-level SMTP stream handling.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::tls::TlsConfig;
use crate::types::Reply;

/// A byte stream an SMTP session can run over: TCP, TLS, a proxy tunnel or
/// an in-memory mock.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Type-erased transport, so TLS layers can be stacked at runtime.
pub type BoxedTransport = Box<dyn Transport>;

/// Buffered SMTP stream over any [`Transport`].
pub struct SmtpStream {
    reader: BufReader<BoxedTransport>,
    tls: bool,
}

impl SmtpStream {
    /// Wraps a plaintext transport.
    #[must_use]
    pub fn new(transport: BoxedTransport) -> Self {
        Self {
            reader: BufReader::new(transport),
            tls: false,
        }
    }

    /// Wraps a transport that is already encrypted (implicit TLS).
    #[must_use]
    pub fn encrypted(transport: BoxedTransport) -> Self {
        Self {
            reader: BufReader::new(transport),
            tls: true,
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls
    }

    /// Reads one line, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, or `UnexpectedEof` if the server
    /// closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Reads a complete (possibly multi-line) reply.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let is_last = is_last_reply_line(&line);
            lines.push(line);
            if is_last {
                break;
            }
        }

        let reply = parse_reply(&lines)?;
        tracing::trace!(code = %reply.code, "S: reply");
        Ok(reply)
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let inner = self.reader.get_mut();
        inner.write_all(data).await?;
        inner.flush().await?;
        Ok(())
    }

    /// Sends a command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the command or reading the reply fails.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        tracing::trace!(command = %cmd.redacted(), "C: command");
        self.write_all(&cmd.serialize()).await?;
        self.read_reply().await
    }

    /// Gives the data writer direct access to the transport.
    pub(crate) fn transport_mut(&mut self) -> &mut BoxedTransport {
        self.reader.get_mut()
    }

    /// Upgrades a plaintext stream to TLS in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, if the server
    /// sent data ahead of the handshake, or if the handshake fails. After a
    /// failed handshake the stream is unusable.
    pub async fn upgrade_to_tls(&mut self, config: &TlsConfig) -> Result<()> {
        if self.tls {
            return Err(Error::Protocol("Already using TLS".into()));
        }
        // Anything buffered now was sent in cleartext after the 220 and
        // must not be read as if it came over TLS.
        if !self.reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "Server sent data before TLS handshake".into(),
            ));
        }

        // Placeholder while the transport is moved into the handshake.
        let (detached, _) = tokio::io::duplex(1);
        let plain = std::mem::replace(&mut self.reader, BufReader::new(Box::new(detached)));

        let tls = config.connect(plain.into_inner()).await?;
        self.reader = BufReader::new(Box::new(tls));
        self.tls = true;
        Ok(())
    }

    /// Shuts down the write half of the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpStream")
            .field("tls", &self.tls)
            .field("buffered", &self.reader.buffer().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn stream(mock: tokio_test::io::Mock) -> SmtpStream {
        SmtpStream::new(Box::new(mock))
    }

    #[tokio::test]
    async fn reads_multiline_reply() {
        let mut s = stream(
            Builder::new()
                .read(b"250-mx.example.com\r\n250-PIPELINING\r\n250 SIZE 1000\r\n")
                .build(),
        );
        let reply = s.read_reply().await.unwrap();
        assert_eq!(reply.message, vec!["mx.example.com", "PIPELINING", "SIZE 1000"]);
    }

    #[tokio::test]
    async fn reply_split_across_reads() {
        let mut s = stream(Builder::new().read(b"25").read(b"0 O").read(b"K\r\n").build());
        let reply = s.read_reply().await.unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.message_text(), "OK");
    }

    #[tokio::test]
    async fn eof_is_unexpected_eof() {
        let mut s = stream(Builder::new().read(b"250-partial\r\n").build());
        let err = s.read_reply().await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn send_command_round_trip() {
        let mut s = stream(
            Builder::new()
                .write(b"QUIT\r\n")
                .read(b"221 bye\r\n")
                .build(),
        );
        let reply = s.send_command(&Command::Quit).await.unwrap();
        assert_eq!(reply.code.as_u16(), 221);
    }

    #[tokio::test]
    async fn upgrade_refuses_buffered_plaintext() {
        let mut s = stream(Builder::new().read(b"220 go ahead\r\n250 injected\r\n").build());
        s.read_reply().await.unwrap();
        let err = s
            .upgrade_to_tls(&TlsConfig::new("mx.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(!s.is_tls());
    }

    #[tokio::test]
    async fn upgrade_refuses_tls_stream() {
        let (client, _server) = tokio::io::duplex(64);
        let mut s = SmtpStream::encrypted(Box::new(client));
        assert!(s.upgrade_to_tls(&TlsConfig::new("mx")).await.is_err());
    }
}
