//! Messages handed to a [`Sender`](crate::Sender).

use std::future::Future;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Something that can write an RFC 5322 message to the DATA channel.
///
/// Bodies are written with bare `\n` or `\r\n` line endings; the DATA
/// channel normalizes them and applies dot-stuffing.
pub trait MessageBody: Sync {
    /// Writes the whole message to `writer`.
    fn write_to<W>(&self, writer: &mut W) -> impl Future<Output = io::Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

impl<T> MessageBody for T
where
    T: AsRef<[u8]> + Sync + ?Sized,
{
    async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        writer.write_all(self.as_ref()).await
    }
}

/// One message with its SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<B> {
    /// Reverse path for `MAIL FROM`.
    pub from: String,
    /// Forward paths, one `RCPT TO` each, in order.
    pub to: Vec<String>,
    /// Message content.
    pub body: B,
}

impl<B: MessageBody> Envelope<B> {
    /// Creates an envelope.
    pub fn new<I, S>(from: impl Into<String>, to: I, body: B) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
            body,
        }
    }
}
