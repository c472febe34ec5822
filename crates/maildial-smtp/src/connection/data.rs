//! The DATA phase: a dot-stuffing writer that ends the message on close.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::SmtpStream;
use crate::error::Result;
use crate::types::ReplyCode;

/// Converts message bytes into DATA wire format.
///
/// Bare LF becomes CRLF and a `.` at the start of a line is doubled
/// (RFC 5321 section 4.5.2). State carries across calls so input may be
/// split anywhere.
#[derive(Debug, Clone)]
pub struct DotStuffer {
    line_start: bool,
    after_cr: bool,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self {
            line_start: true,
            after_cr: false,
        }
    }
}

impl DotStuffer {
    /// Encodes `input`, appending wire bytes to `out`.
    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len() + 2);
        for &byte in input {
            match byte {
                b'\n' => {
                    if !self.after_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.line_start = true;
                    self.after_cr = false;
                }
                b'\r' => {
                    out.push(b'\r');
                    self.line_start = false;
                    self.after_cr = true;
                }
                _ => {
                    if self.line_start && byte == b'.' {
                        out.push(b'.');
                    }
                    out.push(byte);
                    self.line_start = false;
                    self.after_cr = false;
                }
            }
        }
    }

    /// Appends the end-of-data marker, terminating an open last line first.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.line_start {
            if !self.after_cr {
                out.push(b'\r');
            }
            out.push(b'\n');
        }
        out.extend_from_slice(b".\r\n");
        self.line_start = true;
        self.after_cr = false;
    }
}

/// Writer for the message content after the server accepted `DATA`.
///
/// Bytes written are dot-stuffed and forwarded to the connection. The
/// message is only submitted when [`DataWriter::close`] is called.
#[derive(Debug)]
pub struct DataWriter<'a> {
    stream: &'a mut SmtpStream,
    stuffer: DotStuffer,
    pending: Vec<u8>,
    written: usize,
}

impl<'a> DataWriter<'a> {
    pub(crate) fn new(stream: &'a mut SmtpStream) -> Self {
        Self {
            stream,
            stuffer: DotStuffer::default(),
            pending: Vec::new(),
            written: 0,
        }
    }

    /// Writes out encoded bytes that the transport has not accepted yet.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.written < self.pending.len() {
            let transport = self.stream.transport_mut();
            let n = ready!(Pin::new(transport).poll_write(cx, &self.pending[self.written..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.written += n;
        }
        self.pending.clear();
        self.written = 0;
        Poll::Ready(Ok(()))
    }

    /// Terminates the message with `.` and waits for the server to accept it.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails or the server does not reply 250.
    pub async fn close(mut self) -> Result<()> {
        self.stuffer.finish(&mut self.pending);
        self.flush().await?;
        self.stream.read_reply().await?.expect_code(ReplyCode::OK)?;
        tracing::debug!("message accepted");
        Ok(())
    }
}

impl AsyncWrite for DataWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.stuffer.encode(buf, &mut this.pending);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(this.stream.transport_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Shutting down the connection would abort the session; the message
        // is ended by `close` instead.
        self.poll_flush(cx)
    }
}
