//! Absolute read and write deadlines for a connection.
//!
//! A [`DeadlineStream`] wraps the raw transport below TLS. Once a deadline
//! passes, every pending and future operation in that direction fails with
//! [`io::ErrorKind::TimedOut`] until the deadline is moved.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

#[derive(Debug, Default, Clone, Copy)]
struct State {
    read: Option<Instant>,
    write: Option<Instant>,
}

/// Shared handle to the deadlines of one connection.
///
/// Cloning the handle shares the deadlines, so a sender can push them
/// forward while the stream lives inside the protocol client.
#[derive(Debug, Clone, Default)]
pub struct Deadlines {
    state: Arc<Mutex<State>>,
}

impl Deadlines {
    /// Sets both the read and the write deadline.
    pub fn set(&self, at: Instant) {
        let mut state = self.lock();
        state.read = Some(at);
        state.write = Some(at);
    }

    /// Sets the read deadline.
    pub fn set_read(&self, at: Instant) {
        self.lock().read = Some(at);
    }

    /// Sets the write deadline.
    pub fn set_write(&self, at: Instant) {
        self.lock().write = Some(at);
    }

    /// Removes both deadlines.
    pub fn clear(&self) {
        *self.lock() = State::default();
    }

    /// Returns the current read deadline.
    #[must_use]
    pub fn read(&self) -> Option<Instant> {
        self.lock().read
    }

    /// Returns the current write deadline.
    #[must_use]
    pub fn write(&self) -> Option<Instant> {
        self.lock().write
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A stream whose reads and writes fail once their deadline has passed.
pub struct DeadlineStream<S> {
    inner: S,
    deadlines: Deadlines,
    read_timer: Timer,
    write_timer: Timer,
}

impl<S> DeadlineStream<S> {
    /// Wraps `inner`, enforcing the deadlines behind `deadlines`.
    pub fn new(inner: S, deadlines: Deadlines) -> Self {
        Self {
            inner,
            deadlines,
            read_timer: Timer::default(),
            write_timer: Timer::default(),
        }
    }

    /// Returns the deadline handle.
    #[must_use]
    pub const fn deadlines(&self) -> &Deadlines {
        &self.deadlines
    }
}

impl<S> std::fmt::Debug for DeadlineStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineStream")
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}

/// Lazily armed sleep for one direction.
#[derive(Default)]
struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    /// Fails immediately if `deadline` already passed.
    fn check(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        match deadline {
            Some(at) if Instant::now() >= at => Err(timed_out()),
            Some(_) => Ok(()),
            None => {
                self.sleep = None;
                Ok(())
            }
        }
    }

    /// Registers a wakeup for `deadline` after the inner stream returned
    /// `Pending`. Fails if the deadline fired in the meantime.
    fn arm(&mut self, deadline: Option<Instant>, cx: &mut Context<'_>) -> io::Result<()> {
        let Some(at) = deadline else {
            self.sleep = None;
            return Ok(());
        };

        if self.sleep.as_ref().is_none_or(|sleep| sleep.deadline() != at) {
            self.sleep = Some(Box::pin(tokio::time::sleep_until(at)));
        }
        let Some(sleep) = self.sleep.as_mut() else {
            return Ok(());
        };
        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Err(timed_out()),
            Poll::Pending => Ok(()),
        }
    }
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")
}

/// Polls `op`, converting a missed deadline into `TimedOut`.
fn guard<T>(
    timer: &mut Timer,
    deadline: Option<Instant>,
    cx: &mut Context<'_>,
    op: impl FnOnce(&mut Context<'_>) -> Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    if let Err(err) = timer.check(deadline) {
        return Poll::Ready(Err(err));
    }
    match op(cx) {
        Poll::Ready(result) => Poll::Ready(result),
        Poll::Pending => match timer.arm(deadline, cx) {
            Ok(()) => Poll::Pending,
            Err(err) => Poll::Ready(Err(err)),
        },
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let deadline = this.deadlines.read();
        let inner = &mut this.inner;
        guard(&mut this.read_timer, deadline, cx, |cx| {
            Pin::new(inner).poll_read(cx, buf)
        })
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let deadline = this.deadlines.write();
        let inner = &mut this.inner;
        guard(&mut this.write_timer, deadline, cx, |cx| {
            Pin::new(inner).poll_write(cx, buf)
        })
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let deadline = this.deadlines.write();
        let inner = &mut this.inner;
        guard(&mut this.write_timer, deadline, cx, |cx| {
            Pin::new(inner).poll_flush(cx)
        })
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let deadline = this.deadlines.write();
        let inner = &mut this.inner;
        guard(&mut this.write_timer, deadline, cx, |cx| {
            Pin::new(inner).poll_shutdown(cx)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn read_times_out_when_peer_is_silent() {
        let (client, _server) = tokio::io::duplex(64);
        let deadlines = Deadlines::default();
        deadlines.set(Instant::now() + Duration::from_secs(10));
        let mut stream = DeadlineStream::new(client, deadlines);

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_fails_without_polling() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"ready").await.unwrap();

        let deadlines = Deadlines::default();
        deadlines.set_read(Instant::now());
        let mut stream = DeadlineStream::new(client, deadlines.clone());

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // Moving the deadline makes the connection usable again.
        deadlines.set_read(Instant::now() + Duration::from_secs(5));
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ready");
    }

    #[tokio::test(start_paused = true)]
    async fn no_deadline_passes_through() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = DeadlineStream::new(client, Deadlines::default());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test(start_paused = true)]
    async fn write_deadline_is_independent() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"x").await.unwrap();

        let deadlines = Deadlines::default();
        deadlines.set_write(Instant::now());
        let mut stream = DeadlineStream::new(client, deadlines.clone());

        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).await.unwrap();
        let err = stream.write_all(b"y").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        deadlines.clear();
        assert!(deadlines.read().is_none() && deadlines.write().is_none());
        stream.write_all(b"y").await.unwrap();
    }
}
