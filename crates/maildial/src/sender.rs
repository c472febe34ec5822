//! Sending messages over an established session.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::{Connector, DataChannel, SmtpClient, SmtpConnector};
use crate::deadline::Deadlines;
use crate::dialer::Dialer;
use crate::envelope::{Envelope, MessageBody};
use crate::error::{Error, Result};

/// A live connection: the protocol client plus the deadlines of its
/// transport.
pub(crate) struct Session<T> {
    client: T,
    deadlines: Deadlines,
}

impl<T: SmtpClient> Session<T> {
    pub(crate) const fn new(client: T, deadlines: Deadlines) -> Self {
        Self { client, deadlines }
    }

    fn refresh_deadline(&self, timeout: Duration) {
        if !timeout.is_zero() {
            self.deadlines.set(Instant::now() + timeout);
        }
    }

    async fn discard(mut self) {
        if let Err(err) = self.client.close().await {
            tracing::debug!(%err, "closing stale connection failed");
        }
    }
}

/// An authenticated SMTP session that sends messages one at a time.
///
/// Obtained from [`Dialer::dial`]. Dropping a sender closes the connection
/// without QUIT; call [`Sender::close`] to end it politely.
pub struct Sender<C: Connector = SmtpConnector> {
    dialer: Dialer<C>,
    session: Session<C::Client>,
}

impl<C: Connector> Sender<C> {
    pub(crate) const fn new(dialer: Dialer<C>, session: Session<C::Client>) -> Self {
        Self { dialer, session }
    }

    /// Returns the settings this sender was dialed with.
    #[must_use]
    pub const fn dialer(&self) -> &Dialer<C> {
        &self.dialer
    }

    /// Sends one message.
    ///
    /// If `MAIL FROM` fails because the connection timed out or was closed
    /// by the server and `retry_failure` is set, the sender dials once more,
    /// replaces its session and repeats the send on the new one.
    ///
    /// # Errors
    ///
    /// Returns the `MAIL FROM` error (also when the redial fails), a
    /// rejected recipient, a refused DATA phase, a body write failure or the
    /// server's answer to the end of the message.
    pub async fn send<B: MessageBody>(&mut self, envelope: &Envelope<B>) -> Result<()> {
        if let Err(err) = self.mail(&envelope.from).await {
            if !self.should_retry(&err) {
                return Err(err.into());
            }
            tracing::info!(%err, addr = %self.dialer.address(), "connection lost, redialing");
            self.redial(err).await?;
            self.mail(&envelope.from).await?;
        }
        self.transmit(envelope).await
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge QUIT.
    pub async fn close(mut self) -> Result<()> {
        tracing::debug!(addr = %self.dialer.address(), "closing SMTP session");
        self.session.client.quit().await?;
        Ok(())
    }

    async fn mail(&mut self, from: &str) -> maildial_smtp::Result<()> {
        self.session.refresh_deadline(self.dialer.timeout);
        self.session.client.mail(from).await
    }

    fn should_retry(&self, err: &maildial_smtp::Error) -> bool {
        self.dialer.retry_failure && (err.is_timeout() || err.is_eof())
    }

    /// Swaps in a freshly dialed session. On failure the session is left
    /// alone and `cause` is returned.
    async fn redial(&mut self, cause: maildial_smtp::Error) -> Result<()> {
        match self.dialer.connect().await {
            Ok(fresh) => {
                let stale = std::mem::replace(&mut self.session, fresh);
                stale.discard().await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "redial failed");
                Err(cause.into())
            }
        }
    }

    async fn transmit<B: MessageBody>(&mut self, envelope: &Envelope<B>) -> Result<()> {
        let client = &mut self.session.client;
        for to in &envelope.to {
            client.rcpt(to).await.map_err(|source| Error::Rcpt {
                recipient: to.clone(),
                source,
            })?;
        }

        let mut data = client.data().await.map_err(Error::Data)?;
        if let Err(err) = envelope.body.write_to(&mut data).await {
            if let Err(close_err) = data.close().await {
                tracing::debug!(%close_err, "closing DATA after write failure");
            }
            return Err(err.into());
        }
        data.close().await?;
        tracing::debug!(recipients = envelope.to.len(), "message accepted");
        Ok(())
    }
}

impl<C: Connector> fmt::Debug for Sender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("host", &self.dialer.host)
            .field("port", &self.dialer.port)
            .finish_non_exhaustive()
    }
}
