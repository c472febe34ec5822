//! Connection settings and the dial sequence.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use maildial_smtp::{Auth, AuthMechanism, BoxedTransport, TlsConfig, Transport};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::client::{Connector, SmtpClient, SmtpConnector};
use crate::deadline::{DeadlineStream, Deadlines};
use crate::envelope::{Envelope, MessageBody};
use crate::error::{Error, Result};
use crate::policy::StartTlsPolicy;
use crate::sender::{Sender, Session};

/// Port on which servers expect implicit TLS.
pub const SMTPS_PORT: u16 = 465;

/// Overall timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Future returned by a [`DialFn`].
pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<BoxedTransport>> + Send>>;

/// Opens the raw transport. Called with the network (`"tcp"`) and
/// `host:port`.
pub type DialFn = Arc<dyn Fn(&str, &str) -> DialFuture + Send + Sync>;

/// Everything needed to open an authenticated SMTP session.
///
/// A dialer is plain configuration: it can be cloned, shared and dialed any
/// number of times. Each [`Sender`] keeps a copy so it can reconnect.
#[derive(Clone)]
pub struct Dialer<C = SmtpConnector> {
    /// Server host name. Also the TLS server name unless `tls_config`
    /// says otherwise.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Username; authentication is negotiated only when non-empty.
    pub username: String,
    /// Password.
    pub password: String,
    /// Mechanism to use instead of negotiating one.
    pub auth: Option<Auth>,
    /// Use implicit TLS from the first byte.
    pub ssl: bool,
    /// TLS settings for implicit TLS and STARTTLS.
    pub tls_config: Option<TlsConfig>,
    /// STARTTLS behaviour on plaintext connections.
    pub starttls_policy: StartTlsPolicy,
    /// Name to greet the server with.
    pub local_name: Option<String>,
    /// Deadline for the dial sequence and for each send. Zero disables it.
    pub timeout: Duration,
    /// Enables a read deadline (measured from `timeout`).
    pub read_timeout: Duration,
    /// Enables a write deadline (measured from `timeout`).
    pub write_timeout: Duration,
    /// Redial once when a send finds the connection dead.
    pub retry_failure: bool,
    dial: DialFn,
    connector: C,
}

impl Dialer {
    /// Creates a dialer with the default settings: implicit TLS when `port`
    /// is 465, opportunistic STARTTLS otherwise, a 10 second timeout and
    /// retry enabled.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            auth: None,
            ssl: port == SMTPS_PORT,
            tls_config: None,
            starttls_policy: StartTlsPolicy::default(),
            local_name: None,
            timeout: DEFAULT_TIMEOUT,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            retry_failure: true,
            dial: Arc::new(dial_tcp),
            connector: SmtpConnector,
        }
    }
}

fn dial_tcp(_network: &str, addr: &str) -> DialFuture {
    let addr = addr.to_string();
    Box::pin(async move {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        Ok(Box::new(tcp) as BoxedTransport)
    })
}

impl<C: Connector> Dialer<C> {
    /// Sets an explicit authentication mechanism.
    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Enables or disables implicit TLS.
    #[must_use]
    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn tls_config(mut self, config: TlsConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Sets the STARTTLS policy.
    #[must_use]
    pub fn starttls_policy(mut self, policy: StartTlsPolicy) -> Self {
        self.starttls_policy = policy;
        self
    }

    /// Sets the name used in EHLO/HELO.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Enables or disables the reconnect on a dead connection.
    #[must_use]
    pub fn retry_failure(mut self, retry: bool) -> Self {
        self.retry_failure = retry;
        self
    }

    /// Replaces the function that opens the raw transport, e.g. to go
    /// through a proxy.
    #[must_use]
    pub fn dial_proxy<F, Fut, T>(mut self, dial: F) -> Self
    where
        F: Fn(&str, &str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<T>> + Send + 'static,
        T: Transport + 'static,
    {
        self.dial = Arc::new(move |network: &str, addr: &str| -> DialFuture {
            let fut = dial(network, addr);
            Box::pin(async move { Ok(Box::new(fut.await?) as BoxedTransport) })
        });
        self
    }

    /// Replaces the connector that builds sessions.
    #[must_use]
    pub fn with_connector<D: Connector>(self, connector: D) -> Dialer<D> {
        Dialer {
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            auth: self.auth,
            ssl: self.ssl,
            tls_config: self.tls_config,
            starttls_policy: self.starttls_policy,
            local_name: self.local_name,
            timeout: self.timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            retry_failure: self.retry_failure,
            dial: self.dial,
            connector,
        }
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the TLS configuration in effect: the configured one, or one
    /// verifying `host` with TLS 1.2 or newer.
    #[must_use]
    pub fn effective_tls_config(&self) -> TlsConfig {
        self.tls_config
            .clone()
            .unwrap_or_else(|| TlsConfig::new(&self.host))
    }

    /// Picks a mechanism from the server's `AUTH` parameters.
    ///
    /// CRAM-MD5 wins when offered. LOGIN is used only when PLAIN is not
    /// offered. Anything else gets PLAIN.
    #[must_use]
    pub fn negotiate_auth(&self, advertised: &str) -> Auth {
        let offers = |mechanism: AuthMechanism| {
            advertised
                .split_whitespace()
                .any(|m| m.eq_ignore_ascii_case(mechanism.as_str()))
        };

        if offers(AuthMechanism::CramMd5) {
            Auth::cram_md5(&self.username, &self.password)
        } else if offers(AuthMechanism::Login) && !offers(AuthMechanism::Plain) {
            Auth::login(&self.username, &self.password, &self.host)
        } else {
            Auth::plain("", &self.username, &self.password, &self.host)
        }
    }

    /// Sets the deadlines of a freshly dialed connection.
    ///
    /// The read and write deadlines are both measured from `timeout`; their
    /// own values only decide whether they are set.
    pub(crate) fn arm_deadlines(&self, deadlines: &Deadlines) {
        let deadline = Instant::now() + self.timeout;
        if !self.timeout.is_zero() {
            deadlines.set(deadline);
        }
        if !self.read_timeout.is_zero() {
            deadlines.set_read(deadline);
        }
        if !self.write_timeout.is_zero() {
            deadlines.set_write(deadline);
        }
    }

    /// Runs the dial sequence and returns the established session.
    pub(crate) async fn connect(&self) -> Result<Session<C::Client>> {
        let addr = self.address();
        tracing::debug!(%addr, ssl = self.ssl, "dialing SMTP server");
        let raw = (self.dial)("tcp", &addr).await?;

        let deadlines = Deadlines::default();
        self.arm_deadlines(&deadlines);
        let mut transport: BoxedTransport = Box::new(DeadlineStream::new(raw, deadlines.clone()));

        if self.ssl {
            transport = self
                .connector
                .wrap_tls(transport, &self.effective_tls_config())
                .await
                .map_err(Error::Tls)?;
        }

        let mut client = self
            .connector
            .new_client(transport, self.ssl, &self.host)
            .await?;

        if let Some(name) = &self.local_name {
            client.hello(name).await?;
        }

        if !self.ssl && self.starttls_policy.applies() {
            if client.extension("STARTTLS").await.is_some() {
                if let Err(err) = client.start_tls(&self.effective_tls_config()).await {
                    close_quietly(&mut client).await;
                    return Err(Error::StartTls(err));
                }
                tracing::debug!(%addr, "upgraded with STARTTLS");
            } else if self.starttls_policy == StartTlsPolicy::Mandatory {
                return Err(Error::StartTlsUnsupported {
                    policy: self.starttls_policy,
                });
            } else {
                tracing::warn!(%addr, "server does not offer STARTTLS, continuing in the clear");
            }
        }

        let auth = match &self.auth {
            Some(auth) => Some(auth.clone()),
            None if !self.username.is_empty() => client
                .extension("AUTH")
                .await
                .map(|advertised| self.negotiate_auth(&advertised)),
            None => None,
        };

        if let Some(auth) = auth {
            tracing::debug!(mechanism = %auth.mechanism(), "authenticating");
            if let Err(err) = client.auth(&auth).await {
                close_quietly(&mut client).await;
                return Err(Error::Auth(err));
            }
        }

        tracing::info!(%addr, "SMTP session established");
        Ok(Session::new(client, deadlines))
    }
}

impl<C: Connector + Clone> Dialer<C> {
    /// Connects, greets, upgrades and authenticates according to the
    /// settings, returning a sender for the session.
    ///
    /// Dropping the returned future cancels the dial; wrap it in
    /// [`tokio::time::timeout`] to bound it from the outside.
    ///
    /// # Errors
    ///
    /// Fails on the first step that fails: the transport dial, the TLS
    /// handshake, the greeting, STARTTLS (including
    /// [`Error::StartTlsUnsupported`]) or authentication.
    pub async fn dial(&self) -> Result<Sender<C>> {
        let session = self.connect().await?;
        Ok(Sender::new(self.clone(), session))
    }

    /// Dials, sends every envelope in order and closes the session.
    ///
    /// # Errors
    ///
    /// Returns the dial error, the first send error wrapped in
    /// [`Error::Envelope`], or the QUIT error.
    pub async fn dial_and_send<B: MessageBody>(&self, envelopes: &[Envelope<B>]) -> Result<()> {
        let mut sender = self.dial().await?;
        for (index, envelope) in envelopes.iter().enumerate() {
            if let Err(err) = sender.send(envelope).await {
                if let Err(close_err) = sender.close().await {
                    tracing::debug!(%close_err, "QUIT after failed send");
                }
                return Err(Error::Envelope {
                    index,
                    source: Box::new(err),
                });
            }
        }
        sender.close().await
    }
}

async fn close_quietly<T: SmtpClient>(client: &mut T) {
    if let Err(err) = client.close().await {
        tracing::debug!(%err, "closing SMTP connection failed");
    }
}

impl<C> fmt::Debug for Dialer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth", &self.auth.as_ref().map(Auth::mechanism))
            .field("ssl", &self.ssl)
            .field("starttls_policy", &self.starttls_policy)
            .field("local_name", &self.local_name)
            .field("timeout", &self.timeout)
            .field("retry_failure", &self.retry_failure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dialer() -> Dialer {
        Dialer::new("smtp.example.com", 587, "user", "secret")
    }

    #[test]
    fn test_defaults() {
        let d = dialer();
        assert!(!d.ssl);
        assert_eq!(d.timeout, DEFAULT_TIMEOUT);
        assert!(d.retry_failure);
        assert_eq!(d.starttls_policy, StartTlsPolicy::Opportunistic);
        assert!(d.read_timeout.is_zero() && d.write_timeout.is_zero());
        assert_eq!(d.address(), "smtp.example.com:587");
    }

    #[test]
    fn test_port_465_implies_ssl() {
        assert!(Dialer::new("smtp.example.com", 465, "", "").ssl);
        assert!(!Dialer::new("smtp.example.com", 465, "", "").ssl(false).ssl);
    }

    #[test]
    fn test_tls_config_defaults_to_host() {
        let d = dialer();
        let tls = d.effective_tls_config();
        assert_eq!(tls.server_name(), "smtp.example.com");
        assert_eq!(tls.minimum_version(), maildial_smtp::TlsVersion::Tls12);

        let d = d.tls_config(TlsConfig::new("mx.example.com"));
        assert_eq!(d.effective_tls_config().server_name(), "mx.example.com");
    }

    #[test]
    fn test_negotiate_prefers_cram_md5() {
        let auth = dialer().negotiate_auth("CRAM-MD5 LOGIN");
        assert_eq!(auth, Auth::cram_md5("user", "secret"));
    }

    #[test]
    fn test_negotiate_login_only_without_plain() {
        let d = dialer();
        assert_eq!(
            d.negotiate_auth("LOGIN"),
            Auth::login("user", "secret", "smtp.example.com")
        );
        assert_eq!(
            d.negotiate_auth("PLAIN LOGIN"),
            Auth::plain("", "user", "secret", "smtp.example.com")
        );
    }

    #[test]
    fn test_negotiate_falls_back_to_plain() {
        assert_eq!(
            dialer().negotiate_auth("XOAUTH2 GSSAPI"),
            Auth::plain("", "user", "secret", "smtp.example.com")
        );
    }

    #[test]
    fn test_negotiate_matches_whole_names_ignoring_case() {
        let d = dialer();
        assert_eq!(
            d.negotiate_auth("login"),
            Auth::login("user", "secret", "smtp.example.com")
        );
        assert_eq!(d.negotiate_auth("Cram-Md5 plain"), Auth::cram_md5("user", "secret"));
        assert_eq!(
            d.negotiate_auth("Login pLaIn"),
            Auth::plain("", "user", "secret", "smtp.example.com")
        );
        // Names that only contain a mechanism do not count.
        assert_eq!(
            d.negotiate_auth("X-CRAM-MD5 LOGINDISABLED"),
            Auth::plain("", "user", "secret", "smtp.example.com")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadlines_use_overall_timeout() {
        let d = dialer()
            .timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(2));
        let deadlines = Deadlines::default();
        let now = Instant::now();
        d.arm_deadlines(&deadlines);

        assert_eq!(deadlines.read(), Some(now + Duration::from_secs(30)));
        assert_eq!(deadlines.write(), Some(now + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_with_read_timeout_expires_immediately() {
        let d = dialer()
            .timeout(Duration::ZERO)
            .read_timeout(Duration::from_secs(5));
        let deadlines = Deadlines::default();
        let now = Instant::now();
        d.arm_deadlines(&deadlines);

        assert_eq!(deadlines.read(), Some(now));
        assert_eq!(deadlines.write(), None);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", dialer());
        assert!(rendered.contains("smtp.example.com"));
        assert!(!rendered.contains("secret"));
    }
}
