//! TLS client configuration shared by implicit TLS and STARTTLS.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::Result;

static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Lowest TLS protocol version the client will negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TlsVersion {
    /// TLS 1.2 and newer.
    #[default]
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// TLS settings for a connection to one SMTP server.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    server_name: String,
    min_version: TlsVersion,
    roots: Option<Arc<RootCertStore>>,
}

impl TlsConfig {
    /// Creates a configuration that verifies `server_name` against the
    /// webpki root set and accepts TLS 1.2 or newer.
    #[must_use]
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            min_version: TlsVersion::Tls12,
            roots: None,
        }
    }

    /// Sets the minimum protocol version.
    #[must_use]
    pub const fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Replaces the webpki roots with a custom trust store.
    #[must_use]
    pub fn root_certificates(mut self, roots: RootCertStore) -> Self {
        self.roots = Some(Arc::new(roots));
        self
    }

    /// Returns the name the server certificate is verified against.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Returns the minimum protocol version.
    #[must_use]
    pub const fn minimum_version(&self) -> TlsVersion {
        self.min_version
    }

    /// Builds the rustls connector for this configuration.
    #[must_use]
    pub fn connector(&self) -> TlsConnector {
        let roots = self.roots.as_deref().cloned().unwrap_or_else(|| RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });

        let versions: &[&'static rustls::SupportedProtocolVersion] = match self.min_version {
            TlsVersion::Tls12 => rustls::DEFAULT_VERSIONS,
            TlsVersion::Tls13 => TLS13_ONLY,
        };

        let config = ClientConfig::builder_with_protocol_versions(versions)
            .with_root_certificates(roots)
            .with_no_client_auth();

        TlsConnector::from(Arc::new(config))
    }

    /// Runs the client handshake over `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is not a valid DNS name or IP
    /// address, or if the handshake fails.
    pub async fn connect<S>(&self, stream: S) -> Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(self.server_name.clone())?;
        tracing::debug!(server_name = %self.server_name, "starting TLS handshake");
        let tls = self.connector().connect(server_name, stream).await?;
        Ok(tls)
    }
}
