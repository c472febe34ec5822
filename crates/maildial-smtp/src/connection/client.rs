//! SMTP client session.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{DataWriter, SmtpStream};
use crate::auth::{Auth, ServerInfo};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::tls::TlsConfig;
use crate::types::{Address, Extensions, Reply, ReplyCode};

/// Name sent in EHLO when the caller does not provide one.
pub const DEFAULT_LOCAL_NAME: &str = "localhost";

/// Greeting state of the session.
#[derive(Debug)]
enum Greeting {
    /// Nothing sent yet.
    Pending,
    /// EHLO or HELO accepted.
    Done,
    /// Both EHLO and HELO failed; the message is replayed to later calls.
    Failed(String),
}

/// An SMTP client session over one connection.
///
/// Commands are issued one at a time through `&mut self`. The client greets
/// lazily: the first command that needs the server's capabilities sends
/// EHLO (falling back to HELO) with the configured local name.
#[derive(Debug)]
pub struct Client {
    stream: SmtpStream,
    server_name: String,
    local_name: String,
    greeting: Greeting,
    extensions: Extensions,
}

impl Client {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// `server_name` is the host the caller connected to; authentication
    /// mechanisms bind credentials to it.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server does not
    /// answer 220.
    pub async fn new(mut stream: SmtpStream, server_name: impl Into<String>) -> Result<Self> {
        let greeting = stream.read_reply().await?;
        let greeting = greeting.expect_code(ReplyCode::SERVICE_READY)?;
        tracing::debug!(banner = %greeting.message_text(), "server greeting");

        Ok(Self {
            stream,
            server_name: server_name.into(),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            greeting: Greeting::Pending,
            extensions: Extensions::default(),
        })
    }

    /// Returns the server name this client was created for.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Returns true if the session is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Returns the extensions advertised in the last EHLO reply.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Greets the server as `local_name`. Must be the first command.
    ///
    /// # Errors
    ///
    /// Returns an error if the session already greeted, if `local_name`
    /// contains a line break, or if both EHLO and HELO are rejected.
    pub async fn hello(&mut self, local_name: &str) -> Result<()> {
        if local_name.contains(['\r', '\n']) {
            return Err(Error::Protocol("local name contains CR or LF".into()));
        }
        if !matches!(self.greeting, Greeting::Pending) {
            return Err(Error::Protocol(
                "hello called after other methods".into(),
            ));
        }
        local_name.clone_into(&mut self.local_name);
        self.ensure_greeted().await
    }

    /// Looks up an extension, greeting first if needed.
    ///
    /// Returns the extension's parameters if the server advertised it. A
    /// failed greeting reports every extension as unsupported.
    pub async fn extension(&mut self, name: &str) -> Option<String> {
        if self.ensure_greeted().await.is_err() {
            return None;
        }
        self.extensions.get(name).map(str::to_string)
    }

    /// Upgrades the session with STARTTLS and greets again.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake
    /// fails.
    pub async fn start_tls(&mut self, config: &TlsConfig) -> Result<()> {
        self.ensure_greeted().await?;
        self.stream
            .send_command(&Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;
        self.stream.upgrade_to_tls(config).await?;
        tracing::debug!(server = %self.server_name, "STARTTLS negotiated");
        self.ehlo().await
    }

    /// Authenticates with the given mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the mechanism refuses to run on this connection,
    /// the server rejects the credentials, or a challenge is malformed.
    pub async fn auth(&mut self, auth: &Auth) -> Result<()> {
        self.ensure_greeted().await?;

        let mechanisms = self.extensions.auth_mechanisms();
        let info = ServerInfo {
            name: &self.server_name,
            tls: self.stream.is_tls(),
            mechanisms: &mechanisms,
        };
        let initial = auth.start(&info)?;
        tracing::debug!(mechanism = %auth.mechanism(), "authenticating");

        let mut reply = self
            .stream
            .send_command(&Command::Auth {
                mechanism: auth.mechanism(),
                initial_response: initial.map(|resp| STANDARD.encode(resp)),
            })
            .await?;

        loop {
            let response = match reply.code {
                ReplyCode::AUTH_CONTINUE => {
                    let step = STANDARD
                        .decode(reply.message_text().trim())
                        .map_err(|e| Error::Auth(format!("malformed challenge: {e}")))
                        .and_then(|challenge| auth.next(&challenge, true));
                    match step {
                        Ok(response) => response,
                        Err(err) => {
                            self.cancel_auth().await;
                            return Err(err);
                        }
                    }
                }
                ReplyCode::AUTH_SUCCESS => {
                    auth.next(reply.message_text().as_bytes(), false)?;
                    return Ok(());
                }
                _ => return Err(reply.into_error()),
            };

            // A mechanism with nothing to add answers with an empty line.
            let response = response.unwrap_or_default();
            reply = self
                .stream
                .send_command(&Command::AuthResponse(STANDARD.encode(response)))
                .await?;
        }
    }

    /// Starts a mail transaction. An empty `from` sends the null reverse
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the server rejects it.
    pub async fn mail(&mut self, from: &str) -> Result<()> {
        self.ensure_greeted().await?;
        let cmd = Command::MailFrom {
            from: Address::reverse_path(from)?,
            eight_bit_mime: self.extensions.supports("8BITMIME"),
            smtp_utf8: self.extensions.supports("SMTPUTF8"),
        };
        self.stream.send_command(&cmd).await?.expect_code(ReplyCode::OK)?;
        Ok(())
    }

    /// Adds a recipient to the current transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the server rejects it.
    pub async fn rcpt(&mut self, to: &str) -> Result<()> {
        let cmd = Command::RcptTo {
            to: Address::new(to)?,
        };
        let reply = self.stream.send_command(&cmd).await?;
        if reply.code == ReplyCode::OK || reply.code == ReplyCode::FORWARD {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }

    /// Sends `DATA` and returns a writer for the message content.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 354.
    pub async fn data(&mut self) -> Result<DataWriter<'_>> {
        self.stream
            .send_command(&Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;
        Ok(DataWriter::new(&mut self.stream))
    }

    /// Sends QUIT and shuts the connection down.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 221.
    pub async fn quit(&mut self) -> Result<()> {
        self.ensure_greeted().await?;
        self.stream
            .send_command(&Command::Quit)
            .await?
            .expect_code(ReplyCode::CLOSING)?;
        self.close().await
    }

    /// Shuts the connection down without QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport shutdown fails.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await
    }

    async fn ensure_greeted(&mut self) -> Result<()> {
        match &self.greeting {
            Greeting::Done => return Ok(()),
            Greeting::Failed(message) => return Err(Error::Protocol(message.clone())),
            Greeting::Pending => {}
        }

        let result = match self.ehlo().await {
            Ok(()) => Ok(()),
            Err(Error::SmtpError { .. }) => self.helo().await,
            Err(err) => Err(err),
        };
        self.greeting = match &result {
            Ok(()) => Greeting::Done,
            Err(err) => Greeting::Failed(format!("greeting failed: {err}")),
        };
        result
    }

    async fn ehlo(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.local_name.clone(),
        };
        let reply = self.greet(cmd).await?;
        self.extensions = Extensions::from_ehlo(&reply.message);
        Ok(())
    }

    async fn helo(&mut self) -> Result<()> {
        let cmd = Command::Helo {
            hostname: self.local_name.clone(),
        };
        self.greet(cmd).await?;
        self.extensions = Extensions::default();
        Ok(())
    }

    async fn greet(&mut self, cmd: Command) -> Result<Reply> {
        self.stream.send_command(&cmd).await?.expect_code(ReplyCode::OK)
    }

    async fn cancel_auth(&mut self) {
        if let Err(err) = self
            .stream
            .send_command(&Command::AuthResponse("*".into()))
            .await
        {
            tracing::debug!(%err, "AUTH cancel failed");
        }
    }
}
