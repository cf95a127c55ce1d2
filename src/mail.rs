//! Digest delivery over SMTP.
//!
//! [`ReportSender`] is the one operation the pipeline needs: hand over a
//! finished HTML report and learn whether it went out. [`SmtpMailer`]
//! implements it on top of lettre with a STARTTLS-upgraded, authenticated
//! submission session.

use std::future::Future;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Status code reported for a delivered message.
pub const STATUS_SENT: u16 = 201;
/// Status code reported for any delivery failure.
pub const STATUS_FAILED: u16 = 400;

/// Timeout of the whole SMTP session (connect, STARTTLS, auth, send).
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// SMTP session parameters.
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Sender, recipient and subject of the digest email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Plain,
    Html,
}

impl ContentKind {
    fn header(self) -> ContentType {
        match self {
            ContentKind::Plain => ContentType::TEXT_PLAIN,
            ContentKind::Html => ContentType::TEXT_HTML,
        }
    }
}

/// Transport-level outcome of one send: 201 on success, 400 with the error text otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailResponse {
    pub status_code: u16,
    pub details: String,
}

impl EmailResponse {
    pub fn is_sent(&self) -> bool {
        self.status_code == STATUS_SENT
    }
}

/// Outcome of delivering the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

/// Delivers a finished HTML report.
pub trait ReportSender {
    fn send_report(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> impl Future<Output = SendOutcome> + Send;
}

/// Sends email through an authenticated SMTP relay.
#[derive(Debug)]
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Sends one message. Never fails: errors are reported in the response.
    pub async fn send_email(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        content: &str,
        kind: ContentKind,
    ) -> EmailResponse {
        match self.try_send(from, to, subject, content, kind).await {
            Ok(()) => {
                tracing::info!(to = %to, "Email sent");
                EmailResponse {
                    status_code: STATUS_SENT,
                    details: "email sent".to_string(),
                }
            }
            Err(e) => {
                tracing::error!(to = %to, error = %e, "Failed to send email");
                EmailResponse {
                    status_code: STATUS_FAILED,
                    details: e.to_string(),
                }
            }
        }
    }

    async fn try_send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        content: &str,
        kind: ContentKind,
    ) -> Result<(), MailError> {
        let message = build_message(from, to, subject, content, kind)?;
        let transport = self.transport()?;
        transport.send(message).await?;
        Ok(())
    }

    /// STARTTLS is required before credentials are sent.
    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let credentials = Credentials::new(
            self.settings.user.clone(),
            self.settings.password.expose_secret().to_owned(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.server)?
            .port(self.settings.port)
            .credentials(credentials)
            .timeout(Some(self.settings.timeout))
            .build();
        Ok(transport)
    }
}

impl ReportSender for SmtpMailer {
    async fn send_report(&self, from: &str, to: &str, subject: &str, html_body: &str) -> SendOutcome {
        let response = self
            .send_email(from, to, subject, html_body, ContentKind::Html)
            .await;
        if response.is_sent() {
            SendOutcome::Sent
        } else {
            SendOutcome::Failed(response.details)
        }
    }
}

/// Writes the report to stdout instead of sending it. Used for dry runs.
#[derive(Debug, Default)]
pub struct StdoutSender;

impl ReportSender for StdoutSender {
    async fn send_report(&self, from: &str, to: &str, subject: &str, html_body: &str) -> SendOutcome {
        println!("From: {}\nTo: {}\nSubject: {}\n\n{}", from, to, subject, html_body);
        SendOutcome::Sent
    }
}

/// Builds a `multipart/alternative` message with a single body part.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    content: &str,
    kind: ContentKind,
) -> Result<Message, MailError> {
    let parse = |address: &str| {
        address
            .parse::<Mailbox>()
            .map_err(|source| MailError::Address {
                address: address.to_string(),
                source,
            })
    };

    let message = Message::builder()
        .from(parse(from)?)
        .to(parse(to)?)
        .subject(subject)
        .multipart(
            MultiPart::alternative().singlepart(
                SinglePart::builder()
                    .header(kind.header())
                    .body(content.to_string()),
            ),
        )?;
    Ok(message)
}
