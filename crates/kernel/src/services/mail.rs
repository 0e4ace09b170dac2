//! Mail delivery using lettre.

use anyhow::{Context, Result};
use async_trait::async_trait;
use keystone_sdk::{MailMessage, Mailer};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{
    AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{MailSettings, MailTransport};

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Sendmail(AsyncSendmailTransport<Tokio1Executor>),
    Disabled,
}

/// Mail service backed by the configured transport.
pub struct MailService {
    transport: Transport,
    from_email: String,
    extra: Map<String, Value>,
}

impl MailService {
    /// Build the transport. Connections are opened lazily on first send.
    pub fn new(settings: &MailSettings) -> Result<Self> {
        let transport = match &settings.transport {
            MailTransport::Sendmail { command } => Transport::Sendmail(match command {
                Some(command) => AsyncSendmailTransport::new_with_command(command),
                None => AsyncSendmailTransport::new(),
            }),
            MailTransport::Smtp {
                host,
                port,
                username,
                password,
                encryption,
            } => {
                // `starttls` (default) on 587, `tls` for implicit TLS on 465,
                // `none` for local development relays.
                let mut builder = match encryption.as_str() {
                    "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                        .context("failed to create SMTP relay transport")?
                        .port(*port),
                    "none" => {
                        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(*port)
                    }
                    _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .context("failed to create SMTP STARTTLS transport")?
                        .port(*port),
                };

                if let (Some(user), Some(pass)) = (username, password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }

                Transport::Smtp(builder.build())
            }
            MailTransport::Disabled => Transport::Disabled,
        };

        Ok(Self {
            transport,
            from_email: settings.from.clone(),
            extra: settings.extra.clone(),
        })
    }

    fn transport_name(&self) -> &'static str {
        match self.transport {
            Transport::Smtp(_) => "smtp",
            Transport::Sendmail(_) => "sendmail",
            Transport::Disabled => "disabled",
        }
    }
}

#[async_trait]
impl Mailer for MailService {
    async fn send(&self, message: MailMessage) -> Result<()> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .context("invalid from email address")?,
            )
            .to(message
                .to
                .parse()
                .context("invalid recipient email address")?)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body)
            .context("failed to build email message")?;

        match &self.transport {
            Transport::Smtp(t) => {
                t.send(email).await.context("failed to send email")?;
            }
            Transport::Sendmail(t) => {
                t.send(email).await.context("failed to send email")?;
            }
            Transport::Disabled => {
                info!(to = %message.to, subject = %message.subject, "mail disabled, message dropped");
            }
        }

        Ok(())
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl std::fmt::Debug for MailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailService")
            .field("transport", &self.transport_name())
            .field("from", &self.from_email)
            .finish()
    }
}
