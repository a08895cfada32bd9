//! Outgoing email: SMTP delivery and fire-and-forget dispatch
//!
//! Delivery results are logged, never surfaced to the request that
//! triggered the email.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::EmailConfig;
use crate::{Error, Result};

/// Mask an email address for safe logging: `use***@example.com`
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(3).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// SMTP delivery via lettre
pub struct SmtpMailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| Error::Email(format!("Failed to create SMTP transport: {e}")))?
                .credentials(creds)
                .port(config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .credentials(creds)
                .port(config.smtp_port)
                .build()
        };

        Ok(Self { config, transport })
    }

    fn build_message(&self, to: &str, email: &OutgoingEmail) -> Result<Message> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| Error::Email(format!("Invalid from address: {e}")))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| Error::Email(format!("Invalid to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| Error::Email(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        for recipient in &email.to {
            let message = self.build_message(recipient, email)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| Error::Email(format!("Failed to send email: {e}")))?;

            info!(
                to = %mask_email(recipient),
                host = %self.config.smtp_host,
                port = self.config.smtp_port,
                "Email sent via SMTP"
            );
        }
        Ok(())
    }
}

/// Logs emails instead of sending them (SMTP not configured)
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let to: Vec<_> = email.to.iter().map(|t| mask_email(t)).collect();
        info!(to = ?to, subject = %email.subject, "SMTP not configured, email not delivered");
        tracing::debug!(body = %email.text_body, "Undelivered email body");
        Ok(())
    }
}

/// Keeps every email in memory
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

/// How the dispatcher hands emails to the mailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Spawn a task per email; the caller never waits
    Background,
    /// Await delivery in place (tests)
    Inline,
}

/// Fire-and-forget front of a [`Mailer`]
#[derive(Clone)]
pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    mode: DispatchMode,
}

impl EmailDispatcher {
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, mode: DispatchMode) -> Self {
        Self { mailer, mode }
    }

    /// SMTP when configured, otherwise a logging mailer
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let mailer: Arc<dyn Mailer> = if config.is_configured() {
            Arc::new(SmtpMailer::new(config.clone())?)
        } else {
            Arc::new(LogMailer)
        };
        Ok(Self::new(mailer, DispatchMode::Background))
    }

    /// Deliver `email`; failures are logged and swallowed
    pub async fn dispatch(&self, email: OutgoingEmail) {
        match self.mode {
            DispatchMode::Background => {
                let mailer = Arc::clone(&self.mailer);
                tokio::spawn(async move { deliver(mailer.as_ref(), &email).await });
            }
            DispatchMode::Inline => deliver(self.mailer.as_ref(), &email).await,
        }
    }
}

async fn deliver(mailer: &dyn Mailer, email: &OutgoingEmail) {
    match mailer.send(email).await {
        Ok(()) => info!(subject = %email.subject, recipients = email.to.len(), "Email dispatched"),
        Err(e) => error!(subject = %email.subject, error = %e, "Email delivery failed"),
    }
}

impl std::fmt::Debug for EmailDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailDispatcher").field("mode", &self.mode).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: vec!["ann@x.com".to_string()],
            subject: "hi".to_string(),
            html_body: "<p>hi</p>".to_string(),
            text_body: "hi".to_string(),
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<()> {
            Err(Error::Email("smtp down".to_string()))
        }
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("annabel@x.com"), "ann***@x.com");
        assert_eq!(mask_email("张三丰丰@x.com"), "张三丰***@x.com");
        assert_eq!(mask_email("nope"), "***");
    }

    #[tokio::test]
    async fn test_inline_dispatch_records() {
        let mailer = Arc::new(RecordingMailer::new());
        let dispatcher = EmailDispatcher::new(mailer.clone(), DispatchMode::Inline);
        dispatcher.dispatch(email()).await;
        assert_eq!(mailer.sent().await, vec![email()]);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let dispatcher = EmailDispatcher::new(Arc::new(FailingMailer), DispatchMode::Inline);
        dispatcher.dispatch(email()).await;
        let dispatcher = EmailDispatcher::new(Arc::new(FailingMailer), DispatchMode::Background);
        dispatcher.dispatch(email()).await;
    }

    #[test]
    fn test_unconfigured_smtp_falls_back_to_log() {
        assert!(EmailDispatcher::from_config(&EmailConfig::default()).is_ok());
    }
}
