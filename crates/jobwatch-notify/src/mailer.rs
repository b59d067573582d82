//! Mailer trait and the development mailer that only logs.

use crate::NotifyError;

/// Subject and bodies produced by a template, not yet addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// A rendered email addressed to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl Email {
    #[must_use]
    pub fn new(to: Vec<String>, rendered: RenderedEmail) -> Self {
        Self {
            to,
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        }
    }
}

/// Delivery channel for rendered email.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `email` to all of its recipients. Success means the relay
    /// accepted the message.
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g. "smtp", "log").
    fn channel_name(&self) -> &str;
}

/// Writes mail to the log instead of sending it. Used in development when no
/// SMTP relay is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        tracing::info!(
            channel = "log",
            subject = %email.subject,
            recipients = ?email.to,
            "email not sent (no SMTP relay configured)"
        );
        tracing::debug!(body = %email.text, "email body");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let email = Email::new(
            vec!["ops@example.com".to_string()],
            RenderedEmail {
                subject: "s".to_string(),
                html: "<p>h</p>".to_string(),
                text: "t".to_string(),
            },
        );
        assert!(LogMailer.send(&email).await.is_ok());
        assert_eq!(LogMailer.channel_name(), "log");
    }
}
