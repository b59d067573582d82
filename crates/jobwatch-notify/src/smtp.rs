//! SMTP mailer via `lettre` with TLS support.
//!
//! Port 465 uses implicit TLS; every other port uses STARTTLS.

use jobwatch_core::SmtpConfig;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::mailer::{Email, Mailer};
use crate::NotifyError;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Parse a bare recipient address with the same parser delivery uses and
/// return its normalized form.
///
/// # Errors
///
/// Returns [`NotifyError::Config`] if `value` is not a single address, or
/// carries a display name.
pub fn parse_recipient(value: &str) -> Result<String, NotifyError> {
    let mailbox: Mailbox = value
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| {
            NotifyError::Config(format!("invalid recipient '{value}': {e}"))
        })?;
    if mailbox.name.is_some() {
        return Err(NotifyError::Config(format!(
            "invalid recipient '{value}': expected a bare address"
        )));
    }
    Ok(mailbox.email.to_string())
}

/// Sends email through an SMTP relay.
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build an `SmtpMailer` from SMTP configuration and a sender address
    /// (e.g. `"jobwatch@example.com"` or `"Jobwatch <jobwatch@example.com>"`).
    ///
    /// Credentials are attached only when both username and password are set.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] if the sender address does not parse or
    /// the relay host is invalid.
    pub fn from_config(smtp: &SmtpConfig, from: &str) -> Result<Self, NotifyError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = if smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| NotifyError::Config(e.to_string()))?
        .port(smtp.port);

        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, NotifyError> {
        if email.to.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = Message::builder().from(self.from.clone());
        let mut accepted = 0usize;
        for address in &email.to {
            // One bad stored address must not hold back the others.
            match address.parse::<Mailbox>() {
                Ok(mailbox) => {
                    builder = builder.to(mailbox);
                    accepted += 1;
                }
                Err(e) => {
                    tracing::warn!(recipient = %address, error = %e, "skipping invalid recipient");
                }
            }
        }
        if accepted == 0 {
            return Err(NotifyError::Config(format!(
                "no valid recipient among: {}",
                email.to.join(", ")
            )));
        }

        builder
            .subject(&email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "smtp",
            subject = %email.subject,
            recipients = email.to.len(),
            "email delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "smtp"
    }
}
