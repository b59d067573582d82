//! Outbound email: the daily digest and operator failure notices.

pub mod digest;
pub mod failure;
pub mod mailer;
pub mod smtp;
mod templates;

pub use digest::{render_digest, Digest, DigestEntry, DigestSection, RunSummary};
pub use failure::{render_failure, FailureNotice};
pub use mailer::{Email, LogMailer, Mailer, RenderedEmail};
pub use smtp::{parse_recipient, SmtpMailer};

/// Errors that can occur while rendering or delivering mail.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
