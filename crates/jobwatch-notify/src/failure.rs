//! Operator notice for a failed source run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mailer::RenderedEmail;
use crate::{templates, NotifyError};

/// Everything an operator needs to act on a failed run. Mirrors the stored
/// failure record.
#[derive(Debug, Clone, Serialize)]
pub struct FailureNotice {
    pub source_id: i64,
    pub source_title: String,
    pub source_url: String,
    pub kind: String,
    pub message: String,
    pub trace: String,
    pub failed_at: DateTime<Utc>,
}

/// Render a failure notice.
///
/// # Errors
///
/// Returns [`NotifyError::Template`] if rendering fails.
pub fn render_failure(notice: &FailureNotice) -> Result<RenderedEmail, NotifyError> {
    let subject = format!(
        "[jobwatch] {} for {} ({})",
        notice.kind, notice.source_title, notice.source_url
    );
    Ok(RenderedEmail {
        subject,
        html: templates::render("failure.html", notice)?,
        text: templates::render("failure.txt", notice)?,
    })
}
