//! Minijinja environment holding the bundled email templates.
//!
//! Templates named `*.html` are rendered with HTML auto-escaping; `*.txt`
//! templates are rendered verbatim.

use minijinja::{AutoEscape, Environment};
use serde::Serialize;

use crate::NotifyError;

const TEMPLATES: &[(&str, &str)] = &[
    ("digest.html", include_str!("../templates/digest.html")),
    ("digest.txt", include_str!("../templates/digest.txt")),
    ("failure.html", include_str!("../templates/failure.html")),
    ("failure.txt", include_str!("../templates/failure.txt")),
];

fn build_env() -> Result<Environment<'static>, NotifyError> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|name| {
        if name.ends_with(".html") {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
    }
    Ok(env)
}

/// Render the named template with `ctx`.
///
/// # Errors
///
/// Returns [`NotifyError::Template`] if the template is unknown or rendering
/// fails.
pub(crate) fn render<S: Serialize>(name: &str, ctx: S) -> Result<String, NotifyError> {
    let env = build_env()?;
    env.get_template(name)
        .and_then(|t| t.render(ctx))
        .map_err(|e| NotifyError::Template(e.to_string()))
}
