use crate::app_config::{AppConfig, Environment, SmtpConfig};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_num = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let narrow = |var: &str, value: u64| -> Result<u32, ConfigError> {
        u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("JOBWATCH_ENV", "development"))?;

    let bind_raw = or_default("JOBWATCH_BIND_ADDR", "0.0.0.0:3000");
    let bind_addr = bind_raw
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "JOBWATCH_BIND_ADDR".to_string(),
            reason: e.to_string(),
        })?;

    let log_level = or_default("JOBWATCH_LOG_LEVEL", "info");
    let extractors_path = PathBuf::from(or_default(
        "JOBWATCH_EXTRACTORS_PATH",
        "./config/extractors.yaml",
    ));
    let api_keys = split_list(&or_default("JOBWATCH_API_KEYS", ""));

    let db_max_connections = narrow(
        "JOBWATCH_DB_MAX_CONNECTIONS",
        parse_num("JOBWATCH_DB_MAX_CONNECTIONS", "10")?,
    )?;
    let db_min_connections = narrow(
        "JOBWATCH_DB_MIN_CONNECTIONS",
        parse_num("JOBWATCH_DB_MIN_CONNECTIONS", "1")?,
    )?;
    let db_acquire_timeout_secs = parse_num("JOBWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_num("JOBWATCH_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default(
        "JOBWATCH_SCRAPER_USER_AGENT",
        "jobwatch/0.1 (job-listing monitor)",
    );
    let scraper_max_retries = narrow(
        "JOBWATCH_SCRAPER_MAX_RETRIES",
        parse_num("JOBWATCH_SCRAPER_MAX_RETRIES", "2")?,
    )?;
    let scraper_retry_backoff_base_secs =
        parse_num("JOBWATCH_SCRAPER_RETRY_BACKOFF_BASE_SECS", "2")?;

    let extractor_timeout_secs = parse_num("JOBWATCH_EXTRACTOR_TIMEOUT_SECS", "60")?;
    let crawl_timeout_secs = parse_num("JOBWATCH_CRAWL_TIMEOUT_SECS", "600")?;
    let crawl_max_pages = usize::try_from(parse_num("JOBWATCH_CRAWL_MAX_PAGES", "30")?)
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "JOBWATCH_CRAWL_MAX_PAGES".to_string(),
            reason: e.to_string(),
        })?;
    if crawl_max_pages == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "JOBWATCH_CRAWL_MAX_PAGES".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let config_poll_secs = parse_num("JOBWATCH_CONFIG_POLL_SECS", "60")?;
    if config_poll_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "JOBWATCH_CONFIG_POLL_SECS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let retention_days = narrow(
        "JOBWATCH_RETENTION_DAYS",
        parse_num("JOBWATCH_RETENTION_DAYS", "30")?,
    )?;

    let smtp = match lookup("SMTP_HOST") {
        Ok(host) if !host.trim().is_empty() => {
            let port = u16::try_from(parse_num("SMTP_PORT", "587")?).map_err(|e| {
                ConfigError::InvalidEnvVar {
                    var: "SMTP_PORT".to_string(),
                    reason: e.to_string(),
                }
            })?;
            Some(SmtpConfig {
                host: host.trim().to_string(),
                port,
                username: lookup("SMTP_USERNAME").ok(),
                password: lookup("SMTP_PASSWORD").ok(),
            })
        }
        _ => None,
    };

    if smtp.is_none() && env != Environment::Development {
        return Err(ConfigError::MissingEnvVar("SMTP_HOST".to_string()));
    }

    let mail_from = or_default("JOBWATCH_MAIL_FROM", "jobwatch@localhost");
    let operator_emails = split_list(&or_default("JOBWATCH_OPERATOR_EMAILS", ""));

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        extractors_path,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        extractor_timeout_secs,
        crawl_timeout_secs,
        crawl_max_pages,
        config_poll_secs,
        retention_days,
        smtp,
        mail_from,
        operator_emails,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "JOBWATCH_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
