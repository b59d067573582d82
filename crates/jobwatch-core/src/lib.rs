pub mod app_config;
pub mod config;
pub mod extractors;
pub mod postings;
pub mod sources;

pub use app_config::{AppConfig, Environment, SmtpConfig};
pub use config::{load_app_config, load_app_config_from_env};
pub use extractors::{
    load_extractors, parse_extractors, ExtractorConfig, ExtractorKind, ExtractorsFile,
    HtmlSelectors, JsonPointers,
};
pub use postings::{diff_postings, KeywordFilter, Posting, PostingDiff};
pub use sources::{
    daily_cron, digest_trigger_times, parse_time_of_day, DigestTriggerTimes, Schedule,
    SourceConfig, Weekday, DEFAULT_DIGEST_TIME,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read extractors file {path}: {source}")]
    ExtractorsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse extractors file: {0}")]
    ExtractorsFileParse(#[from] serde_yaml::Error),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("validation error: {0}")]
    Validation(String),
}
