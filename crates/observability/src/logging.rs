//! Subscriber installation.
//!
//! Filtering follows `RUST_LOG` (default `info`); the output format follows
//! `STOCKLEDGER_LOG_FORMAT`.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "STOCKLEDGER_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output for local runs.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl LogFormat {
    /// Read `STOCKLEDGER_LOG_FORMAT`; unset or unrecognised means JSON.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        lookup(LOG_FORMAT_VAR)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let installed = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    let installed = installed.is_ok();
    if installed {
        tracing::debug!(?format, "tracing subscriber installed");
    }
    installed
}
