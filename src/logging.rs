//! # Structured Logging Module
//!
//! Environment-aware tracing initialization. Console output everywhere, JSON
//! formatting in production so log shippers get structured fields.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call repeatedly;
/// later calls are no-ops, and an already-installed global subscriber (e.g.
/// from a test harness) is tolerated.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_env("ORDERFLOW_LOG")
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json = environment == "production";
        let console = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(!json);

        let result = if json {
            tracing_subscriber::registry()
                .with(console.json().with_filter(filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(console.with_filter(filter))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already set, continuing");
        }

        tracing::info!(environment = %environment, "structured logging initialized");
    });
}

fn get_environment() -> String {
    std::env::var("ORDERFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("test"), "debug");
    }
}
