//! Diagnostic logging for the CLI and the compiled migrator programs
//!
//! Progress lines go to stdout with `println!`; `tracing` output goes to
//! stderr so the two never interleave in captured output.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "ELIF_LOG";

/// Environment variable selecting the output format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "ELIF_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `ELIF_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of plain text
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "warn".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Defaults, adjusted by `ELIF_LOG_FORMAT`
    pub fn from_env() -> Self {
        let json_format = std::env::var(LOG_FORMAT_ENV)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            json_format,
            ..Self::default()
        }
    }

    /// Raise the default filter, as `--verbose` does
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.default_filter = "info".to_string();
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(&self.default_filter))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: LoggingConfig) {
    let filter = config.filter();

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}
