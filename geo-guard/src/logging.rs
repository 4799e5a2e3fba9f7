//! Logging configuration for geo-guard.
//!
//! The library only emits `tracing` events. Installing a subscriber is left to
//! the binary (see [`setup::init_logging`]).

use tracing::Level;

/// Controls how much the engine logs while replaying a dataset.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level for engine components
    pub base_level: Level,
    /// Whether each check invocation is logged at debug level
    pub log_check_details: bool,
    /// Whether loads and rewrites of snapshot files are logged
    pub log_data_operations: bool,
    /// Whether applied corrections are logged with the corrected uris
    pub log_corrections: bool,
    /// Maximum length for logged field values
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_check_details: false,
            log_data_operations: true,
            log_corrections: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Verbose configuration for debugging a collection.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_check_details: true,
            log_data_operations: true,
            log_corrections: true,
            max_field_length: 1024,
        }
    }

    /// Quiet configuration for scheduled runs.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_check_details: false,
            log_data_operations: false,
            log_corrections: true,
            max_field_length: 128,
        }
    }
}

/// Debug logging that skips argument formatting when debug is disabled.
#[macro_export]
macro_rules! perf_debug {
    ($config:expr, $($arg:tt)*) => {
        if $config.base_level >= tracing::Level::DEBUG {
            tracing::debug!($($arg)*);
        }
    };
}

/// Logs a check invocation when check details are enabled.
#[macro_export]
macro_rules! log_check {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_check_details {
            tracing::debug!($($arg)*);
        }
    };
}

/// Logs a snapshot load or rewrite when data operations are enabled.
#[macro_export]
macro_rules! log_data_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_data_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Truncates a string to `max_length` bytes, respecting char boundaries.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Subscriber setup for binaries.
pub mod setup {
    use tracing::Level;

    /// Configuration for the `tracing-subscriber` installation.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for everything outside geo-guard
        pub level: Level,
        /// Log level for geo-guard components
        pub geo_level: Level,
        /// Emit JSON lines instead of human-readable output
        pub json_format: bool,
        /// Explicit filter directive overriding the levels above
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::WARN,
                geo_level: Level::INFO,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        pub fn development() -> Self {
            Self {
                level: Level::INFO,
                geo_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_geo_level(mut self, level: Level) -> Self {
            self.geo_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the filter directive string.
        pub fn env_filter(&self) -> String {
            if let Some(ref filter) = self.env_filter {
                filter.clone()
            } else {
                format!(
                    "{},geo_guard={},geo_collect={}",
                    self.level.as_str().to_lowercase(),
                    self.geo_level.as_str().to_lowercase(),
                    self.geo_level.as_str().to_lowercase()
                )
            }
        }
    }

    /// Installs a global subscriber. `RUST_LOG` wins over the configuration.
    ///
    /// ```rust,no_run
    /// use geo_guard::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}
