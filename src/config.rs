use std::env;
use std::path::PathBuf;

/// Default gas budget handed to each CLI-dispatched call.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// Configuration for the retryable-chain CLI tool
///
/// Protocol gas prices and the ticket lifetime are constants in [`crate::gas`] and
/// [`crate::ticket`]; only operator-facing settings live here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (default: `.retryable-chain/` in current directory)
    pub data_dir: PathBuf,

    /// Output format: "human" (default) or "json"
    pub output_format: String,

    /// Log level: "info", "debug", "warn", "error" (default: "info")
    pub log_level: String,

    /// Gas available to a single dispatched call
    pub gas_limit: u64,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        let data_dir = env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".retryable-chain");

        Config {
            data_dir,
            output_format: "human".to_string(),
            log_level: "info".to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }

    /// Create config with custom data directory
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Config {
            data_dir,
            ..Config::new()
        }
    }

    pub fn get_data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn set_data_dir(&mut self, dir: PathBuf) {
        self.data_dir = dir;
    }

    pub fn get_output_format(&self) -> &str {
        &self.output_format
    }

    /// Set output format ("human" or "json")
    pub fn set_output_format(&mut self, format: String) {
        self.output_format = format;
    }

    pub fn get_log_level(&self) -> &str {
        &self.log_level
    }

    pub fn set_log_level(&mut self, level: String) {
        self.log_level = level;
    }

    pub fn get_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn set_gas_limit(&mut self, gas: u64) {
        self.gas_limit = gas;
    }

    /// Get emitted-event log path
    pub fn get_event_log_path(&self) -> PathBuf {
        self.data_dir.join("events.log")
    }

    /// Get ticket store snapshot path
    pub fn get_store_path(&self) -> PathBuf {
        self.data_dir.join("tickets.bin")
    }

    /// Load config from environment variables
    ///
    /// Environment variables:
    /// - `RETRYABLE_CHAIN_DATA_DIR`: override data directory
    /// - `RETRYABLE_CHAIN_OUTPUT_FORMAT`: "human" or "json"
    /// - `RETRYABLE_CHAIN_LOG_LEVEL`: log level
    /// - `RETRYABLE_CHAIN_GAS_LIMIT`: per-call gas budget (ignored if not a number)
    pub fn from_env() -> Self {
        let mut config = Config::new();

        if let Ok(dir) = env::var("RETRYABLE_CHAIN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(format) = env::var("RETRYABLE_CHAIN_OUTPUT_FORMAT") {
            config.output_format = format;
        }

        if let Ok(level) = env::var("RETRYABLE_CHAIN_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(gas) = env::var("RETRYABLE_CHAIN_GAS_LIMIT")
            .ok()
            .and_then(|g| g.parse::<u64>().ok())
        {
            config.gas_limit = gas;
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
