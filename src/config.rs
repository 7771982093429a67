use crate::model::bus::topics;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub emulator: EmulatorConfig,
}

/// Text-box console behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsoleConfig {
    /// Minimum spacing between two renders of the console text, in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Whether typed and pasted characters are sent to the device at startup
    #[serde(default = "default_true")]
    pub input_enabled: bool,

    /// Drop a scheduled render when the console is detached
    #[serde(default = "default_true")]
    pub cancel_flush_on_detach: bool,
}

/// Topics used on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BusConfig {
    #[serde(default = "default_output_topic")]
    pub output_topic: String,

    #[serde(default = "default_input_topic")]
    pub input_topic: String,

    /// Number of bus events kept for diagnostics
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// External terminal emulator mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmulatorConfig {
    /// Delay before the emulator is initialized, in milliseconds
    #[serde(default = "default_init_delay_ms")]
    pub init_delay_ms: u64,

    /// Line printed once the emulator is ready
    #[serde(default = "default_banner")]
    pub banner: String,
}

fn default_true() -> bool {
    true
}

fn default_flush_interval_ms() -> u64 {
    16
}

fn default_output_topic() -> String {
    topics::SERIAL0_OUTPUT_CHAR.to_string()
}

fn default_input_topic() -> String {
    topics::SERIAL0_INPUT.to_string()
}

fn default_history_limit() -> usize {
    1000
}

fn default_init_delay_ms() -> u64 {
    100
}

fn default_banner() -> String {
    "This is the serial console. Whatever you type or paste here will be sent to COM1".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            input_enabled: true,
            cancel_flush_on_detach: true,
        }
    }
}

impl ConsoleConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            output_topic: default_output_topic(),
            input_topic: default_input_topic(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            init_delay_ms: default_init_delay_ms(),
            banner: default_banner(),
        }
    }
}

impl EmulatorConfig {
    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> Result<String, ConfigError> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.console.flush_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "console.flush_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.bus.output_topic.is_empty() || self.bus.input_topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "bus topics must not be empty".to_string(),
            ));
        }

        if self.bus.output_topic == self.bus.input_topic {
            return Err(ConfigError::ValidationError(format!(
                "bus.output_topic and bus.input_topic must differ (both are {:?})",
                self.bus.output_topic
            )));
        }

        if self.bus.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "bus.history_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
