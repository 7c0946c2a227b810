//! Strongly typed configuration schemas.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoGptConfig {
    /// Directory that relative tool paths are resolved against.
    pub working_dir: PathBuf,
    /// Logging bootstrap settings.
    pub logging: LoggingConfig,
    /// Defaults applied by the conversion tools.
    pub conversion: ConversionConfig,
}

impl Default for GeoGptConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            logging: LoggingConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level, target, source location and message.
    #[default]
    Full,
    /// Shorter single-line output.
    Compact,
    /// Multi-line human-oriented output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" | "text" => Some(Self::Full),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Rotation period of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// New file every minute.
    Minutely,
    /// New file every hour.
    Hourly,
    /// New file every day.
    #[default]
    Daily,
    /// Single file, never rotated.
    Never,
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `geogpt_conversion=debug,info`.
    pub level: String,
    /// Line format for every sink.
    pub format: LogFormat,
    /// Optional log file; rotated files are written next to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Rotation period for the log file.
    pub rotation: LogRotation,
    /// Number of rotated files kept.
    pub max_files: usize,
    /// Emit ANSI colours on the console.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            file: None,
            rotation: LogRotation::Daily,
            max_files: 5,
            ansi: true,
        }
    }
}

/// Defaults for the CSV conversion tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Column holding x / longitude values.
    pub x_column: String,
    /// Column holding y / latitude values.
    pub y_column: String,
    /// Optional column holding z values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_column: Option<String>,
    /// CRS assigned to CSV point layers.
    pub default_crs: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            z_column: None,
            default_crs: "EPSG:4326".to_string(),
        }
    }
}
