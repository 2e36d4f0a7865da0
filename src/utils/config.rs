use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MAX_FILE_BYTES: u64 = 700 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_FIELD_CHARS: usize = 1_000_000;
pub const DEFAULT_MAX_RESIDUE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transcode: TranscodeOptions,
    pub presets: PresetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    pub chunk_size_bytes: usize,
    pub max_file_bytes: u64,
    pub max_field_chars: usize,
    pub max_residue_bytes: usize,
    pub preview_bytes: usize,
    pub preview_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            max_file_bytes: MAX_FILE_BYTES,
            max_field_chars: DEFAULT_MAX_FIELD_CHARS,
            max_residue_bytes: DEFAULT_MAX_RESIDUE_BYTES,
            preview_bytes: 64 * 1024,
            preview_rows: 10,
        }
    }
}

impl TranscodeOptions {
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size_bytes = bytes.max(1);
        self
    }

    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "dsv-transcoder".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            transcode: TranscodeOptions::default(),
            presets: PresetConfig {
                db_path: PathBuf::from("./data/presets.redb"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> crate::utils::errors::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::utils::errors::TranscodeError::ConfigError(e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| crate::utils::errors::TranscodeError::ConfigError(e.to_string()))
    }

    pub fn load_or_default(path: Option<&str>) -> Self {
        if let Some(p) = path {
            Self::load_from_file(p).unwrap_or_default()
        } else {
            Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.transcode.max_file_bytes, 700 * 1024 * 1024);
        assert_eq!(config.transcode.max_field_chars, 1_000_000);
        assert_eq!(config.transcode.chunk_size_bytes, 1024 * 1024);
    }

    #[test]
    fn test_partial_transcode_section_uses_defaults() {
        let text = r#"
[server]
name = "x"
version = "0.0.1"

[transcode]
chunk_size_bytes = 4096

[presets]
db_path = "/tmp/p.redb"

[logging]
level = "debug"
format = "json"
"#;
        let config: AppConfig = toml::from_str(text).expect("parse config");
        assert_eq!(config.transcode.chunk_size_bytes, 4096);
        assert_eq!(config.transcode.preview_rows, 10);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = AppConfig::load_or_default(Some("/nonexistent/config.toml"));
        assert_eq!(config.server.name, "dsv-transcoder");
    }
}
