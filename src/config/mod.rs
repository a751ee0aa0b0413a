use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub assembly: AssemblyConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Base URL used when constructing share links.
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Diarization service endpoint (multipart file upload).
    pub diarizer_url: String,
    /// PDF renderer endpoint.
    pub pdf_renderer_url: String,
    pub openai_api_endpoint: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// Fixed transcription target language.
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub ffmpeg_path: String,
    /// Allow raw byte concatenation when ffmpeg fails. Only byte-correct for
    /// containers without per-file headers; off by default.
    pub allow_lossy_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long demo meetings are kept before the reaper deletes them.
    pub demo_retention_hours: i64,
    pub sweep_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3747,
            public_url: "http://127.0.0.1:3747".to_string(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            diarizer_url: "http://127.0.0.1:8001/diarize".to_string(),
            pdf_renderer_url: "http://127.0.0.1:8002/render".to_string(),
            openai_api_endpoint: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            language: "no".to_string(),
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            allow_lossy_fallback: false,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            demo_retention_hours: 48,
            sweep_interval_seconds: 3600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, 3747);
        assert_eq!(parsed.services.language, "no");
        assert!(!parsed.assembly.allow_lossy_fallback);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("[retention]\ndemo_retention_hours = 24\n").unwrap();
        assert_eq!(parsed.retention.demo_retention_hours, 24);
        assert_eq!(parsed.retention.sweep_interval_seconds, 3600);
        assert_eq!(parsed.assembly.ffmpeg_path, "ffmpeg");
    }
}
