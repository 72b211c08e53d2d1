use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self { api_url: None }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Base URL of the backend, falling back to the bundled default.
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(crate::api::DEFAULT_API_URL)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tutora").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_defaults() {
        let config = Config::new();
        assert_eq!(config.api_url(), crate::api::DEFAULT_API_URL);

        let config = Config {
            api_url: Some("http://10.0.0.2:5000/api".to_string()),
        };
        assert_eq!(config.api_url(), "http://10.0.0.2:5000/api");
    }
}
