use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV_VAR: &str = "PAWA_API_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub auto_context_lines: usize,
    pub show_diff_before_apply: bool,
    pub use_gemini: bool,
    pub gemini_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            auto_context_lines: 50,
            show_diff_before_apply: true,
            use_gemini: false,
            gemini_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Set one field by name. The value is read as JSON when that fits the
    /// field and as a plain string otherwise.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let mut fields = serde_json::to_value(&*self)?;
        if fields.get(key).is_none() {
            bail!("unknown config key: {key}");
        }

        let literal = serde_json::Value::String(value.to_string());
        let candidates = serde_json::from_str::<serde_json::Value>(value)
            .ok()
            .into_iter()
            .chain([literal]);
        let mut last_error = String::new();
        for candidate in candidates {
            fields[key] = candidate;
            match serde_json::from_value(fields.clone()) {
                Ok(config) => {
                    *self = config;
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        bail!("invalid value for {key}: {last_error}")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
    }

    /// Base URL without a trailing slash, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("pawa-ai"))
    }

    /// Directory for persisted state and logs.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("pawa-ai"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.max_tokens, 4096);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.auto_context_lines, 50);
        assert!(config.show_diff_before_apply);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_url":"http://example:9000/","auto_context_lines":10}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url(), "http://example:9000");
        assert_eq!(config.auto_context_lines, 10);
        assert_eq!(config.max_tokens, 4096);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.use_gemini = true;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_set_field_by_name() {
        let mut config = Config::new();
        config.set_field("api_url", "http://10.0.0.2:8000").unwrap();
        config.set_field("use_gemini", "true").unwrap();
        config.set_field("auto_context_lines", "20").unwrap();
        assert_eq!(config.api_url, "http://10.0.0.2:8000");
        assert!(config.use_gemini);
        assert_eq!(config.auto_context_lines, 20);

        config.set_field("model", "1234").unwrap();
        assert_eq!(config.model, "1234");

        assert!(config.set_field("nope", "1").is_err());
        assert!(config.set_field("max_tokens", "lots").is_err());
        assert_eq!(config.max_tokens, 4096);
    }
}
