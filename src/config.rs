use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub weather: WeatherConfig,
    pub summary: SummaryConfig,
    pub snippet: SnippetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub default_city: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_city: "Bengaluru".to_string(),
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Which generative backend writes the day summary.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProvider {
    OpenAi,
    Ollama,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummaryConfig {
    pub provider: SummaryProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::OpenAi,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SnippetConfig {
    pub interpreter: String,
    pub timeout_secs: u64,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `$SMART_LIFE_CONFIG` or `config.toml`, falling
    /// back to defaults when the file does not exist, then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("SMART_LIFE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Override file values with whatever `lookup` returns for the known
    /// environment variables. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENWEATHER_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.summary.api_key = Some(key);
        }
        if let Some(model) = get("SMART_LIFE_OPENAI_MODEL") {
            self.summary.model = model;
        }
        if let Some(city) = get("SMART_LIFE_DEFAULT_CITY") {
            self.weather.default_city = city;
        }
        if let Some(level) = get("SMART_LIFE_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(port) = get("SMART_LIFE_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("SMART_LIFE_PORT is not a valid port: {}", port))?;
        }
        if let Some(dir) = get("SMART_LIFE_DATA_DIR") {
            self.data.dir = dir;
        }

        Ok(())
    }

    pub fn events_path(&self) -> PathBuf {
        PathBuf::from(&self.data.dir).join("events.json")
    }

    pub fn todo_path(&self) -> PathBuf {
        PathBuf::from(&self.data.dir).join("todo.json")
    }

    pub fn expenses_path(&self) -> PathBuf {
        PathBuf::from(&self.data.dir).join("expenses.csv")
    }

    /// Data files the tools read, labelled for startup logging.
    pub fn data_files(&self) -> [(&'static str, PathBuf); 3] {
        [
            ("expenses", self.expenses_path()),
            ("events", self.events_path()),
            ("todo", self.todo_path()),
        ]
    }

    /// Create the data directory if it doesn't exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data.dir).context("Failed to create data directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [data]
            dir = "/srv/dashboard"

            [weather]
            api_key = "weather_key"
            default_city = "Pune"

            [summary]
            provider = "ollama"
            model = "llama3"
            endpoint = "http://localhost:11434"

            [snippet]
            timeout_secs = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.weather.api_key.as_deref(), Some("weather_key"));
        assert_eq!(config.weather.default_city, "Pune");
        assert_eq!(config.weather.timeout_secs, 10);
        assert_eq!(config.summary.provider, SummaryProvider::Ollama);
        assert_eq!(config.snippet.interpreter, "python3");
        assert_eq!(config.snippet.timeout_secs, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.data.dir, "./data");
        assert_eq!(config.weather.default_city, "Bengaluru");
        assert_eq!(config.summary.model, "gpt-4o-mini");
        assert!(config.summary.api_key.is_none());
        assert_eq!(config.events_path(), PathBuf::from("./data/events.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENWEATHER_API_KEY", "ow"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SMART_LIFE_OPENAI_MODEL", "gpt-4o"),
            ("SMART_LIFE_DEFAULT_CITY", "Mysuru"),
            ("SMART_LIFE_LOG_LEVEL", "DEBUG"),
            ("SMART_LIFE_PORT", "8123"),
            ("SMART_LIFE_DATA_DIR", "/tmp/dash"),
        ]);

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.weather.api_key.as_deref(), Some("ow"));
        assert_eq!(config.summary.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.summary.model, "gpt-4o");
        assert_eq!(config.weather.default_city, "Mysuru");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.todo_path(), PathBuf::from("/tmp/dash/todo.json"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env(|key| (key == "OPENAI_API_KEY").then(|| "  ".to_string()))
            .unwrap();
        assert!(config.summary.api_key.is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "SMART_LIFE_PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }
}
