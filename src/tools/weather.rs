use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::{ErrorShape, Tool};
use crate::config::WeatherConfig;

#[derive(Debug, Error)]
enum WeatherError {
    #[error("OpenWeather API key not configured")]
    NotConfigured,

    #[error("Unable to fetch weather data at the moment")]
    Transport(#[source] reqwest::Error),

    #[error("Received unexpected data from weather service")]
    UnexpectedData(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WeatherResult {
    Current {
        city: String,
        temp: f64,
        description: String,
    },
    Error {
        error: String,
    },
}

impl ErrorShape for WeatherResult {
    fn from_error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// The part of the OpenWeather current-weather payload we read.
#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReadings,
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

/// Fetches current conditions for a city from OpenWeather.
pub struct WeatherClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build weather HTTP client")?;

        Ok(Self {
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.base_url.clone(),
            client,
        })
    }

    async fn fetch(&self, city: &str) -> std::result::Result<WeatherResult, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::NotConfigured)?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(WeatherError::Transport)?;

        let body = response.text().await.map_err(WeatherError::Transport)?;
        let current: CurrentWeather =
            serde_json::from_str(&body).map_err(|e| WeatherError::UnexpectedData(e.to_string()))?;

        let description = current
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| WeatherError::UnexpectedData("empty weather list".to_string()))?;

        Ok(WeatherResult::Current {
            city: city.to_string(),
            temp: current.main.temp,
            description,
        })
    }
}

#[async_trait::async_trait]
impl Tool for WeatherClient {
    /// City name.
    type Input = String;
    type Output = WeatherResult;

    fn name(&self) -> &str {
        "weather"
    }

    async fn run(&self, city: String) -> Result<WeatherResult> {
        match self.fetch(&city).await {
            Ok(result) => {
                log::debug!("WeatherClient: retrieved weather for {}", city);
                Ok(result)
            }
            Err(e) => {
                match &e {
                    WeatherError::NotConfigured => {
                        log::error!("WeatherClient: no OpenWeather API key configured")
                    }
                    WeatherError::Transport(source) => {
                        log::error!("WeatherClient: request failed for city={}: {}", city, source)
                    }
                    WeatherError::UnexpectedData(detail) => {
                        log::error!("WeatherClient: bad response for city={}: {}", city, detail)
                    }
                }
                Ok(WeatherResult::from_error(e.to_string()))
            }
        }
    }
}
