use super::check_status;
use crate::config::Config;
use crate::error::ProviderError;
use reqwest::Client;

/// Current-conditions lookup against an Open-Meteo compatible API.
pub struct WeatherClient {
    client: Client,
    base: String,
}

impl WeatherClient {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            client,
            base: cfg.weather_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// "<description>, <temp>°C" for the given coordinates.
    pub async fn current_conditions(&self, latitude: f64, longitude: f64) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&current=temperature_2m,weather_code&temperature_unit=celsius",
            self.base, latitude, longitude
        );
        let resp = check_status(self.client.get(&url).send().await?).await?;
        let j: serde_json::Value = resp.json().await?;
        let temp = j["current"]["temperature_2m"]
            .as_f64()
            .ok_or_else(|| ProviderError::Decode("no current.temperature_2m".into()))?;
        let code = j["current"]["weather_code"]
            .as_i64()
            .ok_or_else(|| ProviderError::Decode("no current.weather_code".into()))?;
        Ok(format!("{}, {}°C", weather_description(code), temp.round() as i64))
    }
}

/// WMO weather interpretation code to a short description.
pub fn weather_description(code: i64) -> &'static str {
    match code {
        0 => "Clear",
        1..=3 => "Partly Cloudy",
        4..=48 => "Foggy",
        49..=57 => "Drizzle",
        58..=67 => "Rain",
        68..=77 => "Snow",
        78..=82 => "Rain Showers",
        83..=86 => "Snow Showers",
        87..=99 => "Thunderstorm",
        _ => "Cloudy",
    }
}
