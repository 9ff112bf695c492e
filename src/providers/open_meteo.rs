use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::{Conditions, EnvironmentProvider};
use crate::environment::WeatherCondition;
use crate::error::ProviderError;
use crate::geometry::BoundingRegion;

const AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: AirQualityCurrent,
}

#[derive(Debug, Deserialize)]
struct AirQualityCurrent {
    us_aqi: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: ForecastCurrent,
}

#[derive(Debug, Deserialize)]
struct ForecastCurrent {
    temperature_2m: f64,
    weather_code: u16,
}

/// Current US AQI and weather from the public Open-Meteo APIs. No key needed.
pub struct OpenMeteoProvider {
    client: Client,
}

impl OpenMeteoProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("saferoute/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn air_quality(&self, lat: f64, lon: f64) -> Result<AirQualityResponse, ProviderError> {
        Ok(self
            .client
            .get(AIR_QUALITY_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", "us_aqi".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn forecast(&self, lat: f64, lon: f64) -> Result<ForecastResponse, ProviderError> {
        Ok(self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", "temperature_2m,weather_code".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

impl EnvironmentProvider for OpenMeteoProvider {
    async fn fetch_conditions(&self, region: &BoundingRegion) -> Result<Conditions, ProviderError> {
        let (lat, lon) = (region.center.lat(), region.center.lon());
        let (air, weather) = tokio::try_join!(self.air_quality(lat, lon), self.forecast(lat, lon))?;
        let conditions = into_conditions(air, weather)?;
        debug!("Open-Meteo conditions at ({lat}, {lon}): {conditions:?}");
        Ok(conditions)
    }
}

fn into_conditions(air: AirQualityResponse, weather: ForecastResponse) -> Result<Conditions, ProviderError> {
    let aqi = air
        .current
        .us_aqi
        .filter(|aqi| aqi.is_finite() && *aqi >= 0.0)
        .ok_or_else(|| ProviderError::Malformed("no current US AQI reported".to_string()))?;

    Ok(Conditions {
        aqi: aqi.round() as u32,
        temperature_c: weather.current.temperature_2m,
        condition: WeatherCondition::from_wmo_code(weather.current.weather_code),
    })
}
