use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// IP geolocation lookup. The login path waits 100 ms for this at most and
/// proceeds with "Unknown" otherwise, so the client timeout only bounds the
/// background completion.
pub struct GeoService {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    city: Option<String>,
    country_name: Option<String>,
}

impl GeoService {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key: api_key.to_string(),
        }
    }

    pub async fn get_location(&self, ip: &str) -> AppResult<String> {
        if self.api_key.is_empty() {
            return Ok("Unknown".to_string());
        }

        let url = format!(
            "https://api.ipstack.com/{ip}?access_key={key}",
            key = self.api_key
        );
        let response: GeoResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("geo lookup: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("geo decode: {e}")))?;

        match (response.city, response.country_name) {
            (Some(city), Some(country)) => Ok(format!("{city}, {country}")),
            (None, Some(country)) => Ok(country),
            _ => Ok("Unknown".to_string()),
        }
    }
}
