use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

use super::{parse_coordinate, Geocoder, RateLimiter};
use crate::cache::Coordinates;
use crate::errors::{AppResult, ProviderError};

/// OpenStreetMap Nominatim search. The public instance requires an
/// identifying User-Agent and at most one request per second.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
    rate_limiter: RateLimiter,
}

#[derive(Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        min_interval: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            rate_limiter: RateLimiter::new(min_interval),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, ProviderError> {
        self.rate_limiter.wait().await;
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?;

        let results: Vec<SearchResult> = response.json().await?;
        let Some(first) = results.into_iter().next() else {
            trace!(address, "nominatim returned no results");
            return Ok(None);
        };

        Ok(Some(Coordinates {
            lat: parse_coordinate(&first.lat, "lat")?,
            lon: parse_coordinate(&first.lon, "lon")?,
        }))
    }
}
