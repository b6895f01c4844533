use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::trace;

use super::Geocoder;
use crate::cache::Coordinates;
use crate::errors::{AppResult, ProviderError};

/// Mapbox v6 forward geocoding, authenticated with an access token.
pub struct MapboxGeocoder {
    http: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

#[derive(Deserialize)]
struct Response {
    features: Option<Vec<Feature>>,
}

#[derive(Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Deserialize)]
struct Properties {
    coordinates: FeatureCoordinates,
}

#[derive(Deserialize)]
struct FeatureCoordinates {
    latitude: f64,
    longitude: f64,
}

impl MapboxGeocoder {
    pub fn new(
        endpoint: impl Into<String>,
        access_token: SecretString,
        user_agent: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            access_token,
        })
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, ProviderError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", address),
                ("access_token", self.access_token.expose_secret()),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        let Some(feature) = parsed.features.and_then(|list| list.into_iter().next()) else {
            trace!(address, "mapbox returned no features");
            return Ok(None);
        };

        let coordinates = feature.properties.coordinates;
        if !coordinates.latitude.is_finite() || !coordinates.longitude.is_finite() {
            return Err(ProviderError::Parse("non-finite coordinates".into()));
        }
        Ok(Some(Coordinates {
            lat: coordinates.latitude,
            lon: coordinates.longitude,
        }))
    }
}
