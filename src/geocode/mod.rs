mod mapbox;
mod nominatim;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::cache::Coordinates;
use crate::config::{AppConfig, ProviderKind};
use crate::errors::{AppError, AppResult, ProviderError};

pub use mapbox::MapboxGeocoder;
pub use nominatim::NominatimGeocoder;

/// Forward geocoding of a free-text address. `Ok(None)` means the provider
/// answered but had no match.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, ProviderError>;
}

#[derive(Clone)]
pub struct GeocodingService {
    inner: Arc<dyn Geocoder>,
    label: &'static str,
}

impl GeocodingService {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let provider = config.provider();
        match provider {
            ProviderKind::Mapbox => {
                let token = config.mapbox_access_token.clone().ok_or_else(|| {
                    AppError::Config(
                        "GEOCODER_PROVIDER=mapbox requires MAPBOX_ACCESS_TOKEN".into(),
                    )
                })?;
                info!("MAPBOX_ACCESS_TOKEN found, using Mapbox geocoding");
                let client = MapboxGeocoder::new(
                    config.mapbox_geocode_url.clone(),
                    token,
                    &config.user_agent,
                    config.request_timeout(),
                )?;
                Ok(Self::from_geocoder(Arc::new(client), provider.as_str()))
            }
            ProviderKind::Nominatim => {
                if config.provider_override.is_none() {
                    warn!("no MAPBOX_ACCESS_TOKEN found, falling back to Nominatim");
                }
                let client = NominatimGeocoder::new(
                    config.nominatim_url.clone(),
                    &config.user_agent,
                    config.request_timeout(),
                    Duration::from_millis(config.nominatim_min_interval_ms),
                )?;
                Ok(Self::from_geocoder(Arc::new(client), provider.as_str()))
            }
        }
    }

    pub fn from_geocoder(inner: Arc<dyn Geocoder>, label: &'static str) -> Self {
        Self { inner, label }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub async fn resolve(&self, address: &str) -> Result<Option<Coordinates>, ProviderError> {
        self.inner.resolve(address).await
    }
}

/// Spaces consecutive requests at least `min_interval` apart.
pub(crate) struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

pub(crate) fn parse_coordinate(value: &str, axis: &str) -> Result<f64, ProviderError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProviderError::Parse(format!("invalid {axis}: {value:?}")))
}
