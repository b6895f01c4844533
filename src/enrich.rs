use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cache::{CoordinateCache, Coordinates};
use crate::facilities::Facility;
use crate::geocode::GeocodingService;

/// Receives one event per processed record, plus cache invalidations.
pub type EnrichmentObserver = Arc<dyn Fn(&EnrichmentEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentEvent {
    /// Record had no usable address parts.
    Skipped { index: usize, total: usize },
    CacheHit {
        index: usize,
        total: usize,
        address: String,
        coordinates: Coordinates,
    },
    Lookup {
        index: usize,
        total: usize,
        address: String,
    },
    Resolved {
        index: usize,
        total: usize,
        address: String,
        coordinates: Coordinates,
    },
    /// `reason` is `None` when the provider answered without a match.
    Unresolved {
        index: usize,
        total: usize,
        address: String,
        reason: Option<String>,
    },
    Invalidated { address: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub total: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    pub provider_calls: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub invalidated: usize,
}

impl EnrichmentStats {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Fixed pause between consecutive provider calls.
    pub delay: Duration,
    /// Ignore cached coordinates and look every address up again.
    pub refresh: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            refresh: false,
        }
    }
}

pub struct Enricher {
    geocoder: GeocodingService,
    options: EnrichOptions,
    observer: Option<EnrichmentObserver>,
}

impl Enricher {
    pub fn new(geocoder: GeocodingService, options: EnrichOptions) -> Self {
        Self {
            geocoder,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: EnrichmentObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn geocoder(&self) -> &GeocodingService {
        &self.geocoder
    }

    /// Attaches `latitude`/`longitude` to every facility in place. Provider
    /// failures degrade the affected record to null coordinates; they never
    /// abort the pass.
    pub async fn enrich(
        &self,
        facilities: &mut [Facility],
        cache: &mut CoordinateCache,
    ) -> EnrichmentStats {
        let total = facilities.len();
        let mut stats = EnrichmentStats::with_total(total);
        let mut called_provider = false;

        for (index, facility) in facilities.iter_mut().enumerate() {
            let address = facility.address_key();
            if address.is_empty() {
                stats.skipped += 1;
                facility.set_coordinates(None);
                self.emit(EnrichmentEvent::Skipped { index, total });
                continue;
            }

            if !self.options.refresh {
                if let Some(coordinates) = cache.get(&address) {
                    stats.cache_hits += 1;
                    facility.set_coordinates(Some(coordinates));
                    self.emit(EnrichmentEvent::CacheHit {
                        index,
                        total,
                        address,
                        coordinates,
                    });
                    continue;
                }
            }

            if called_provider && !self.options.delay.is_zero() {
                sleep(self.options.delay).await;
            }
            called_provider = true;
            stats.provider_calls += 1;
            self.emit(EnrichmentEvent::Lookup {
                index,
                total,
                address: address.clone(),
            });

            let outcome = self.geocoder.resolve(&address).await;
            let resolved = match outcome {
                Ok(Some(coordinates)) => {
                    cache.put(address.clone(), coordinates);
                    stats.resolved += 1;
                    self.emit(EnrichmentEvent::Resolved {
                        index,
                        total,
                        address,
                        coordinates,
                    });
                    Some(coordinates)
                }
                Ok(None) => {
                    self.record_failure(cache, &mut stats, index, total, address, None);
                    None
                }
                Err(err) => {
                    let reason = err.to_string();
                    self.record_failure(cache, &mut stats, index, total, address, Some(reason));
                    None
                }
            };
            facility.set_coordinates(resolved);
        }

        stats
    }

    fn record_failure(
        &self,
        cache: &mut CoordinateCache,
        stats: &mut EnrichmentStats,
        index: usize,
        total: usize,
        address: String,
        reason: Option<String>,
    ) {
        stats.unresolved += 1;
        if cache.invalidate(&address) {
            stats.invalidated += 1;
            self.emit(EnrichmentEvent::Invalidated {
                address: address.clone(),
            });
        }
        self.emit(EnrichmentEvent::Unresolved {
            index,
            total,
            address,
            reason,
        });
    }

    fn emit(&self, event: EnrichmentEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}

/// Observer that reports progress through `tracing`.
pub fn tracing_observer() -> EnrichmentObserver {
    Arc::new(|event: &EnrichmentEvent| match event {
        EnrichmentEvent::Skipped { index, total } => {
            info!("[{}/{}] no address for facility, skipping", index + 1, total);
        }
        EnrichmentEvent::CacheHit {
            index,
            total,
            address,
            coordinates,
        } => {
            info!(
                lat = coordinates.lat,
                lon = coordinates.lon,
                "[{}/{}] cached: {address}",
                index + 1,
                total
            );
        }
        EnrichmentEvent::Lookup {
            index,
            total,
            address,
        } => {
            info!("[{}/{}] geocoding: {address}", index + 1, total);
        }
        EnrichmentEvent::Resolved {
            coordinates,
            address,
            ..
        } => {
            info!(lat = coordinates.lat, lon = coordinates.lon, %address, "resolved");
        }
        EnrichmentEvent::Unresolved {
            address,
            reason: Some(reason),
            ..
        } => {
            warn!(%address, %reason, "geocoding failed");
        }
        EnrichmentEvent::Unresolved {
            address,
            reason: None,
            ..
        } => {
            warn!(%address, "no geocoding match");
        }
        EnrichmentEvent::Invalidated { address } => {
            warn!(%address, "removed stale cache entry");
        }
    })
}
