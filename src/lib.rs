mod cache;
pub mod cli;
mod config;
mod enrich;
mod errors;
mod facilities;
mod geocode;
mod pipeline;
mod storage;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::{default_cache_path, CoordinateCache, Coordinates, CACHE_FILE_NAME};
pub use config::{AppConfig, ProviderKind, PublicAppConfig};
pub use enrich::{
    tracing_observer, EnrichOptions, Enricher, EnrichmentEvent, EnrichmentObserver,
    EnrichmentStats,
};
pub use errors::{AppError, AppResult, ProviderError};
pub use facilities::{default_output_path, Facility, FacilityDocument};
pub use geocode::{Geocoder, GeocodingService, MapboxGeocoder, NominatimGeocoder};
pub use pipeline::{GeocodeJob, JobSummary};

/// Installs the global `tracing` subscriber. Safe to call more than once.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,icewatch=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
