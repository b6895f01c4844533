use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::cache::{default_cache_path, CoordinateCache};
use crate::enrich::{Enricher, EnrichmentStats};
use crate::errors::AppResult;
use crate::facilities::{default_output_path, FacilityDocument};

/// File locations for one geocoding run. Unset paths default to siblings of
/// the input file.
#[derive(Debug, Clone)]
pub struct GeocodeJob {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub cache: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub output_path: PathBuf,
    pub cache_path: PathBuf,
    pub cache_written: bool,
    pub stats: EnrichmentStats,
}

impl GeocodeJob {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            cache: None,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input, Local::now()))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .unwrap_or_else(|| default_cache_path(&self.input))
    }

    /// Load records, load cache, enrich, write records, write cache if it
    /// changed. Stops at the first fatal error.
    pub async fn run(&self, enricher: &Enricher) -> AppResult<JobSummary> {
        let output_path = self.output_path();
        let cache_path = self.cache_path();

        info!(path = %self.input.display(), "loading facilities");
        let mut document = FacilityDocument::load(&self.input)?;

        info!(path = %cache_path.display(), "loading geocode cache");
        let mut cache = CoordinateCache::load(&cache_path)?;
        info!(
            entries = cache.len(),
            provider = enricher.geocoder().label(),
            "geocoding {} facilities",
            document.facility_count()
        );

        let mut facilities = document.take_facilities();
        let stats = enricher.enrich(&mut facilities, &mut cache).await;
        document.restore_facilities(facilities);

        info!(path = %output_path.display(), "writing geocoded facilities");
        document.persist(&output_path)?;

        let cache_written = persist_cache(&mut cache, &cache_path)?;

        Ok(JobSummary {
            output_path,
            cache_path,
            cache_written,
            stats,
        })
    }
}

fn persist_cache(cache: &mut CoordinateCache, path: &Path) -> AppResult<bool> {
    let written = cache.save_if_dirty(path)?;
    if written {
        info!(path = %path.display(), entries = cache.len(), "updated geocode cache");
    } else {
        info!("no new addresses geocoded; cache unchanged");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use super::*;
    use crate::cache::Coordinates;
    use crate::enrich::EnrichOptions;
    use crate::errors::{AppError, ProviderError};
    use crate::geocode::{Geocoder, GeocodingService};

    struct AlwaysFails;

    #[async_trait]
    impl Geocoder for AlwaysFails {
        async fn resolve(&self, _address: &str) -> Result<Option<Coordinates>, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    struct Fixed(Coordinates);

    #[async_trait]
    impl Geocoder for Fixed {
        async fn resolve(&self, _address: &str) -> Result<Option<Coordinates>, ProviderError> {
            Ok(Some(self.0))
        }
    }

    fn enricher(geocoder: Arc<dyn Geocoder>) -> Enricher {
        Enricher::new(
            GeocodingService::from_geocoder(geocoder, "stub"),
            EnrichOptions {
                delay: Duration::ZERO,
                refresh: false,
            },
        )
    }

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("ice_facilities.json");
        fs::write(
            &path,
            serde_json::to_vec(&json!({
                "facilities": [
                    {"Name": "Krome", "Address": "18201 SW 12th St", "City": "Miami", "State": "FL", "Zip": "33194"},
                    {"Name": "Cached", "City": "Eloy", "State": "AZ"},
                    {"Name": "Blank"}
                ],
                "metadata": {"downloaded": "2025-07-04"}
            }))
            .unwrap(),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn writes_output_and_cache_next_to_input() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let job = GeocodeJob::new(&input);

        let summary = job
            .run(&enricher(Arc::new(Fixed(Coordinates { lat: 25.7, lon: -80.4 }))))
            .await
            .unwrap();

        assert!(summary.cache_written);
        assert_eq!(summary.cache_path, dir.path().join("geocode_cache.json"));
        assert_eq!(summary.output_path.parent(), Some(dir.path()));
        let output: Value =
            serde_json::from_str(&fs::read_to_string(&summary.output_path).unwrap()).unwrap();
        assert_eq!(output["metadata"]["downloaded"], "2025-07-04");
        assert_eq!(output["facilities"][0]["latitude"], 25.7);
        assert_eq!(output["facilities"][2]["latitude"], Value::Null);
        assert_eq!(summary.stats.skipped, 1);
    }

    #[tokio::test]
    async fn failing_provider_is_idempotent() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let cache_path = dir.path().join("geocode_cache.json");
        let seeded = "{\"Eloy, AZ\": {\"lat\": 32.75, \"lon\": -111.55}}";
        fs::write(&cache_path, seeded).unwrap();

        let job = GeocodeJob {
            input,
            output: Some(dir.path().join("out.json")),
            cache: None,
        };
        let enricher = enricher(Arc::new(AlwaysFails));

        let first = job.run(&enricher).await.unwrap();
        let first_output = fs::read_to_string(&first.output_path).unwrap();
        let second = job.run(&enricher).await.unwrap();
        let second_output = fs::read_to_string(&second.output_path).unwrap();

        assert!(!first.cache_written);
        assert!(!second.cache_written);
        assert_eq!(first_output, second_output);
        assert_eq!(fs::read_to_string(&cache_path).unwrap(), seeded);
        assert_eq!(second.stats.cache_hits, 1);
        assert_eq!(second.stats.unresolved, 1);
    }

    #[tokio::test]
    async fn corrupt_cache_aborts_before_output() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        fs::write(dir.path().join("geocode_cache.json"), "[1, 2").unwrap();
        let output = dir.path().join("out.json");
        let job = GeocodeJob {
            input,
            output: Some(output.clone()),
            cache: None,
        };

        let err = job.run(&enricher(Arc::new(AlwaysFails))).await.unwrap_err();

        assert!(matches!(err, AppError::Persistence { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn keeps_top_level_layout_of_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("ice_facilities.json");
        fs::write(
            &input,
            r#"{"generated":"x","metadata":null,"facilities":[{"City":"Eloy","State":"AZ"}]}"#,
        )
        .unwrap();
        let job = GeocodeJob {
            input,
            output: Some(dir.path().join("out.json")),
            cache: None,
        };

        let summary = job
            .run(&enricher(Arc::new(Fixed(Coordinates { lat: 32.75, lon: -111.55 }))))
            .await
            .unwrap();

        let output: Value =
            serde_json::from_str(&fs::read_to_string(&summary.output_path).unwrap()).unwrap();
        let keys: Vec<_> = output.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["generated", "metadata", "facilities"]);
        assert_eq!(output["metadata"], Value::Null);
        assert_eq!(output["facilities"][0]["longitude"], -111.55);
    }

    #[tokio::test]
    async fn input_without_facilities_is_written_through() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("ice_facilities.json");
        fs::write(&input, r#"{"metadata":{"a":1}}"#).unwrap();
        let job = GeocodeJob {
            input,
            output: Some(dir.path().join("out.json")),
            cache: None,
        };

        let summary = job.run(&enricher(Arc::new(AlwaysFails))).await.unwrap();

        let output: Value =
            serde_json::from_str(&fs::read_to_string(&summary.output_path).unwrap()).unwrap();
        assert_eq!(output, json!({"metadata": {"a": 1}}));
        assert_eq!(summary.stats.total, 0);
        assert!(!summary.cache_written);
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let dir = tempdir().unwrap();
        let job = GeocodeJob::new(dir.path().join("missing.json"));
        let err = job.run(&enricher(Arc::new(AlwaysFails))).await.unwrap_err();
        assert!(matches!(err, AppError::Input { .. }));
    }
}
