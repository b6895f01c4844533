use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_MAPBOX_GEOCODE_URL: &str = "https://api.mapbox.com/search/geocode/v6/forward";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DELAY_SECS: f64 = 2.0;
const DEFAULT_NOMINATIM_MIN_INTERVAL_MS: u64 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mapbox,
    Nominatim,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mapbox => "mapbox",
            ProviderKind::Nominatim => "nominatim",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mapbox" => Ok(ProviderKind::Mapbox),
            "nominatim" => Ok(ProviderKind::Nominatim),
            _ => Err(AppError::Config(format!("unknown geocoding provider: {value}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub provider_override: Option<ProviderKind>,
    pub mapbox_access_token: Option<SecretString>,
    pub mapbox_geocode_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_secs: f64,
    pub nominatim_min_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub provider: ProviderKind,
    pub mapbox_geocode_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_secs: f64,
    pub nominatim_min_interval_ms: u64,
    pub has_mapbox_token: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_override: None,
            mapbox_access_token: None,
            mapbox_geocode_url: DEFAULT_MAPBOX_GEOCODE_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: default_user_agent(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_delay_secs: DEFAULT_DELAY_SECS,
            nominatim_min_interval_ms: DEFAULT_NOMINATIM_MIN_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        let provider_override = match env::var("GEOCODER_PROVIDER") {
            Ok(value) if !value.trim().is_empty() => Some(ProviderKind::parse(&value)?),
            _ => None,
        };
        Ok(Self {
            provider_override,
            mapbox_access_token: env::var("MAPBOX_ACCESS_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            mapbox_geocode_url: env::var("MAPBOX_GEOCODE_URL")
                .unwrap_or(defaults.mapbox_geocode_url),
            nominatim_url: env::var("NOMINATIM_URL").unwrap_or(defaults.nominatim_url),
            user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            request_timeout_secs: parse_u64("GEOCODER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).max(1),
            request_delay_secs: parse_delay("GEOCODE_DELAY_SECS", DEFAULT_DELAY_SECS),
            nominatim_min_interval_ms: parse_u64(
                "NOMINATIM_MIN_INTERVAL_MS",
                DEFAULT_NOMINATIM_MIN_INTERVAL_MS,
            ),
        })
    }

    /// Provider that will be constructed for this configuration.
    pub fn provider(&self) -> ProviderKind {
        match self.provider_override {
            Some(kind) => kind,
            None if self.mapbox_access_token.is_some() => ProviderKind::Mapbox,
            None => ProviderKind::Nominatim,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Falls back to the default when the configured value is negative or
    /// not finite.
    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_delay_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_DELAY_SECS))
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            provider: self.provider(),
            mapbox_geocode_url: self.mapbox_geocode_url.clone(),
            nominatim_url: self.nominatim_url.clone(),
            user_agent: self.user_agent.clone(),
            request_timeout_secs: self.request_timeout_secs,
            request_delay_secs: self.request_delay_secs,
            nominatim_min_interval_ms: self.nominatim_min_interval_ms,
            has_mapbox_token: self.mapbox_access_token.is_some(),
        }
    }
}

fn default_user_agent() -> String {
    format!("icewatch/{}", env!("CARGO_PKG_VERSION"))
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Non-negative, finite seconds; anything else falls back to `default`.
pub(crate) fn parse_delay(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}
