use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::Coordinates;
use crate::errors::{AppError, AppResult};
use crate::storage::write_atomic;

const ADDRESS_FIELDS: [&str; 4] = ["Address", "City", "State", "Zip"];
const LATITUDE_FIELD: &str = "latitude";
const LONGITUDE_FIELD: &str = "longitude";

const FACILITIES_KEY: &str = "facilities";

/// A facilities file held as its raw top-level object, so every key other
/// than the coordinates added to each facility is written back as read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityDocument {
    root: Map<String, Value>,
}

/// One facility row as produced by the scraper. Field names follow the
/// source spreadsheet headers, so the record is kept as an ordered map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facility {
    fields: Map<String, Value>,
}

impl Facility {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Street, city, state and zip joined with `", "`, skipping blanks.
    /// Other fields never influence the key.
    pub fn address_key(&self) -> String {
        ADDRESS_FIELDS
            .iter()
            .filter_map(|name| self.fields.get(*name).and_then(address_part))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn set_coordinates(&mut self, coordinates: Option<Coordinates>) {
        let (lat, lon) = match coordinates {
            Some(c) => (Value::from(c.lat), Value::from(c.lon)),
            None => (Value::Null, Value::Null),
        };
        self.fields.insert(LATITUDE_FIELD.to_string(), lat);
        self.fields.insert(LONGITUDE_FIELD.to_string(), lon);
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        let lat = self.fields.get(LATITUDE_FIELD)?.as_f64()?;
        let lon = self.fields.get(LONGITUDE_FIELD)?.as_f64()?;
        Some(Coordinates { lat, lon })
    }
}

/// Falsy values (blank strings, `null`, `false`, zero) and nested values
/// contribute nothing, which keeps keys stable against existing cache files.
fn address_part(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl FacilityDocument {
    /// The root must be an object. A missing `facilities` key reads as an
    /// empty list; a present one must be an array of objects.
    pub fn load(path: &Path) -> AppResult<Self> {
        let input_error = |reason: String| AppError::Input {
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|err| input_error(err.to_string()))?;
        let root: Value =
            serde_json::from_str(&contents).map_err(|err| input_error(err.to_string()))?;
        let Value::Object(root) = root else {
            return Err(input_error("top-level value is not an object".into()));
        };
        let document = Self { root };
        document.validate().map_err(input_error)?;
        Ok(document)
    }

    fn validate(&self) -> Result<(), String> {
        let Some(facilities) = self.root.get(FACILITIES_KEY) else {
            return Ok(());
        };
        let Value::Array(rows) = facilities else {
            return Err(format!("`{FACILITIES_KEY}` is not an array"));
        };
        match rows.iter().position(|row| !row.is_object()) {
            Some(index) => Err(format!("facility #{} is not an object", index + 1)),
            None => Ok(()),
        }
    }

    pub fn facility_count(&self) -> usize {
        self.root
            .get(FACILITIES_KEY)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Moves the facility rows out, leaving an empty array in their slot so
    /// the key keeps its position. Non-object rows are skipped.
    pub fn take_facilities(&mut self) -> Vec<Facility> {
        let Some(Value::Array(rows)) = self.root.get_mut(FACILITIES_KEY) else {
            return Vec::new();
        };
        std::mem::take(rows)
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(fields) => Some(Facility::from_fields(fields)),
                _ => None,
            })
            .collect()
    }

    /// Puts rows back into the `facilities` slot. A document that had no
    /// such key is left without one.
    pub fn restore_facilities(&mut self, facilities: Vec<Facility>) {
        if let Some(slot) = self.root.get_mut(FACILITIES_KEY) {
            *slot = Value::Array(
                facilities
                    .into_iter()
                    .map(|facility| Value::Object(facility.into_fields()))
                    .collect(),
            );
        }
    }

    pub fn persist(&self, path: &Path) -> AppResult<()> {
        let serialized = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &serialized)
    }
}

/// `facilities_geocoded_<timestamp>.json` next to the input file.
pub fn default_output_path(input: &Path, now: DateTime<Local>) -> PathBuf {
    sibling_dir(input).join(format!(
        "facilities_geocoded_{}.json",
        now.format("%Y%m%d_%H%M%S")
    ))
}

pub(crate) fn sibling_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
