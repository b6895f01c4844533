use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::facilities::sibling_dir;
use crate::storage::write_atomic;

pub const CACHE_FILE_NAME: &str = "geocode_cache.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Address key to coordinates. Only successful lookups are stored; a failed
/// address is represented by the key being absent.
#[derive(Debug, Default)]
pub struct CoordinateCache {
    entries: BTreeMap<String, Coordinates>,
    dirty: bool,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing file yields an empty cache. A file that exists but does not
    /// parse is an error; it is never silently replaced.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no geocode cache yet; starting empty");
                return Ok(Self::new());
            }
            Err(err) => {
                return Err(AppError::Persistence {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        };

        let raw: BTreeMap<String, Option<Coordinates>> = serde_json::from_str(&contents)
            .map_err(|err| AppError::Persistence {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        let mut legacy_nulls = 0;
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| {
                if value.is_none() {
                    legacy_nulls += 1;
                }
                value.map(|coordinates| (key, coordinates))
            })
            .collect::<BTreeMap<_, _>>();
        if legacy_nulls > 0 {
            warn!(
                path = %path.display(),
                legacy_nulls,
                "ignoring null cache entries; they are dropped on next save"
            );
        }

        Ok(Self {
            entries,
            dirty: false,
        })
    }

    pub fn get(&self, key: &str) -> Option<Coordinates> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: impl Into<String>, coordinates: Coordinates) {
        self.entries.insert(key.into(), coordinates);
        self.dirty = true;
    }

    /// Returns whether an entry was removed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&mut self, path: &Path) -> AppResult<()> {
        let serialized = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(path, &serialized)?;
        self.dirty = false;
        Ok(())
    }

    /// Persists only when something changed since load. Returns whether a
    /// write happened.
    pub fn save_if_dirty(&mut self, path: &Path) -> AppResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }
}

pub fn default_cache_path(input: &Path) -> PathBuf {
    sibling_dir(input).join(CACHE_FILE_NAME)
}
