// Hora Response Cache
// Last successful API response on disk, stamped with `fetched_at`

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{HoraError, HoraResult};

const FETCHED_AT_FIELD: &str = "fetched_at";

/// A cached response as read back from disk.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The raw API response, `fetched_at` included. Feed to `normalize_payload`.
    pub raw: Value,
    pub fetched_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct HoraCache {
    path: PathBuf,
}

impl HoraCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached response.
    ///
    /// A missing file is `Ok(None)`: the caller should fetch instead.
    pub fn load(&self) -> HoraResult<Option<CachedResponse>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No hora cache at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(HoraError::Cache(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let raw: Value = serde_json::from_str(&content).map_err(|e| {
            HoraError::Cache(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        let fetched_at = raw
            .get(FETCHED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());

        info!("Hora cache loaded from {}", self.path.display());
        Ok(Some(CachedResponse { raw, fetched_at }))
    }

    /// Write the raw response plus `fetched_at`.
    ///
    /// Creates the parent directory if needed. Writes to a temp file and
    /// renames it over the target so readers never see a torn file.
    pub fn store(&self, raw: &Value, fetched_at: DateTime<FixedOffset>) -> HoraResult<()> {
        let stamp = Value::String(fetched_at.to_rfc3339());
        let document = match raw {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert(FETCHED_AT_FIELD.to_string(), stamp);
                Value::Object(map)
            }
            other => json!({ "output": other, FETCHED_AT_FIELD: stamp }),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    HoraError::Cache(format!(
                        "Failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| HoraError::Cache(format!("Failed to serialize cache: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(|e| {
            HoraError::Cache(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| HoraError::Cache(format!("Failed to rename cache file: {}", e)))?;

        debug!("Hora cache saved to {}", self.path.display());
        Ok(())
    }
}
