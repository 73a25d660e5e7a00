// Hora Widget Configuration Module
// Defaults → optional JSON file → .env / environment overrides

use chrono::FixedOffset;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{HoraError, HoraResult};

pub const APP_DIR: &str = "hora-widget";
pub const DEFAULT_ENDPOINT: &str = "https://json.freeastrologyapi.com/hora-timings";
const CONFIG_FILENAME: &str = "config.json";
const CACHE_FILENAME: &str = "hora_results.json";

/// Minimum effective fetch cadence in seconds.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

// Austin, TX
const DEFAULT_LATITUDE: f64 = 30.2672;
const DEFAULT_LONGITUDE: f64 = -97.7431;
const DEFAULT_TIMEZONE_OFFSET_HOURS: f64 = -6.0;

/// Everything the fetcher, cache and scheduler need, passed explicitly.
#[derive(Debug)]
pub struct HoraConfig {
    /// `x-api-key` for the astrology API. `None` only until validated.
    pub api_key: Option<SecretString>,
    pub latitude: f64,
    pub longitude: f64,
    /// Single timezone basis: sent to the API and used by the clock.
    pub timezone_offset_hours: f64,
    pub observation_point: String,
    pub ayanamsha: String,
    pub endpoint: String,
    pub cache_path: PathBuf,
    /// How often the current hora is re-resolved.
    pub tick_interval_secs: u64,
    /// How often the day's windows are re-fetched.
    pub refresh_interval_secs: u64,
}

/// On-disk shape. Every field is optional so partial files are fine.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone_offset_hours: Option<f64>,
    pub observation_point: Option<String>,
    pub ayanamsha: Option<String>,
    pub endpoint: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub tick_interval_secs: Option<u64>,
    pub refresh_interval_secs: Option<u64>,
}

impl Default for HoraConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            timezone_offset_hours: DEFAULT_TIMEZONE_OFFSET_HOURS,
            observation_point: "geocentric".to_string(),
            ayanamsha: "lahiri".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_path: default_cache_path(),
            tick_interval_secs: 60,
            refresh_interval_secs: 6 * 3600,
        }
    }
}

impl HoraConfig {
    /// Resolve and validate the effective configuration for this process.
    pub fn load(explicit_file: Option<&Path>) -> HoraResult<Self> {
        let config = Self::load_unvalidated(explicit_file)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer file, `.env` and environment over the defaults without validating.
    ///
    /// `explicit_file` replaces the default config location. A missing
    /// default file is fine; a missing explicit one is an error.
    pub fn load_unvalidated(explicit_file: Option<&Path>) -> HoraResult<Self> {
        let mut config = Self::default();

        let file = match explicit_file {
            Some(path) => Some(read_config_file(path)?),
            None => match default_config_path() {
                Some(path) if path.exists() => Some(read_config_file(&path)?),
                _ => None,
            },
        };
        if let Some(file) = file {
            config.apply_file(file);
        }

        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(key) = file.api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(v) = file.latitude {
            self.latitude = v;
        }
        if let Some(v) = file.longitude {
            self.longitude = v;
        }
        if let Some(v) = file.timezone_offset_hours {
            self.timezone_offset_hours = v;
        }
        if let Some(v) = file.observation_point {
            self.observation_point = v;
        }
        if let Some(v) = file.ayanamsha {
            self.ayanamsha = v;
        }
        if let Some(v) = file.endpoint {
            self.endpoint = v;
        }
        if let Some(v) = file.cache_path {
            self.cache_path = v;
        }
        if let Some(v) = file.tick_interval_secs {
            self.tick_interval_secs = v;
        }
        if let Some(v) = file.refresh_interval_secs {
            self.refresh_interval_secs = v;
        }
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unset or blank variables are ignored; set but unparsable numbers are
    /// configuration errors.
    pub fn apply_env<F>(&mut self, lookup: F) -> HoraResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("ASTROLOGY_API_KEY") {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(v) = get("LATITUDE") {
            self.latitude = parse_env("LATITUDE", &v)?;
        }
        if let Some(v) = get("LONGITUDE") {
            self.longitude = parse_env("LONGITUDE", &v)?;
        }
        if let Some(v) = get("TIMEZONE") {
            self.timezone_offset_hours = parse_env("TIMEZONE", &v)?;
        }
        if let Some(v) = get("HORA_CACHE_PATH") {
            self.cache_path = PathBuf::from(v);
        }
        if let Some(v) = get("HORA_REFRESH_INTERVAL_SECS") {
            self.refresh_interval_secs = parse_env("HORA_REFRESH_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("HORA_TICK_INTERVAL_SECS") {
            self.tick_interval_secs = parse_env("HORA_TICK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("HORA_ENDPOINT") {
            self.endpoint = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> HoraResult<()> {
        match &self.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => {}
            _ => {
                return Err(HoraError::Configuration(
                    "API key not provided. Set ASTROLOGY_API_KEY or add api_key to the config file."
                        .into(),
                ))
            }
        }
        self.utc_offset()?;
        if self.tick_interval_secs == 0 {
            return Err(HoraError::Configuration(
                "tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.refresh_interval_secs < MIN_REFRESH_INTERVAL_SECS {
            return Err(HoraError::Configuration(format!(
                "refresh_interval_secs {} is below the minimum of {}",
                self.refresh_interval_secs, MIN_REFRESH_INTERVAL_SECS
            )));
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| HoraError::Configuration(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        Ok(())
    }

    /// The configured timezone basis as a chrono offset.
    pub fn utc_offset(&self) -> HoraResult<FixedOffset> {
        let hours = self.timezone_offset_hours;
        if !hours.is_finite() {
            return Err(HoraError::Configuration(format!(
                "timezone offset {} is not a number",
                hours
            )));
        }
        let secs = (hours * 3600.0).round();
        if secs.abs() >= 86_400.0 {
            return Err(HoraError::Configuration(format!(
                "timezone offset {} hours is out of range",
                hours
            )));
        }
        FixedOffset::east_opt(secs as i32).ok_or_else(|| {
            HoraError::Configuration(format!("timezone offset {} hours is out of range", hours))
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Human-readable dump with the API key redacted.
    pub fn describe(&self) -> String {
        let key = match &self.api_key {
            Some(_) => "********",
            None => "(not set)",
        };
        format!(
            "api_key: {}\nlatitude: {}\nlongitude: {}\ntimezone_offset_hours: {}\nobservation_point: {}\nayanamsha: {}\nendpoint: {}\ncache_path: {}\ntick_interval_secs: {}\nrefresh_interval_secs: {}",
            key,
            self.latitude,
            self.longitude,
            self.timezone_offset_hours,
            self.observation_point,
            self.ayanamsha,
            self.endpoint,
            self.cache_path.display(),
            self.tick_interval_secs,
            self.refresh_interval_secs,
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> HoraResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| HoraError::Configuration(format!("{}='{}': {}", key, value, e)))
}

fn read_config_file(path: &Path) -> HoraResult<ConfigFile> {
    let content = fs::read_to_string(path).map_err(|e| {
        HoraError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    let file = serde_json::from_str(&content).map_err(|e| {
        HoraError::Configuration(format!("Failed to parse config {}: {}", path.display(), e))
    })?;
    info!("Config loaded from {}", path.display());
    Ok(file)
}

/// `~/.config/hora-widget/config.json` (platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILENAME))
}

fn default_cache_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR)
        .join(CACHE_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn keyed() -> HoraConfig {
        HoraConfig {
            api_key: Some(SecretString::from("test-key".to_string())),
            ..HoraConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let c = HoraConfig::default();
        assert_eq!(c.latitude, 30.2672);
        assert_eq!(c.longitude, -97.7431);
        assert_eq!(c.timezone_offset_hours, -6.0);
        assert_eq!(c.observation_point, "geocentric");
        assert_eq!(c.ayanamsha, "lahiri");
        assert_eq!(c.tick_interval_secs, 60);
        assert!(c.cache_path.ends_with("hora_results.json"));
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let c = HoraConfig::default();
        assert!(matches!(c.validate(), Err(HoraError::Configuration(_))));

        let blank = HoraConfig {
            api_key: Some(SecretString::from("   ".to_string())),
            ..HoraConfig::default()
        };
        assert!(matches!(blank.validate(), Err(HoraError::Configuration(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut c = HoraConfig::default();
        c.apply_env(env(&[
            ("ASTROLOGY_API_KEY", "abc"),
            ("LATITUDE", "12.97"),
            ("LONGITUDE", "77.59"),
            ("TIMEZONE", "5.5"),
            ("HORA_REFRESH_INTERVAL_SECS", "3600"),
            ("HORA_CACHE_PATH", "/tmp/hora.json"),
            ("LONGITUDE_UNUSED", "x"),
        ]))
        .unwrap();

        assert_eq!(c.api_key.as_ref().map(|k| k.expose_secret().to_string()), Some("abc".into()));
        assert_eq!(c.latitude, 12.97);
        assert_eq!(c.longitude, 77.59);
        assert_eq!(c.timezone_offset_hours, 5.5);
        assert_eq!(c.refresh_interval_secs, 3600);
        assert_eq!(c.cache_path, PathBuf::from("/tmp/hora.json"));
        assert_eq!(c.utc_offset().unwrap().local_minus_utc(), 5 * 3600 + 1800);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut c = keyed();
        c.apply_env(env(&[("LATITUDE", "  ")])).unwrap();
        assert_eq!(c.latitude, 30.2672);
    }

    #[test]
    fn test_bad_env_number() {
        let mut c = HoraConfig::default();
        let err = c.apply_env(env(&[("TIMEZONE", "CST")])).unwrap_err();
        assert!(err.to_string().contains("TIMEZONE"), "{}", err);
    }

    #[test]
    fn test_file_layer() {
        let file: ConfigFile = serde_json::from_str(
            r#"{ "api_key": "from-file", "latitude": 51.5, "refresh_interval_secs": 900 }"#,
        )
        .unwrap();
        let mut c = HoraConfig::default();
        c.apply_file(file);
        assert_eq!(c.latitude, 51.5);
        assert_eq!(c.longitude, -97.7431);
        assert_eq!(c.refresh_interval_secs, 900);
        assert!(c.validate().is_ok());

        // Environment wins over the file
        c.apply_env(env(&[("ASTROLOGY_API_KEY", "from-env")])).unwrap();
        assert_eq!(c.api_key.as_ref().map(|k| k.expose_secret().to_string()), Some("from-env".into()));
    }

    #[test]
    fn test_read_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "timezone_offset_hours": 1.0 }"#).unwrap();
        let file = read_config_file(&path).unwrap();
        assert_eq!(file.timezone_offset_hours, Some(1.0));

        let missing = dir.path().join("nope.json");
        assert!(matches!(read_config_file(&missing), Err(HoraError::Configuration(_))));
    }

    #[test]
    fn test_offset_validation() {
        let mut c = keyed();
        c.timezone_offset_hours = 30.0;
        assert!(matches!(c.validate(), Err(HoraError::Configuration(_))));
        c.timezone_offset_hours = f64::NAN;
        assert!(c.utc_offset().is_err());
        c.timezone_offset_hours = -6.0;
        assert_eq!(c.utc_offset().unwrap().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn test_interval_validation() {
        let mut c = keyed();
        c.refresh_interval_secs = 30;
        assert!(c.validate().is_err());
        c.refresh_interval_secs = 60;
        c.tick_interval_secs = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_bad_endpoint() {
        let mut c = keyed();
        c.endpoint = "not a url".into();
        assert!(matches!(c.validate(), Err(HoraError::Configuration(_))));
    }

    #[test]
    fn test_describe_redacts_key() {
        let c = HoraConfig {
            api_key: Some(SecretString::from("super-secret".to_string())),
            ..HoraConfig::default()
        };
        let text = c.describe();
        assert!(!text.contains("super-secret"));
        assert!(text.contains("api_key: ********"));
    }
}
