// Hora Fetcher
// POSTs the day's request to the Free Astrology API and hands back raw JSON

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::HoraConfig;
use crate::error::{truncate_body, HoraError, HoraResult};
use crate::http_retry::{send_with_retry, HttpRetryConfig};

/// Hour the request is pinned to; the day's horas don't depend on it.
const REQUEST_HOUR: u32 = 12;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 200;

/// Anything that can produce a day's raw hora response.
#[async_trait]
pub trait HoraSource: Send + Sync {
    /// Fetch the raw (not yet normalized) response for `date`.
    async fn fetch_day(&self, date: NaiveDate) -> HoraResult<Value>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestOptions {
    pub observation_point: String,
    pub ayanamsha: String,
}

/// Location and calculation settings shared by every request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestParams {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: f64,
    pub config: RequestOptions,
}

impl From<&HoraConfig> for RequestParams {
    fn from(config: &HoraConfig) -> Self {
        Self {
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone_offset_hours,
            config: RequestOptions {
                observation_point: config.observation_point.clone(),
                ayanamsha: config.ayanamsha.clone(),
            },
        }
    }
}

/// Request body expected by the `hora-timings` endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoraRequest {
    pub year: i32,
    pub month: u32,
    pub date: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    #[serde(flatten)]
    pub params: RequestParams,
}

impl HoraRequest {
    pub fn new(day: NaiveDate, params: RequestParams) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
            date: day.day(),
            hours: REQUEST_HOUR,
            minutes: 0,
            seconds: 0,
            params,
        }
    }

    pub fn for_day(day: NaiveDate, config: &HoraConfig) -> Self {
        Self::new(day, RequestParams::from(config))
    }
}

/// reqwest-backed source for the live API.
pub struct HttpHoraSource {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    params: RequestParams,
    retry: HttpRetryConfig,
}

impl HttpHoraSource {
    pub fn new(config: &HoraConfig) -> HoraResult<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|k| SecretString::from(k.expose_secret().to_string()))
            .ok_or_else(|| HoraError::Configuration("API key not provided".into()))?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hora-widget/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HoraError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            params: RequestParams::from(config),
            retry: HttpRetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: HttpRetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl HoraSource for HttpHoraSource {
    async fn fetch_day(&self, date: NaiveDate) -> HoraResult<Value> {
        info!("Fetching hora timings for {}", date);

        let request = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .json(&HoraRequest::new(date, self.params.clone()))
            .build()?;

        let response = send_with_retry(&self.client, request, &self.retry).await?;
        let status = response.status();

        if status.is_success() {
            let body: Value = response.json().await?;
            info!("Fetched hora timings for {}", date);
            return Ok(body);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            truncate_body(&body, MAX_ERROR_BODY)
        };
        warn!("Hora API returned {} for {}: {}", status, date, detail);

        match status.as_u16() {
            401 | 403 => Err(HoraError::Authentication(detail)),
            code => Err(HoraError::Transport {
                status: Some(code),
                message: detail,
            }),
        }
    }
}
