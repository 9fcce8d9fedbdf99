use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::cache::{ResultCache, SearchRequest};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, SearchError};
use crate::geo::Coordinates;

pub const MAX_RESULTS: usize = 5;
pub const DEFAULT_RADIUS_METERS: u32 = 5000;
pub const DEFAULT_PHOTO_WIDTH: u32 = 400;
const MAX_RETRIES: u32 = 2;

/// A candidate returned by the provider. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub external_id: String,
    pub name: String,
    pub formatted_address: String,
    pub coordinates: Coordinates,
    pub types: Vec<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub open_now: Option<bool>,
    pub photo_references: Vec<String>,
}

/// Provider payload before status classification.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: String,
    pub results: Vec<SearchResult>,
}

#[async_trait]
pub trait PlacesTransport: Send + Sync {
    async fn text_search(&self, request: &SearchRequest) -> Result<ProviderResponse, SearchError>;
}

/// Synchronous "is the device online" signal.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Clone)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(config.search_retry_base_ms),
            attempt_timeout: Duration::from_millis(config.search_timeout_ms),
        }
    }

    /// Delay before retry number `retry` (0-based): base, 2x base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2_u32.pow(retry.min(10))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct PlacesService {
    transport: Arc<dyn PlacesTransport>,
    cache: ResultCache,
    connectivity: Arc<dyn Connectivity>,
    retry: RetryPolicy,
    default_radius: u32,
}

impl PlacesService {
    pub fn new(
        config: &AppConfig,
        cache: ResultCache,
        connectivity: Arc<dyn Connectivity>,
    ) -> AppResult<Self> {
        let transport: Arc<dyn PlacesTransport> = match config.google_places_api_key.clone() {
            Some(key) => Arc::new(HttpPlacesClient::new(
                &config.places_api_base,
                key,
                &config.places_region,
                Duration::from_millis(config.search_timeout_ms),
            )?),
            None => {
                warn!(target: "places_search", "no places api key configured; searches will be denied");
                Arc::new(UnconfiguredTransport)
            }
        };
        Ok(Self {
            transport,
            cache,
            connectivity,
            retry: RetryPolicy::from_config(config),
            default_radius: config.search_radius_meters,
        })
    }

    pub fn from_transport(
        transport: Arc<dyn PlacesTransport>,
        cache: ResultCache,
        connectivity: Arc<dyn Connectivity>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            cache,
            connectivity,
            retry,
            default_radius: DEFAULT_RADIUS_METERS,
        }
    }

    pub fn default_radius(&self) -> u32 {
        self.default_radius
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Up to five candidates for `query` around `anchor`, cache first, retrying transient failures.
    pub async fn search(
        &self,
        query: &str,
        anchor: Coordinates,
        radius_meters: Option<u32>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidRequest);
        }
        let request = SearchRequest::new(
            trimmed,
            anchor,
            radius_meters.unwrap_or(self.default_radius),
        );

        if let Some(results) = self.cache.get(&request) {
            return Ok(results);
        }

        if !self.connectivity.is_online() {
            return Err(SearchError::Offline);
        }

        let mut last_error = SearchError::Unknown;
        for attempt in 0..=self.retry.max_retries {
            match self.attempt(&request).await {
                Ok(results) => {
                    info!(
                        target: "places_search",
                        query = %request.query,
                        attempt = attempt + 1,
                        results = results.len(),
                        "search completed"
                    );
                    self.cache.put(&request, results.clone());
                    return Ok(results);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt < self.retry.max_retries {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            target: "places_search",
                            error = %err,
                            attempt = attempt + 1,
                            "search attempt failed; retrying after {:?}",
                            delay
                        );
                        sleep(delay).await;
                        if !self.connectivity.is_online() {
                            return Err(SearchError::Offline);
                        }
                    }
                    last_error = err;
                }
            }
        }

        warn!(target: "places_search", error = %last_error, "search failed after retries");
        Err(last_error.into_terminal())
    }

    async fn attempt(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        let response = match timeout(self.retry.attempt_timeout, self.transport.text_search(request)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(SearchError::Transport {
                    message: format!("timed out after {:?}", self.retry.attempt_timeout),
                    network: true,
                })
            }
        };
        classify_response(response)
    }
}

fn classify_response(response: ProviderResponse) -> Result<Vec<SearchResult>, SearchError> {
    debug!(target: "places_search", status = %response.status, "provider responded");
    match response.status.as_str() {
        "OK" | "ZERO_RESULTS" => {
            let mut results = response.results;
            results.truncate(MAX_RESULTS);
            Ok(results)
        }
        "OVER_QUERY_LIMIT" => Err(SearchError::QuotaExceeded),
        "REQUEST_DENIED" => Err(SearchError::Denied),
        "INVALID_REQUEST" => Err(SearchError::InvalidRequest),
        other => Err(SearchError::UnknownStatus(other.to_string())),
    }
}

pub fn photo_url(base: &str, reference: &str, max_width: u32, key: Option<&SecretString>) -> String {
    let mut url = format!(
        "{}/photo?maxwidth={max_width}&photoreference={reference}",
        base.trim_end_matches('/')
    );
    if let Some(key) = key {
        url.push_str("&key=");
        url.push_str(key.expose_secret());
    }
    url
}

/// Turns provider photo references into fetchable URLs.
#[derive(Clone)]
pub struct PhotoResolver {
    base: String,
    api_key: Option<SecretString>,
}

impl PhotoResolver {
    pub fn new(base: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base: base.into(),
            api_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.places_api_base.clone(),
            config.google_places_api_key.clone(),
        )
    }

    pub fn url(&self, reference: &str, max_width: u32) -> String {
        photo_url(&self.base, reference, max_width, self.api_key.as_ref())
    }
}

struct UnconfiguredTransport;

#[async_trait]
impl PlacesTransport for UnconfiguredTransport {
    async fn text_search(&self, _request: &SearchRequest) -> Result<ProviderResponse, SearchError> {
        Ok(ProviderResponse {
            status: "REQUEST_DENIED".into(),
            results: Vec::new(),
        })
    }
}

pub struct HttpPlacesClient {
    http: reqwest::Client,
    base: String,
    api_key: SecretString,
    region: String,
}

impl HttpPlacesClient {
    pub fn new(
        base: &str,
        api_key: SecretString,
        region: &str,
        attempt_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            api_key,
            region: region.to_string(),
        })
    }

    fn search_url(&self, request: &SearchRequest) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}/textsearch/json", self.base))
            .map_err(|err| AppError::Config(format!("invalid places api base: {err}")))?;
        url.query_pairs_mut()
            .append_pair("query", &request.query)
            .append_pair(
                "location",
                &format!("{},{}", request.location.lat, request.location.lng),
            )
            .append_pair("radius", &request.radius_meters.to_string())
            .append_pair("key", self.api_key.expose_secret())
            .append_pair("region", &self.region);
        Ok(url)
    }
}

#[async_trait]
impl PlacesTransport for HttpPlacesClient {
    async fn text_search(&self, request: &SearchRequest) -> Result<ProviderResponse, SearchError> {
        #[derive(Deserialize)]
        struct Response {
            status: String,
            #[serde(default)]
            results: Vec<ResponsePlace>,
        }

        #[derive(Deserialize)]
        struct ResponsePlace {
            place_id: String,
            name: String,
            #[serde(default)]
            formatted_address: String,
            geometry: ResponseGeometry,
            #[serde(default)]
            photos: Vec<ResponsePhoto>,
            #[serde(default)]
            types: Vec<String>,
            rating: Option<f64>,
            user_ratings_total: Option<u32>,
            opening_hours: Option<ResponseHours>,
        }

        #[derive(Deserialize)]
        struct ResponseGeometry {
            location: Coordinates,
        }

        #[derive(Deserialize)]
        struct ResponsePhoto {
            photo_reference: String,
        }

        #[derive(Deserialize)]
        struct ResponseHours {
            open_now: Option<bool>,
        }

        let url = self.search_url(request).map_err(|err| SearchError::Transport {
            message: err.to_string(),
            network: false,
        })?;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Transport {
                message: status.as_u16().to_string(),
                network: false,
            });
        }

        let parsed: Response = response.json().await.map_err(|err| SearchError::Transport {
            message: format!("malformed provider response: {err}"),
            network: false,
        })?;

        let results = parsed
            .results
            .into_iter()
            .map(|place| SearchResult {
                external_id: place.place_id,
                name: place.name,
                formatted_address: place.formatted_address,
                coordinates: place.geometry.location,
                types: place.types,
                rating: place.rating,
                user_ratings_total: place.user_ratings_total,
                open_now: place.opening_hours.and_then(|hours| hours.open_now),
                photo_references: place
                    .photos
                    .into_iter()
                    .map(|photo| photo.photo_reference)
                    .collect(),
            })
            .collect();

        Ok(ProviderResponse {
            status: parsed.status,
            results,
        })
    }
}
