//! 🌐 DataSource Gateway
//!
//! Single choke point for all upstream fetches. Every caller gets the same
//! resilience semantics instead of N divergent retry loops:
//! - bounded retries with randomized backoff per provider
//! - strict schema validation (missing columns discard the whole table)
//! - ranked fallback to a secondary provider for the same logical query
//! - per-host jittered request spacing through one shared rate limiter

pub mod http;
pub mod rate_limiter;

use crate::config::{GatewayConfig, ProvidersConfig};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use http::HttpProvider;
pub use rate_limiter::RateLimiter;

/// Errors surfaced by a fetch. Schema drift is deliberately distinct from
/// network failure so operators can tell "source is down" from "source
/// changed shape".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("schema drift: missing columns {missing:?}")]
    SchemaDrift { missing: Vec<String> },

    #[error("malformed row {row}: {detail}")]
    MalformedRow { row: usize, detail: String },

    #[error("all providers exhausted for '{endpoint}'")]
    Exhausted { endpoint: String },
}

/// One logical upstream query with its declared schema requirements.
#[derive(Debug, Clone)]
pub struct Query {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    /// Columns the caller requires; a table missing any of them is
    /// discarded entirely, never trimmed to the valid subset.
    pub required_columns: Vec<String>,
}

impl Query {
    pub fn new(endpoint: &str, required_columns: &[&str]) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: Vec::new(),
            required_columns: required_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// Untyped tabular response from an upstream provider.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Required columns absent from the table. An empty table has no shape
    /// to validate and reports nothing missing; callers treat it as absent
    /// data instead.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        match self.rows.first() {
            Some(first) => required
                .iter()
                .filter(|c| !first.contains_key(c.as_str()))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Numeric cell, accepting both JSON numbers and numeric strings
    /// (upstream quote APIs mix the two freely).
    pub fn f64(&self, row: usize, column: &str) -> Option<f64> {
        match self.rows.get(row)?.get(column)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn str(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_str()
    }
}

/// An upstream data provider for one or more logical endpoints.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Host key used for rate-limit coordination. Requests to the same host
    /// are spaced regardless of which worker issues them.
    fn host(&self) -> &str;

    async fn fetch(&self, query: &Query) -> Result<RawTable, FetchError>;
}

/// Fetch counters for end-of-run reporting.
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub attempts: AtomicU64,
    pub retries: AtomicU64,
    pub fallbacks: AtomicU64,
    pub schema_drifts: AtomicU64,
}

pub struct Gateway {
    providers: Vec<Arc<dyn Provider>>,
    limiter: RateLimiter,
    config: GatewayConfig,
    stats: GatewayStats,
}

impl Gateway {
    pub fn new(providers: Vec<Arc<dyn Provider>>, config: GatewayConfig) -> Self {
        let limiter = RateLimiter::new(
            Duration::from_millis(config.min_spacing_ms),
            Duration::from_millis(config.spacing_jitter_ms),
        );
        Self {
            providers,
            limiter,
            config,
            stats: GatewayStats::default(),
        }
    }

    /// Build the ranked provider list from config: primary first, optional
    /// fallback second.
    pub fn from_provider_config(
        providers: &ProvidersConfig,
        gateway: GatewayConfig,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(providers.request_timeout_secs);
        let mut ranked: Vec<Arc<dyn Provider>> = vec![Arc::new(HttpProvider::new(
            &providers.primary_name,
            &providers.primary_url,
            timeout,
        )?)];
        if let (Some(name), Some(url)) = (&providers.fallback_name, &providers.fallback_url) {
            ranked.push(Arc::new(HttpProvider::new(name, url, timeout)?));
        }
        Ok(Self::new(ranked, gateway))
    }

    /// Fetch through the ranked provider list. Each provider gets up to
    /// `max_retries` attempts with randomized backoff; schema drift skips
    /// straight to the next provider since the shape will not change
    /// between attempts.
    pub async fn fetch(&self, query: &Query) -> Result<RawTable, FetchError> {
        let mut last_error = FetchError::Exhausted {
            endpoint: query.endpoint.clone(),
        };

        for (rank, provider) in self.providers.iter().enumerate() {
            if rank > 0 {
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "🔀 Falling back to provider '{}' for '{}'",
                    provider.name(),
                    query.endpoint
                );
            }

            match self.fetch_from(provider.as_ref(), query).await {
                Ok(table) => return Ok(table),
                Err(e) => {
                    warn!(
                        "Provider '{}' failed for '{}': {}",
                        provider.name(),
                        query.endpoint,
                        e
                    );
                    last_error = e;
                }
            }
        }

        match last_error {
            FetchError::Exhausted { .. } => Err(FetchError::Exhausted {
                endpoint: query.endpoint.clone(),
            }),
            other => Err(other),
        }
    }

    /// Retry loop against a single provider.
    async fn fetch_from(
        &self,
        provider: &dyn Provider,
        query: &Query,
    ) -> Result<RawTable, FetchError> {
        let mut last_error = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=self.config.max_retries {
            self.limiter.acquire(provider.host()).await;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            match provider.fetch(query).await {
                Ok(table) => {
                    let missing = table.missing_columns(&query.required_columns);
                    if !missing.is_empty() {
                        // The table is discarded entirely, never trimmed to
                        // the valid columns.
                        self.stats.schema_drifts.fetch_add(1, Ordering::Relaxed);
                        return Err(FetchError::SchemaDrift { missing });
                    }
                    debug!(
                        "✅ '{}' from '{}': {} rows (attempt {})",
                        query.endpoint,
                        provider.name(),
                        table.len(),
                        attempt
                    );
                    return Ok(table);
                }
                Err(FetchError::SchemaDrift { missing }) => {
                    self.stats.schema_drifts.fetch_add(1, Ordering::Relaxed);
                    return Err(FetchError::SchemaDrift { missing });
                }
                Err(e) => {
                    last_error = e;
                    if attempt < self.config.max_retries {
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = self.backoff_delay();
                        warn!(
                            "Retry {}/{} for '{}' via '{}': {} (waiting {}ms)",
                            attempt,
                            self.config.max_retries,
                            query.endpoint,
                            provider.name(),
                            last_error,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Randomized backoff inside the configured bounds, so synchronized
    /// retry storms from parallel workers never line up.
    fn backoff_delay(&self) -> Duration {
        let min = self.config.backoff_min_ms;
        let max = self.config.backoff_max_ms.max(min);
        let ms = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(ms)
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }
}
