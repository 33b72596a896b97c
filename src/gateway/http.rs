//! HTTP JSON provider.
//!
//! Upstream quote APIs answer with a JSON array of row objects; this
//! provider turns that into a [`RawTable`] and maps transport problems to
//! [`FetchError::Network`]. Schema checks live in the gateway, not here.

use super::{FetchError, Provider, Query, RawTable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpProvider {
    name: String,
    host: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Host key for rate-limit coordination: strip the scheme, keep
        // everything up to the first path segment.
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or(base_url)
            .to_string();

        Ok(Self {
            name: name.to_string(),
            host,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self, query: &Query) -> Result<RawTable, FetchError> {
        let url = format!("{}/{}", self.base_url, query.endpoint);

        let response = self
            .client
            .get(&url)
            .query(&query.params)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(FetchError::Network(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Network(format!("invalid JSON from {}: {}", url, e)))?;

        let rows = match body {
            serde_json::Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        serde_json::Value::Object(map) => rows.push(map),
                        other => {
                            return Err(FetchError::MalformedRow {
                                row: i,
                                detail: format!("expected object, got {}", other),
                            })
                        }
                    }
                }
                rows
            }
            _ => {
                return Err(FetchError::Network(format!(
                    "expected a JSON array of rows from {}",
                    url
                )))
            }
        };

        Ok(RawTable { rows })
    }
}
