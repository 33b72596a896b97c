use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub gateway: GatewayConfig,
    pub calendar: CalendarConfig,
    pub screener: ScreenerConfig,
    pub candidates: CandidateConfig,
    pub audit: AuditConfig,
    pub aggregator: AggregatorConfig,
    pub vault: VaultConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Preferred quote source, tried first for every query.
    pub primary_name: String,
    pub primary_url: String,
    /// Optional secondary source for the same logical queries.
    pub fallback_name: Option<String>,
    pub fallback_url: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Attempts per provider before falling back.
    pub max_retries: u32,
    /// Randomized backoff bounds between attempts, milliseconds.
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    /// Minimum inter-request spacing per upstream host, milliseconds.
    pub min_spacing_ms: u64,
    /// Extra random spacing added on top, milliseconds.
    pub spacing_jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalendarConfig {
    /// Broad index whose daily series defines real trading days.
    pub index_symbol: String,
    /// Number of recent sessions to aggregate over.
    pub sessions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenerConfig {
    /// Net-inflow-ratio floor, percent.
    pub inflow_ratio_floor: f64,
    /// Price-change band: quietly absorbing, not yet breaking out.
    pub change_floor: f64,
    pub change_ceiling: f64,
    /// Documented one-shot widened band used when zero segments pass.
    pub widened_change_floor: f64,
    pub widened_change_ceiling: f64,
    pub max_segments: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CandidateConfig {
    /// Upper price-change ceiling, percent.
    pub change_ceiling: f64,
    /// Liquidity floor on the volume ratio.
    pub volume_ratio_floor: f64,
    /// Name substrings marking special-treatment / newly-listed /
    /// delisting-risk securities.
    pub risk_markers: Vec<String>,
    pub max_per_segment: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Minimum records for a sample to be scored at all.
    pub min_tick_count: usize,
    /// Audit window: most recent N post-auction records.
    pub window: usize,
    /// Records strictly before this time are opening-auction prints.
    pub auction_cutoff: NaiveTime,
    /// Factor 1: inter-trade gap stdev upper bound, seconds.
    pub interval_std_max_secs: f64,
    /// Factor 2: price stdev / mean price upper bound.
    pub price_std_max_ratio: f64,
    /// Factor 3: |last - vwap| / vwap upper bound.
    pub vwap_dev_max: f64,
    /// Factor 4: neutral-side fraction lower bound.
    pub neutral_ratio_min: f64,
    /// Factor 5: large-order threshold is max(multiplier * mean notional, floor).
    pub big_order_multiplier: f64,
    pub big_order_floor: f64,
    /// Factor 5 fires when fewer than this many records exceed the threshold.
    pub big_order_count_max: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Cross-security fetch concurrency.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    pub path: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    pub fn load_or_default() -> Result<Self> {
        // Try config.toml first, then config.example.toml
        Self::load("config.toml")
            .or_else(|_| Self::load("config.example.toml"))
            .context("Failed to load configuration")
    }

    /// Validate every knob before the first fetch. Invalid configuration is
    /// fatal at startup, never discovered mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.max_retries == 0 {
            anyhow::bail!("gateway.max_retries must be at least 1");
        }
        if self.gateway.backoff_min_ms > self.gateway.backoff_max_ms {
            anyhow::bail!(
                "gateway.backoff_min_ms ({}) exceeds backoff_max_ms ({})",
                self.gateway.backoff_min_ms,
                self.gateway.backoff_max_ms
            );
        }
        if self.calendar.sessions == 0 {
            anyhow::bail!("calendar.sessions must be at least 1");
        }
        if self.screener.change_floor >= self.screener.change_ceiling {
            anyhow::bail!("screener.change_floor must be below change_ceiling");
        }
        if self.screener.widened_change_floor > self.screener.change_floor
            || self.screener.widened_change_ceiling < self.screener.change_ceiling
        {
            anyhow::bail!("screener widened band must contain the primary band");
        }
        if self.audit.min_tick_count < 2 {
            anyhow::bail!("audit.min_tick_count must be at least 2");
        }
        if self.audit.window == 0 {
            anyhow::bail!("audit.window must be at least 1");
        }
        for (name, value) in [
            ("audit.interval_std_max_secs", self.audit.interval_std_max_secs),
            ("audit.price_std_max_ratio", self.audit.price_std_max_ratio),
            ("audit.vwap_dev_max", self.audit.vwap_dev_max),
            ("audit.big_order_multiplier", self.audit.big_order_multiplier),
            ("audit.big_order_floor", self.audit.big_order_floor),
        ] {
            if value <= 0.0 {
                anyhow::bail!("{} must be positive (got {})", name, value);
            }
        }
        if !(0.0..=1.0).contains(&self.audit.neutral_ratio_min) {
            anyhow::bail!(
                "audit.neutral_ratio_min must be within [0, 1] (got {})",
                self.audit.neutral_ratio_min
            );
        }
        if self.aggregator.concurrency == 0 {
            anyhow::bail!("aggregator.concurrency must be at least 1");
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            min_tick_count: 30,
            window: 60,
            auction_cutoff: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            interval_std_max_secs: 2.0,
            price_std_max_ratio: 0.010,
            vwap_dev_max: 0.005,
            neutral_ratio_min: 0.30,
            big_order_multiplier: 5.0,
            big_order_floor: 100_000.0,
            big_order_count_max: 6,
        }
    }
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            inflow_ratio_floor: 3.0,
            change_floor: -0.5,
            change_ceiling: 2.0,
            widened_change_floor: -1.0,
            widened_change_ceiling: 3.0,
            max_segments: 8,
        }
    }
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            change_ceiling: 2.5,
            volume_ratio_floor: 1.1,
            risk_markers: vec!["ST".to_string(), "N".to_string(), "C".to_string()],
            max_per_segment: 10,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_min_ms: 200,
            backoff_max_ms: 1500,
            min_spacing_ms: 1100,
            spacing_jitter_ms: 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            providers: ProvidersConfig {
                primary_name: "eastmarket".to_string(),
                primary_url: "http://localhost:9000".to_string(),
                fallback_name: None,
                fallback_url: None,
                request_timeout_secs: 10,
            },
            gateway: GatewayConfig::default(),
            calendar: CalendarConfig {
                index_symbol: "sh000001".to_string(),
                sessions: 3,
            },
            screener: ScreenerConfig::default(),
            candidates: CandidateConfig::default(),
            audit: AuditConfig::default(),
            aggregator: AggregatorConfig { concurrency: 4 },
            vault: VaultConfig {
                path: "data/vault".to_string(),
                label: "daily".to_string(),
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut cfg = valid_config();
        cfg.gateway.max_retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tiny_min_tick_count_rejected() {
        let mut cfg = valid_config();
        cfg.audit.min_tick_count = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let mut cfg = valid_config();
        cfg.screener.change_floor = 3.0;
        cfg.screener.change_ceiling = -0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_widened_band_must_contain_primary() {
        let mut cfg = valid_config();
        cfg.screener.widened_change_ceiling = 1.0; // narrower than primary
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut cfg = valid_config();
        cfg.audit.vwap_dev_max = -0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_neutral_ratio_bounds() {
        let mut cfg = valid_config();
        cfg.audit.neutral_ratio_min = 1.5;
        assert!(cfg.validate().is_err());
    }
}
