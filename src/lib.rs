// Silent Flow - detects statistically anomalous silent-accumulation
// patterns: sustained, low-volatility buying pressure disguised inside
// normal-looking trade flow.

pub mod aggregator;
pub mod audit;
pub mod calendar;
pub mod candidates;
pub mod config;
pub mod gateway;
pub mod screener;
pub mod types;
pub mod vault;

pub use config::Config;
pub use gateway::Gateway;
pub use vault::Vault;

/// Global failures that halt the whole run. Everything else is absorbed
/// locally into per-security reason strings.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid knob values, fatal at startup before any fetch.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No trading sessions could be derived from observed price data.
    /// There is no safe fallback to wall-clock dates.
    #[error("no trading sessions could be resolved")]
    CalendarUnresolvable,
}
