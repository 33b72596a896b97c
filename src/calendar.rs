//! 📅 Trading calendar.
//!
//! Sessions come from an observed index price series, never from date
//! arithmetic - markets close on holidays irregularly and a wall-clock
//! "today" may not be a trading day at all. If no series is obtainable the
//! list is empty and the caller must halt rather than guess.

use crate::gateway::{FetchError, Gateway, Query};
use crate::types::TradingSession;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

/// Columns the index daily series must carry.
pub const INDEX_COLUMNS: &[&str] = &["date", "close"];

pub struct TradingCalendar {
    gateway: Arc<Gateway>,
    index_symbol: String,
}

impl TradingCalendar {
    pub fn new(gateway: Arc<Gateway>, index_symbol: &str) -> Self {
        Self {
            gateway,
            index_symbol: index_symbol.to_string(),
        }
    }

    /// The most recent `n` real trading sessions, most recent first,
    /// strictly decreasing, no duplicates. Empty when the series cannot be
    /// fetched or parsed.
    pub async fn recent_sessions(&self, n: usize) -> Vec<TradingSession> {
        let query = Query::new("index_daily", INDEX_COLUMNS)
            .param("symbol", &self.index_symbol);

        let table = match self.gateway.fetch(&query).await {
            Ok(table) => table,
            Err(FetchError::SchemaDrift { missing }) => {
                warn!(
                    "📅 Index series for {} changed shape (missing {:?})",
                    self.index_symbol, missing
                );
                return Vec::new();
            }
            Err(e) => {
                warn!("📅 Could not fetch index series for {}: {}", self.index_symbol, e);
                return Vec::new();
            }
        };

        let mut dates = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let Some(raw) = table.str(row, "date") else {
                continue;
            };
            match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => dates.push(date),
                Err(_) => warn!("📅 Skipping unparseable session date '{}'", raw),
            }
        }

        dates.sort_unstable();
        dates.dedup();
        dates.reverse();
        dates.truncate(n);

        let sessions: Vec<TradingSession> = dates.into_iter().map(TradingSession).collect();
        if let Some(latest) = sessions.first() {
            info!("📅 Resolved {} sessions, latest {}", sessions.len(), latest);
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{fast_gateway_config, ScriptedProvider};
    use serde_json::json;

    fn calendar_with(rows: serde_json::Value) -> TradingCalendar {
        let provider = Arc::new(ScriptedProvider::new("primary"));
        provider.respond_with("index_daily", rows);
        let gateway = Arc::new(Gateway::new(vec![provider], fast_gateway_config(1)));
        TradingCalendar::new(gateway, "sh000001")
    }

    #[tokio::test]
    async fn test_sessions_descending_no_duplicates() {
        // Out of order and with a duplicate row
        let calendar = calendar_with(json!([
            {"date": "2026-08-26", "close": 3102.4},
            {"date": "2026-08-28", "close": 3110.0},
            {"date": "2026-08-27", "close": 3095.1},
            {"date": "2026-08-28", "close": 3110.0},
            {"date": "2026-08-25", "close": 3088.8}
        ]));

        let sessions = calendar.recent_sessions(3).await;
        assert_eq!(sessions.len(), 3);
        assert!(sessions[0] > sessions[1] && sessions[1] > sessions[2]);
        assert_eq!(
            sessions[0].as_date(),
            NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
        );
        assert_eq!(
            sessions[2].as_date(),
            NaiveDate::from_ymd_opt(2026, 8, 26).unwrap()
        );
    }

    #[tokio::test]
    async fn test_fewer_sessions_than_requested() {
        let calendar = calendar_with(json!([
            {"date": "2026-08-28", "close": 3110.0}
        ]));
        let sessions = calendar.recent_sessions(5).await;
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_unfetchable_series_yields_empty() {
        let provider = Arc::new(ScriptedProvider::new("primary"));
        provider.fail("index_daily");
        let gateway = Arc::new(Gateway::new(vec![provider], fast_gateway_config(1)));
        let calendar = TradingCalendar::new(gateway, "sh000001");

        // Caller must halt on empty; there is no wall-clock fallback
        assert!(calendar.recent_sessions(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_dates_are_skipped() {
        let calendar = calendar_with(json!([
            {"date": "not-a-date", "close": 3110.0},
            {"date": "2026-08-27", "close": 3095.1}
        ]));
        let sessions = calendar.recent_sessions(3).await;
        assert_eq!(sessions.len(), 1);
    }
}
