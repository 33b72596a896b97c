//! Multi-session aggregator.
//!
//! Runs the tick audit once per security per session across the last N
//! sessions and assembles the final score matrix. Per-security fetches run
//! concurrently (bounded); sessions inside one security go most-recent-first
//! and sequentially. Every per-security failure is absorbed into a reasoned
//! zero score - one bad security never stops the run.

use crate::audit::{audit, TICK_COLUMNS};
use crate::config::{AggregatorConfig, AuditConfig};
use crate::gateway::{FetchError, Gateway, Query, RawTable};
use crate::types::{
    AuditScore, Candidate, ScoreMatrix, SecurityRow, TickRecord, TickSample, TradeSide,
    TradingSession,
};
use chrono::NaiveTime;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation shared between the runner and the aggregator.
/// Checked between securities: the current security finishes its current
/// session, then the run winds down cleanly.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Aggregator {
    gateway: Arc<Gateway>,
    audit_cfg: AuditConfig,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(gateway: Arc<Gateway>, audit_cfg: AuditConfig, cfg: &AggregatorConfig) -> Self {
        Self {
            gateway,
            audit_cfg,
            concurrency: cfg.concurrency.max(1),
        }
    }

    /// Score every candidate over every session and rank the result.
    /// `sessions` must be most-recent-first (as the calendar returns them).
    pub async fn aggregate(
        &self,
        candidates: Vec<Candidate>,
        sessions: &[TradingSession],
        cancel: &CancelFlag,
    ) -> ScoreMatrix {
        let total = candidates.len();
        info!(
            "🧮 Aggregating {} candidates over {} sessions (concurrency {})",
            total,
            sessions.len(),
            self.concurrency
        );

        let rows: Vec<Option<SecurityRow>> = stream::iter(candidates)
            .map(|candidate| self.score_security(candidate, sessions, cancel))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let interrupted = cancel.is_cancelled();
        let mut rows: Vec<SecurityRow> = rows.into_iter().flatten().collect();
        rank_rows(&mut rows);

        if interrupted {
            warn!(
                "🛑 Run cancelled: {}/{} securities audited; matrix will not be persisted",
                rows.len(),
                total
            );
        }

        ScoreMatrix {
            sessions: sessions.to_vec(),
            rows,
            interrupted,
        }
    }

    /// One security's row: sessions sequential, most recent first. Returns
    /// None when cancellation arrived before this security started.
    async fn score_security(
        &self,
        candidate: Candidate,
        sessions: &[TradingSession],
        cancel: &CancelFlag,
    ) -> Option<SecurityRow> {
        if cancel.is_cancelled() {
            debug!("Skipping {} - run cancelled", candidate.code);
            return None;
        }

        let mut scores = Vec::with_capacity(sessions.len());
        for session in sessions {
            scores.push(self.score_session(&candidate, *session).await);
        }
        let total = scores.iter().map(|s| s.score as u32).sum();

        Some(SecurityRow {
            candidate,
            scores,
            total,
        })
    }

    /// Fetch and audit one (security, session) pair. Fetch failures are
    /// absorbed into a reasoned zero score; schema drift keeps its own
    /// reason text so operators can tell it from an outage.
    async fn score_session(&self, candidate: &Candidate, session: TradingSession) -> AuditScore {
        let query = Query::new("tick_history", TICK_COLUMNS)
            .param("symbol", &candidate.code)
            .param("date", &session.to_string());

        let table = match self.gateway.fetch(&query).await {
            Ok(table) => table,
            Err(e @ FetchError::SchemaDrift { .. }) => {
                return AuditScore::rejected(&candidate.code, session, e.to_string());
            }
            Err(e) => {
                return AuditScore::rejected(
                    &candidate.code,
                    session,
                    format!("fetch failed: {}", e),
                );
            }
        };

        let sample = parse_ticks(&table, &candidate.code, session);
        audit(&sample, &self.audit_cfg)
    }
}

/// Parse a tick table into an immutable sample. Rows that cannot be parsed
/// are dropped individually; the audit's minimum-sample check decides
/// whether what remains is scorable.
pub fn parse_ticks(table: &RawTable, code: &str, session: TradingSession) -> TickSample {
    let mut records = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let Some(raw_time) = table.str(row, "time") else {
            continue;
        };
        let Ok(time) = NaiveTime::parse_from_str(raw_time, "%H:%M:%S") else {
            warn!("Skipping tick row {} with bad time '{}'", row, raw_time);
            continue;
        };
        let (Some(price), Some(notional)) =
            (table.f64(row, "price"), table.f64(row, "notional"))
        else {
            continue;
        };
        let side = table
            .str(row, "side")
            .map(TradeSide::parse)
            .unwrap_or(TradeSide::Neutral);

        records.push(TickRecord {
            time,
            price,
            notional,
            side,
        });
    }

    TickSample {
        code: code.to_string(),
        session,
        records,
    }
}

/// Ranking: total desc, then most-recent single-session score desc, then
/// volume ratio desc as the configured liquidity tie-break.
pub(crate) fn rank_rows(rows: &mut [SecurityRow]) {
    rows.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| b.latest_score().cmp(&a.latest_score()))
            .then_with(|| {
                b.candidate
                    .volume_ratio
                    .partial_cmp(&a.candidate.volume_ratio)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}
