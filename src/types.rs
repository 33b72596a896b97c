use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A confirmed real trading day, derived from an observed index series.
///
/// Never inferred from the wall clock - markets close on holidays
/// irregularly, so only dates seen in actual price data qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradingSession(pub NaiveDate);

impl TradingSession {
    pub fn as_date(&self) -> NaiveDate {
        self.0
    }
}

impl std::fmt::Display for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// A market segment with aggregate fund-flow statistics for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub code: String,
    /// Price change of the segment index, percent.
    pub change_pct: f64,
    /// Net main-force inflow, in currency units.
    pub net_inflow: f64,
    /// Net inflow as a percent of segment turnover.
    pub inflow_ratio_pct: f64,
}

/// A single security that passed segment-level and liquidity/risk filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_pct: f64,
    /// Volume ratio vs the security's own recent average (liquidity proxy).
    pub volume_ratio: f64,
    /// Name of the segment this candidate was drawn from.
    pub segment: String,
}

/// Aggressor-side classification of one trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    /// Could not be classified as buyer- or seller-initiated.
    Neutral,
}

impl TradeSide {
    /// Lenient parse of upstream side labels. Anything not recognizably a
    /// buy or sell lands in the neutral bucket.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        match s.as_str() {
            "buy" | "b" | "bid" => TradeSide::Buy,
            "sell" | "s" | "ask" => TradeSide::Sell,
            _ => TradeSide::Neutral,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
            TradeSide::Neutral => "neutral",
        }
    }
}

/// One trade execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub time: NaiveTime,
    pub price: f64,
    /// Notional traded value of the print, in currency units.
    pub notional: f64,
    pub side: TradeSide,
}

/// Ordered trade records for one security on one session. Immutable once
/// fetched; the audit engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSample {
    pub code: String,
    pub session: TradingSession,
    pub records: Vec<TickRecord>,
}

/// Intensity label derived from the 0-5 audit score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intensity {
    /// Score >= 4: strong evidence of silent accumulation.
    Extreme,
    /// Score 2-3.
    Moderate,
    /// Score 0-1.
    Weak,
}

impl Intensity {
    pub fn from_score(score: u8) -> Self {
        match score {
            4..=5 => Intensity::Extreme,
            2..=3 => Intensity::Moderate,
            _ => Intensity::Weak,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Intensity::Extreme => "extreme",
            Intensity::Moderate => "moderate",
            Intensity::Weak => "weak",
        }
    }
}

/// Which of the five factors fired, for logging and presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorFlags {
    pub interval_regular: bool,
    pub price_stable: bool,
    pub vwap_anchored: bool,
    pub neutral_heavy: bool,
    pub fragmented: bool,
}

impl FactorFlags {
    pub fn score(&self) -> u8 {
        [
            self.interval_regular,
            self.price_stable,
            self.vwap_anchored,
            self.neutral_heavy,
            self.fragmented,
        ]
        .iter()
        .filter(|f| **f)
        .count() as u8
    }
}

/// Result of auditing one (security, session) pair. Computed once, never
/// mutated; recomputation produces a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditScore {
    pub code: String,
    pub session: TradingSession,
    pub score: u8,
    pub intensity: Intensity,
    pub factors: FactorFlags,
    /// Fraction of window records classified side-neutral.
    pub neutral_ratio: f64,
    /// Populated when the score is 0 for a non-statistical reason
    /// (insufficient sample, fetch failure, degenerate data).
    pub reason: Option<String>,
}

impl AuditScore {
    /// A zero score carrying only a reason, used for rejected samples and
    /// absorbed fetch failures.
    pub fn rejected(code: &str, session: TradingSession, reason: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            session,
            score: 0,
            intensity: Intensity::Weak,
            factors: FactorFlags::default(),
            neutral_ratio: 0.0,
            reason: Some(reason.into()),
        }
    }
}

/// One security's scores across the aggregated sessions, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRow {
    pub candidate: Candidate,
    pub scores: Vec<AuditScore>,
    /// Sum of per-session scores.
    pub total: u32,
}

impl SecurityRow {
    /// Most recent single-session score, used as the first tie-break key.
    pub fn latest_score(&self) -> u8 {
        self.scores.first().map(|s| s.score).unwrap_or(0)
    }
}

/// Final pipeline output: ranked rows over a fixed session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreMatrix {
    /// Sessions covered, most recent first. Every row has one score per
    /// session in this order.
    pub sessions: Vec<TradingSession>,
    /// Rows ranked by total desc, then latest score, then volume ratio.
    pub rows: Vec<SecurityRow>,
    /// True when the run was cancelled between securities; an interrupted
    /// matrix must never be persisted.
    pub interrupted: bool,
}

/// A frozen, labeled copy of pipeline output held by the Vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub label: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub segments: Option<Vec<Segment>>,
    pub matrix: Option<ScoreMatrix>,
}

impl Snapshot {
    pub fn new(label: &str, segments: Option<Vec<Segment>>, matrix: Option<ScoreMatrix>) -> Self {
        Self {
            label: label.to_string(),
            created_at: chrono::Utc::now(),
            segments,
            matrix,
        }
    }

    /// Staleness is purely date-based; the caller decides whether a stale
    /// snapshot forces a refresh.
    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.created_at.date_naive() < today
    }
}
