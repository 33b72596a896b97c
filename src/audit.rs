//! 🧮 Tick audit engine: multi-factor silent-accumulation scoring.
//!
//! Pure CPU, no I/O, no suspension. Given one session's trade prints for
//! one security, computes five independent factors and reduces them to an
//! integer score in [0, 5]:
//! - Factor 1: interval regularity - low stdev of inter-trade gaps reads
//!   machine-paced, not human-paced
//! - Factor 2: price stability - low price stdev reads as impact suppression
//! - Factor 3: VWAP deviation - last print anchored to the volume-weighted
//!   center
//! - Factor 4: neutral ratio - heavy side-neutral classification masks
//!   directional intent
//! - Factor 5: fragmentation - few large prints means orders were split
//!   small on purpose
//!
//! Every threshold is configuration. A bad sample degrades to score 0 with
//! a reason string; nothing here ever aborts the batch.

use crate::config::AuditConfig;
use crate::types::{AuditScore, FactorFlags, Intensity, TickRecord, TickSample};
use tracing::debug;

/// Columns the per-session tick table must carry.
pub const TICK_COLUMNS: &[&str] = &["time", "price", "notional", "side"];

/// Audit one (security, session) sample. Never panics, never errors - a
/// sample the statistics cannot handle becomes a reasoned zero score.
pub fn audit(sample: &TickSample, cfg: &AuditConfig) -> AuditScore {
    if sample.records.len() < cfg.min_tick_count {
        return AuditScore::rejected(
            &sample.code,
            sample.session,
            format!("insufficient sample ({})", sample.records.len()),
        );
    }

    // Opening call-auction prints carry no pacing information
    let post_auction: Vec<&TickRecord> = sample
        .records
        .iter()
        .filter(|r| r.time >= cfg.auction_cutoff)
        .collect();
    if post_auction.is_empty() {
        return AuditScore::rejected(&sample.code, sample.session, "no post-auction data");
    }

    // Most recent M records, or everything if fewer exist
    let start = post_auction.len().saturating_sub(cfg.window);
    let window = &post_auction[start..];

    let Some(stats) = WindowStats::compute(window) else {
        return AuditScore::rejected(
            &sample.code,
            sample.session,
            "degenerate sample after auction filter",
        );
    };

    let factors = FactorFlags {
        interval_regular: stats.interval_std < cfg.interval_std_max_secs,
        price_stable: stats.price_std_ratio < cfg.price_std_max_ratio,
        vwap_anchored: stats.vwap_deviation < cfg.vwap_dev_max,
        neutral_heavy: stats.neutral_ratio > cfg.neutral_ratio_min,
        fragmented: stats.big_order_count(cfg) < cfg.big_order_count_max,
    };
    let score = factors.score();

    debug!(
        "🧮 {} {}: score {}/5 (interval_std={:.2}s price_std={:.4} vwap_dev={:.4} neutral={:.0}% big_orders={})",
        sample.code,
        sample.session,
        score,
        stats.interval_std,
        stats.price_std_ratio,
        stats.vwap_deviation,
        stats.neutral_ratio * 100.0,
        stats.big_order_count(cfg)
    );

    AuditScore {
        code: sample.code.clone(),
        session: sample.session,
        score,
        intensity: Intensity::from_score(score),
        factors,
        neutral_ratio: stats.neutral_ratio,
        reason: None,
    }
}

/// Raw window statistics feeding the five factors.
struct WindowStats {
    interval_std: f64,
    price_std_ratio: f64,
    vwap_deviation: f64,
    neutral_ratio: f64,
    mean_notional: f64,
    notionals: Vec<f64>,
}

impl WindowStats {
    /// None when the window is too small or carries no traded value to
    /// anchor the statistics.
    fn compute(window: &[&TickRecord]) -> Option<Self> {
        if window.len() < 3 {
            return None;
        }

        let gaps: Vec<f64> = window
            .windows(2)
            .map(|pair| {
                let delta = pair[1].time.signed_duration_since(pair[0].time);
                delta.num_milliseconds() as f64 / 1000.0
            })
            .collect();
        let interval_std = sample_std(&gaps)?;

        let prices: Vec<f64> = window.iter().map(|r| r.price).collect();
        let mean_price = mean(&prices);
        if mean_price <= 0.0 {
            return None;
        }
        let price_std_ratio = sample_std(&prices)? / mean_price;

        let notionals: Vec<f64> = window.iter().map(|r| r.notional).collect();
        let total_notional: f64 = notionals.iter().sum();
        if total_notional <= 0.0 {
            return None;
        }
        let vwap = window
            .iter()
            .map(|r| r.price * r.notional)
            .sum::<f64>()
            / total_notional;
        if vwap <= 0.0 {
            return None;
        }
        let last_price = window.last()?.price;
        let vwap_deviation = (last_price - vwap).abs() / vwap;

        let neutral = window
            .iter()
            .filter(|r| r.side == crate::types::TradeSide::Neutral)
            .count();
        let neutral_ratio = neutral as f64 / window.len() as f64;

        let mean_notional = total_notional / notionals.len() as f64;

        Some(Self {
            interval_std,
            price_std_ratio,
            vwap_deviation,
            neutral_ratio,
            mean_notional,
            notionals,
        })
    }

    /// Prints above the dynamic large-order threshold. A low count means
    /// the buyer split intent into many small orders.
    fn big_order_count(&self, cfg: &AuditConfig) -> usize {
        let threshold = (cfg.big_order_multiplier * self.mean_notional).max(cfg.big_order_floor);
        self.notionals.iter().filter(|n| **n > threshold).count()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1). None below two values.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
