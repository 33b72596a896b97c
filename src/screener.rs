//! 🔍 Segment screener: silent-inflow identification.
//!
//! Ranks market segments by net-inflow strength and keeps only those whose
//! price action says "quietly absorbing, not yet breaking out": strong
//! inflow ratio, price change still inside a narrow band.

use crate::config::ScreenerConfig;
use crate::gateway::RawTable;
use crate::types::Segment;
use tracing::warn;

/// Columns the segment fund-flow table must carry.
pub const SEGMENT_COLUMNS: &[&str] =
    &["name", "code", "change_pct", "net_inflow", "inflow_ratio_pct"];

/// Outcome of one screening pass.
#[derive(Debug, Clone)]
pub struct ScreenResult {
    /// Segments that passed, sorted by inflow ratio descending.
    pub segments: Vec<Segment>,
    /// True when the primary band matched nothing and the documented
    /// widened band was applied. Surfaced to the operator, never silent.
    pub widened: bool,
}

/// Parse the raw fund-flow table. Rows with unparseable numerics are
/// dropped individually; the table itself was already schema-validated by
/// the gateway.
pub fn parse_segments(table: &RawTable) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let (Some(name), Some(code)) = (table.str(row, "name"), table.str(row, "code")) else {
            warn!("Skipping segment row {} with missing identity", row);
            continue;
        };
        let (Some(change_pct), Some(net_inflow), Some(inflow_ratio_pct)) = (
            table.f64(row, "change_pct"),
            table.f64(row, "net_inflow"),
            table.f64(row, "inflow_ratio_pct"),
        ) else {
            warn!("Skipping segment row {} ({}) with bad numerics", row, name);
            continue;
        };
        segments.push(Segment {
            name: name.to_string(),
            code: code.to_string(),
            change_pct,
            net_inflow,
            inflow_ratio_pct,
        });
    }
    segments
}

/// Screen segments against the configured band, widening once if nothing
/// passes. The widened pass is a documented operator-visible fallback.
pub fn screen(segments: &[Segment], cfg: &ScreenerConfig) -> ScreenResult {
    let passed = apply_band(segments, cfg, cfg.change_floor, cfg.change_ceiling);
    if !passed.is_empty() {
        return ScreenResult {
            segments: passed,
            widened: false,
        };
    }

    warn!(
        "🔍 No segments in band [{:.1}, {:.1}]; widening once to [{:.1}, {:.1}]",
        cfg.change_floor, cfg.change_ceiling, cfg.widened_change_floor, cfg.widened_change_ceiling
    );
    let widened = apply_band(
        segments,
        cfg,
        cfg.widened_change_floor,
        cfg.widened_change_ceiling,
    );
    ScreenResult {
        segments: widened,
        widened: true,
    }
}

fn apply_band(
    segments: &[Segment],
    cfg: &ScreenerConfig,
    floor: f64,
    ceiling: f64,
) -> Vec<Segment> {
    let mut passed: Vec<Segment> = segments
        .iter()
        .filter(|s| s.inflow_ratio_pct > cfg.inflow_ratio_floor)
        .filter(|s| s.change_pct >= floor && s.change_pct <= ceiling)
        .cloned()
        .collect();

    passed.sort_by(|a, b| {
        b.inflow_ratio_pct
            .partial_cmp(&a.inflow_ratio_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    passed.truncate(cfg.max_segments);
    passed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, inflow_ratio_pct: f64, change_pct: f64) -> Segment {
        Segment {
            name: name.to_string(),
            code: format!("BK{}", name.len()),
            change_pct,
            net_inflow: 1_000_000.0,
            inflow_ratio_pct,
        }
    }

    #[test]
    fn test_scenario_c_band_and_floor() {
        // Ratios [5.0, 2.0, 4.0], changes [1.0, 1.0, 6.0], band [-0.5, 2.0]
        // => only the first segment survives, ranked first.
        let segments = vec![
            segment("alpha", 5.0, 1.0),
            segment("beta", 2.0, 1.0),
            segment("gamma", 4.0, 6.0),
        ];
        let cfg = ScreenerConfig::default();

        let result = screen(&segments, &cfg);
        assert!(!result.widened);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].name, "alpha");
    }

    #[test]
    fn test_ranking_by_inflow_ratio_desc() {
        let segments = vec![
            segment("low", 3.5, 0.5),
            segment("high", 8.0, 1.0),
            segment("mid", 5.0, 1.5),
        ];
        let result = screen(&segments, &ScreenerConfig::default());
        let names: Vec<&str> = result.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_widening_is_flagged() {
        // Change 2.5 is outside [-0.5, 2.0] but inside the widened band
        let segments = vec![segment("edge", 6.0, 2.5)];
        let result = screen(&segments, &ScreenerConfig::default());
        assert!(result.widened);
        assert_eq!(result.segments.len(), 1);
    }

    #[test]
    fn test_widening_cannot_rescue_weak_inflow() {
        // Inflow ratio below the floor fails both passes
        let segments = vec![segment("weak", 1.0, 0.5)];
        let result = screen(&segments, &ScreenerConfig::default());
        assert!(result.widened);
        assert!(result.segments.is_empty());
    }

    #[test]
    fn test_max_segments_cap() {
        let segments: Vec<Segment> = (0..20)
            .map(|i| segment(&format!("s{}", i), 4.0 + i as f64 * 0.1, 1.0))
            .collect();
        let result = screen(&segments, &ScreenerConfig::default());
        assert_eq!(result.segments.len(), ScreenerConfig::default().max_segments);
    }

    #[test]
    fn test_parse_drops_bad_rows() {
        let rows = serde_json::json!([
            {"name": "ok", "code": "BK1", "change_pct": 1.0, "net_inflow": 5.0e6, "inflow_ratio_pct": 4.2},
            {"name": "bad", "code": "BK2", "change_pct": "??", "net_inflow": 1.0, "inflow_ratio_pct": 1.0}
        ]);
        let table = RawTable {
            rows: rows
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_object().unwrap().clone())
                .collect(),
        };
        let segments = parse_segments(&table);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "ok");
    }
}
