//! Candidate filter: liquidity/risk screen plus run-scoped deduplication.
//!
//! The audited-codes set is owned by the run and passed in explicitly; its
//! lifetime is exactly one full pipeline run. A security appearing in
//! several screened segments is audited only for the first one.

use crate::config::CandidateConfig;
use crate::gateway::RawTable;
use crate::types::{Candidate, Segment};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Columns the segment constituent table must carry.
pub const CONSTITUENT_COLUMNS: &[&str] = &["code", "name", "price", "change_pct", "volume_ratio"];

/// Parse the raw constituent table for one segment.
pub fn parse_constituents(table: &RawTable, segment: &Segment) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let (Some(code), Some(name)) = (table.str(row, "code"), table.str(row, "name")) else {
            warn!("Skipping constituent row {} with missing identity", row);
            continue;
        };
        let (Some(price), Some(change_pct), Some(volume_ratio)) = (
            table.f64(row, "price"),
            table.f64(row, "change_pct"),
            table.f64(row, "volume_ratio"),
        ) else {
            warn!("Skipping constituent row {} ({}) with bad numerics", row, code);
            continue;
        };
        out.push(Candidate {
            code: code.to_string(),
            name: name.to_string(),
            price,
            change_pct,
            volume_ratio,
            segment: segment.name.clone(),
        });
    }
    out
}

/// Filter one segment's constituents.
///
/// Predicate: price change below the ceiling, volume ratio above the
/// liquidity floor, name clear of risk markers, code not yet audited this
/// run. Accepted codes are inserted into `audited` before return, so the
/// same security is never scored twice in one run.
pub fn filter_candidates(
    constituents: &[Candidate],
    audited: &mut HashSet<String>,
    cfg: &CandidateConfig,
) -> Vec<Candidate> {
    let mut accepted = Vec::new();

    for candidate in constituents {
        if candidate.change_pct >= cfg.change_ceiling {
            continue;
        }
        if candidate.volume_ratio <= cfg.volume_ratio_floor {
            continue;
        }
        if cfg
            .risk_markers
            .iter()
            .any(|marker| candidate.name.contains(marker.as_str()))
        {
            debug!("Dropping {} ({}): risk marker in name", candidate.code, candidate.name);
            continue;
        }
        if !audited.insert(candidate.code.clone()) {
            debug!("Dropping {}: already audited this run", candidate.code);
            continue;
        }

        accepted.push(candidate.clone());
        if accepted.len() >= cfg.max_per_segment {
            break;
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, name: &str, change_pct: f64, volume_ratio: f64) -> Candidate {
        Candidate {
            code: code.to_string(),
            name: name.to_string(),
            price: 10.0,
            change_pct,
            volume_ratio,
            segment: "semis".to_string(),
        }
    }

    #[test]
    fn test_basic_predicate() {
        let constituents = vec![
            candidate("600100", "Quiet Corp", 1.0, 1.5),   // passes
            candidate("600200", "Hot Corp", 4.0, 1.5),     // change too high
            candidate("600300", "Thin Corp", 1.0, 0.8),    // volume ratio too low
            candidate("600400", "ST Trouble", 1.0, 1.5),   // risk marker
        ];
        let mut audited = HashSet::new();

        let accepted = filter_candidates(&constituents, &mut audited, &CandidateConfig::default());
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].code, "600100");
        assert!(audited.contains("600100"));
    }

    #[test]
    fn test_second_pass_with_same_set_is_empty() {
        let constituents = vec![
            candidate("600100", "Quiet Corp", 1.0, 1.5),
            candidate("600200", "Calm Corp", 0.5, 2.0),
        ];
        let cfg = CandidateConfig::default();
        let mut audited = HashSet::new();

        let first = filter_candidates(&constituents, &mut audited, &cfg);
        assert_eq!(first.len(), 2);

        // Same segment, same set: everything is already audited
        let second = filter_candidates(&constituents, &mut audited, &cfg);
        assert!(second.is_empty());
    }

    #[test]
    fn test_dedup_across_segments() {
        let mut audited = HashSet::new();
        let cfg = CandidateConfig::default();

        let in_semis = vec![candidate("600100", "Quiet Corp", 1.0, 1.5)];
        let mut in_chips = vec![candidate("600100", "Quiet Corp", 1.0, 1.5)];
        in_chips.push(candidate("600500", "Other Corp", 1.0, 1.5));

        assert_eq!(filter_candidates(&in_semis, &mut audited, &cfg).len(), 1);
        // The overlapping code is skipped in the second segment
        let second = filter_candidates(&in_chips, &mut audited, &cfg);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].code, "600500");
    }

    #[test]
    fn test_risk_markers_are_configurable() {
        let cfg = CandidateConfig {
            risk_markers: vec!["DELIST".to_string()],
            ..CandidateConfig::default()
        };
        let constituents = vec![
            candidate("600100", "ST Formerly Risky", 1.0, 1.5), // ST no longer screened
            candidate("600200", "DELIST Soon", 1.0, 1.5),
        ];
        let mut audited = HashSet::new();

        let accepted = filter_candidates(&constituents, &mut audited, &cfg);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].code, "600100");
    }

    #[test]
    fn test_per_segment_cap() {
        let constituents: Vec<Candidate> = (0..30)
            .map(|i| candidate(&format!("60{:04}", i), "Quiet Corp", 1.0, 1.5))
            .collect();
        let mut audited = HashSet::new();

        let accepted =
            filter_candidates(&constituents, &mut audited, &CandidateConfig::default());
        assert_eq!(accepted.len(), CandidateConfig::default().max_per_segment);
        // Only accepted codes enter the audited set
        assert_eq!(audited.len(), accepted.len());
    }
}
