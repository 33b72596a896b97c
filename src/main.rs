// Silent Flow - full pipeline runner
// Calendar -> segment screen -> candidate filter -> multi-session tick
// audit -> ranked report -> vault snapshot.

use anyhow::Result;
use silent_flow::aggregator::{Aggregator, CancelFlag};
use silent_flow::calendar::TradingCalendar;
use silent_flow::candidates::{filter_candidates, parse_constituents, CONSTITUENT_COLUMNS};
use silent_flow::config::Config;
use silent_flow::gateway::{Gateway, Query};
use silent_flow::screener::{parse_segments, screen, SEGMENT_COLUMNS};
use silent_flow::types::{Candidate, ScoreMatrix, Segment, Snapshot};
use silent_flow::vault::Vault;
use silent_flow::PipelineError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging honors it
    let config = Config::load_or_default()?;
    init_logging(&config);

    info!("🔎 Silent Flow starting...");
    config
        .validate()
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    info!("⚙️  Configuration validated");

    let gateway = Arc::new(Gateway::from_provider_config(
        &config.providers,
        config.gateway.clone(),
    )?);
    info!(
        "🌐 Gateway ready: primary '{}'{}",
        config.providers.primary_name,
        config
            .providers
            .fallback_name
            .as_deref()
            .map(|n| format!(", fallback '{}'", n))
            .unwrap_or_default()
    );

    // Ctrl-C stops the run between securities, never mid-computation
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Ctrl-C received; finishing current security then stopping");
                cancel.cancel();
            }
        });
    }

    // 1. Trading calendar: real sessions from observed price data
    let calendar = TradingCalendar::new(gateway.clone(), &config.calendar.index_symbol);
    let sessions = calendar.recent_sessions(config.calendar.sessions).await;
    if sessions.is_empty() {
        error!("❌ Calendar unresolvable - halting rather than guessing today's date");
        return Err(PipelineError::CalendarUnresolvable.into());
    }

    // 2. Segment screening
    let flow_query = Query::new("segment_flow_rank", SEGMENT_COLUMNS);
    let segments = match gateway.fetch(&flow_query).await {
        Ok(table) => parse_segments(&table),
        Err(e) => {
            error!("❌ Segment fund-flow table unavailable: {}", e);
            return Ok(());
        }
    };
    let screened = screen(&segments, &config.screener);
    if screened.segments.is_empty() {
        info!("🔍 No silently-absorbing segments found today");
        return Ok(());
    }
    if screened.widened {
        warn!("🔍 Results come from the widened price band - treat with care");
    }
    info!("🔍 {} segments passed screening", screened.segments.len());

    // 3. Candidate filtering, deduplicated across segments for this run
    let mut audited: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    for segment in &screened.segments {
        match fetch_constituents(&gateway, segment).await {
            Ok(parsed) => {
                let accepted = filter_candidates(&parsed, &mut audited, &config.candidates);
                info!(
                    "   📋 {} -> {} candidates (inflow {:.1}%)",
                    segment.name,
                    accepted.len(),
                    segment.inflow_ratio_pct
                );
                candidates.extend(accepted);
            }
            Err(e) => {
                // Absorbed: one unreadable segment never stops the run
                warn!("⚠️  Skipping segment '{}': {}", segment.name, e);
            }
        }
    }
    if candidates.is_empty() {
        info!("📋 No candidates survived filtering");
        return Ok(());
    }

    // 4. Multi-session tick audit
    let aggregator = Aggregator::new(
        gateway.clone(),
        config.audit.clone(),
        &config.aggregator,
    );
    let matrix = aggregator.aggregate(candidates, &sessions, &cancel).await;

    log_report(&matrix);

    let stats = gateway.stats();
    info!(
        "🌐 Gateway: {} attempts, {} retries, {} fallbacks, {} schema drifts",
        stats.attempts.load(std::sync::atomic::Ordering::Relaxed),
        stats.retries.load(std::sync::atomic::Ordering::Relaxed),
        stats.fallbacks.load(std::sync::atomic::Ordering::Relaxed),
        stats.schema_drifts.load(std::sync::atomic::Ordering::Relaxed),
    );

    // 5. Freeze the run - but never a half-built matrix
    if matrix.interrupted {
        warn!("🛑 Interrupted run: snapshot skipped");
        return Ok(());
    }
    let vault = Vault::new(&config.vault.path);
    let snapshot = Snapshot::new(
        &config.vault.label,
        Some(screened.segments.clone()),
        Some(matrix),
    );
    vault.save(&snapshot)?;

    info!("✅ Run complete");
    Ok(())
}

async fn fetch_constituents(
    gateway: &Gateway,
    segment: &Segment,
) -> Result<Vec<Candidate>, silent_flow::gateway::FetchError> {
    let query = Query::new("segment_constituents", CONSTITUENT_COLUMNS)
        .param("segment", &segment.code);
    let table = gateway.fetch(&query).await?;
    Ok(parse_constituents(&table, segment))
}

/// Ranked flat report: segment, code, name, neutral %, per-session scores,
/// total. Plain structured logs - presentation is someone else's job.
fn log_report(matrix: &ScoreMatrix) {
    let session_list: Vec<String> = matrix.sessions.iter().map(|s| s.to_string()).collect();
    info!("📊 Audit report - sessions: {}", session_list.join(", "));
    info!("{:-<80}", "");

    for row in &matrix.rows {
        let per_session: Vec<String> = row
            .scores
            .iter()
            .map(|s| match &s.reason {
                Some(reason) => format!("0 ({})", reason),
                None => format!("{} [{}]", s.score, s.intensity.as_str()),
            })
            .collect();
        let neutral_pct = row
            .scores
            .first()
            .map(|s| s.neutral_ratio * 100.0)
            .unwrap_or(0.0);
        info!(
            "  {} {} ({}) | neutral {:.1}% | {} | total {}",
            row.candidate.code,
            row.candidate.name,
            row.candidate.segment,
            neutral_pct,
            per_session.join(" / "),
            row.total
        );
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.monitoring.log_level.clone()));

    if config.monitoring.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
