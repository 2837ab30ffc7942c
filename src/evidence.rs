//! Review-evidence collection
//!
//! Attributes each unit's span to commits and authors through the injected
//! [`History`] capability and fuses the result into a deterministic 0..100
//! review-evidence score. Repositories without accessible history degrade to
//! all-zero evidence with a scan warning; that is never fatal.

use crate::error::ScanError;
use crate::history::History;
use crate::models::{Evidence, Unit};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Fixed commit-signal vocabulary.
pub const SIGNAL_VOCABULARY: &[&str] = &["refactor", "test", "type", "fix", "chore", "feat"];

/// Signals that carry review weight in the score.
const REVIEW_SIGNALS: &[&str] = &["refactor", "test", "type"];

/// Seconds after creation before a touch counts as a revision.
const CREATION_GRACE_SECS: i64 = 24 * 3600;

const DAY_SECS: i64 = 24 * 3600;

/// Evidence window configuration (days ending at scan time).
#[derive(Debug, Clone, Copy)]
pub struct EvidenceConfig {
    pub short_window_days: i64,
    pub long_window_days: i64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            short_window_days: 30,
            long_window_days: 90,
        }
    }
}

static SIGNAL_RE: OnceLock<Regex> = OnceLock::new();

fn signal_re() -> &'static Regex {
    SIGNAL_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(refactor|test|type|fix|chore|feat)\b").expect("static signal regex")
    })
}

/// Normalized author identity: the lowercased e-mail local-part.
fn author_identity(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or(email)
        .trim()
        .to_lowercase()
}

/// Deterministic review-evidence score, clamped to 0..100.
///
/// `external_review` is the reserved PR-review channel; it is pinned to 0
/// until an interface exists.
pub fn review_score(
    distinct_authors: u32,
    touched_after_creation: bool,
    touch_count_90d: u32,
    signals: &BTreeSet<String>,
    external_review: u32,
) -> u32 {
    let mut score = 0u32;
    if distinct_authors >= 2 {
        score += 30;
    }
    if touched_after_creation {
        score += 20;
    }
    if touch_count_90d >= 2 {
        score += 20;
    }
    if REVIEW_SIGNALS.iter().any(|s| signals.contains(*s)) {
        score += 10;
    }
    score += external_review.min(20);
    score.min(100)
}

/// Collect evidence for a single unit's span.
pub fn collect(
    history: &dyn History,
    unit: &Unit,
    now_epoch: i64,
    config: &EvidenceConfig,
) -> Result<Evidence, ScanError> {
    let hunks = history
        .blame(&unit.file_path, unit.span.start, unit.span.end)
        .map_err(|e| ScanError::History {
            path: unit.file_path.clone(),
            message: e.to_string(),
        })?;

    let long_bound = now_epoch - config.long_window_days * DAY_SECS;
    let log = history
        .log(&unit.file_path, Some(long_bound))
        .map_err(|e| ScanError::History {
            path: unit.file_path.clone(),
            message: e.to_string(),
        })?;

    // Span attribution: commits named by the span's blame.
    let span_shas: BTreeSet<&str> = hunks.iter().map(|h| h.sha.as_str()).collect();

    let authors: BTreeSet<String> = hunks
        .iter()
        .map(|h| author_identity(&h.author_email))
        .filter(|a| !a.is_empty())
        .collect();
    let distinct_authors = authors.len() as u32;

    let created_at = hunks.iter().map(|h| h.epoch).min();
    let latest = hunks.iter().map(|h| h.epoch).max();

    let span_log: Vec<_> = log
        .iter()
        .filter(|e| span_shas.contains(e.sha.as_str()))
        .collect();

    let short_bound = now_epoch - config.short_window_days * DAY_SECS;
    let touch_count_30d = span_log.iter().filter(|e| e.epoch >= short_bound).count() as u32;
    let touch_count_90d = span_log.len() as u32;

    // Two authors imply at least two writes; keep the invariant even when
    // timestamps are too coarse to show it.
    let touched_after_creation = distinct_authors >= 2
        || matches!(
            (created_at, latest),
            (Some(t0), Some(t)) if t > t0 + CREATION_GRACE_SECS
        );

    let mut signal_set = BTreeSet::new();
    let mut commit_signals = Vec::new();
    for entry in &span_log {
        let mut per_message = BTreeSet::new();
        for cap in signal_re().find_iter(&entry.message) {
            per_message.insert(cap.as_str().to_lowercase());
        }
        for signal in per_message {
            signal_set.insert(signal.clone());
            commit_signals.push(signal);
        }
    }
    commit_signals.sort();

    let review_evidence =
        review_score(distinct_authors, touched_after_creation, touch_count_90d, &signal_set, 0);

    Ok(Evidence {
        distinct_authors,
        touched_after_creation,
        touch_count_30d,
        touch_count_90d,
        commit_signals,
        review_evidence,
        created_at,
    })
}
