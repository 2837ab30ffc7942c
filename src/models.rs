//! Core data models for Shadowscope
//!
//! These models are shared across the engine: analyzable units, review
//! evidence, scores, redundancy clusters, rule findings, and the immutable
//! scan report.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Generate a deterministic unit ID from file path, symbol name, and span.
///
/// Stable across runs so cached artifacts and cluster memberships can be
/// joined between scans. The ID is the first 16 hex characters of a SHA-256
/// over `path:name:start:end`.
pub fn unit_id(file_path: &str, name: &str, span: Span) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}:{}", file_path, name, span.start, span.end));
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

/// Hex-encode the first `chars` nibbles of a digest.
pub fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
        if out.len() >= chars {
            out.truncate(chars);
            break;
        }
    }
    out
}

/// Severity levels for rule findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Kind of an analyzable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Component,
    Hook,
    Function,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Component => write!(f, "component"),
            UnitKind::Hook => write!(f, "hook"),
            UnitKind::Function => write!(f, "function"),
        }
    }
}

/// Inclusive 1-based line span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A reactive-effect call site inside a unit (`useEffect` and friends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectCall {
    /// Callee name, one of the fixed effect-hook vocabulary.
    pub name: String,
    /// Declared dependency names from the second-argument array literal.
    /// `None` when the dependency array is missing entirely.
    pub deps: Option<Vec<String>>,
    /// Whether the effect callback returns a teardown function.
    pub has_cleanup: bool,
}

/// An analyzable code region: a component, a hook, or a standalone function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub kind: UnitKind,
    pub span: Span,
    /// Non-blank, non-comment lines.
    pub loc: u32,
    pub nesting_depth: u32,
    pub branch_count: u32,
    pub early_return_count: u32,
    pub try_catch_count: u32,
    /// Boolean operators anywhere in the unit (`&&`, `||`, `??`).
    pub boolean_count: u32,
    /// Maximum nesting of function/arrow expressions inside the body.
    pub callback_depth: u32,
    /// Fraction of identifiers drawn from the ambiguous-name set.
    pub identifier_ambiguity: f64,
    /// Distinct domain-object prefixes among repeated identifiers.
    pub context_switches: u32,
    /// Network/storage calls anywhere in the unit.
    pub side_effect_count: u32,
    /// Network/storage calls lexically outside any reactive-effect callback.
    /// Only counted for components; always 0 otherwise.
    pub render_side_effects: u32,
    /// Reactive-effect call sites with their declared dependencies.
    pub effects: Vec<EffectCall>,
    /// Try without catch, or catch with an empty handler body.
    pub exception_irregularity: bool,
    /// Identifiers reassigned inside the unit (assignment/update targets).
    pub reassigned: Vec<String>,
    /// Full source text of the unit, consumed by similarity and text-level
    /// rule predicates.
    pub source: String,
}

impl Unit {
    /// Any reactive effect returns a teardown function.
    pub fn has_cleanup(&self) -> bool {
        self.effects.iter().any(|e| e.has_cleanup)
    }

    /// Every reactive effect has a cleanup and a declared, stable dep list.
    pub fn effects_all_stable(&self) -> bool {
        !self.effects.is_empty()
            && self.effects.iter().all(|e| {
                e.has_cleanup
                    && e.deps
                        .as_ref()
                        .is_some_and(|deps| deps.iter().all(|d| !self.reassigned.contains(d)))
            })
    }

    /// A dependency list is missing, or a declared dep is reassigned inside
    /// the unit.
    pub fn effect_deps_incomplete(&self) -> bool {
        self.effects.iter().any(|e| match &e.deps {
            None => true,
            Some(deps) => deps.iter().any(|d| self.reassigned.contains(d)),
        })
    }
}

/// Review evidence for a unit, fused from blame and commit signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub distinct_authors: u32,
    pub touched_after_creation: bool,
    pub touch_count_30d: u32,
    pub touch_count_90d: u32,
    /// Matches of the fixed signal vocabulary; one entry per message in
    /// which the signal appeared.
    pub commit_signals: Vec<String>,
    /// Deterministic 0..100 score.
    pub review_evidence: u32,
    /// Earliest commit epoch seconds across the span's blame, when known.
    pub created_at: Option<i64>,
}

/// Scores attached to a unit after the scorer runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitScores {
    pub unit_id: String,
    pub cognitive_load: f64,
    pub review_evidence: u32,
    pub shadow: bool,
    pub fragility: f64,
    pub redundancy_cluster_id: Option<String>,
}

/// A set of units whose pairwise normalized-token Jaccard clears the
/// similarity threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    /// Member unit ids, sorted.
    pub members: Vec<String>,
    /// Synthesized shared-utility name, e.g. `sharedFormatDate`.
    pub suggestion: String,
}

/// A single rule match against a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub unit_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub explanation: String,
    pub action: String,
}

/// Kind of a recoverable scan warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningKind {
    Parse,
    History,
    Cache,
    Ingest,
}

/// A recoverable error that was absorbed into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub kind: WarningKind,
    pub path: String,
    pub detail: String,
}

/// Scan kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Full,
    Incremental,
}

/// Repository coordinates recorded on the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub name: String,
    pub commit: String,
    pub branch: String,
}

/// Refactoring runway: months until shadow inflow overwhelms cleanup, or
/// "insufficient data" on a first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runway {
    Months(u32),
    InsufficientData,
}

impl Serialize for Runway {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Runway::Months(m) => serializer.serialize_u32(*m),
            Runway::InsufficientData => serializer.serialize_str("insufficient data"),
        }
    }
}

impl<'de> Deserialize<'de> for Runway {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Months(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Months(m) => Ok(Runway::Months(m)),
            Raw::Text(s) if s == "insufficient data" => Ok(Runway::InsufficientData),
            Raw::Text(other) => Err(serde::de::Error::custom(format!(
                "unexpected runway value: {other}"
            ))),
        }
    }
}

/// Summary aggregates over a whole scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_units: usize,
    pub shadow_units: usize,
    /// shadow_units / total_units, in [0, 1].
    pub shadow_logic_density: f64,
    /// Arithmetic mean cognitive load, rounded to an integer.
    pub avg_cognitive_load: u32,
    /// 1 - unique_clusters / total_units, singletons counting as their own
    /// cluster.
    pub redundancy_score: f64,
    pub refactoring_runway: Runway,
    /// Ids of units flagged shadow in this scan, sorted. Consumed by the
    /// next incremental scan's runway computation.
    pub shadow_unit_ids: Vec<String>,
}

/// One ranked hotspot entry on the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotspot {
    pub unit_id: String,
    pub path: String,
    pub symbol: String,
    pub kind: UnitKind,
    pub span: Span,
    pub cognitive_load: u32,
    pub review_evidence: u32,
    pub fragility: u32,
    pub shadow: bool,
    pub redundancy_cluster_id: Option<String>,
    pub why: Vec<String>,
    pub actions: Vec<String>,
}

/// Immutable scan snapshot. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub scan_kind: ScanKind,
    pub repo: RepoCoordinates,
    pub timestamp: String,
    pub summary: Summary,
    pub hotspots: Vec<Hotspot>,
    pub clusters: Vec<Cluster>,
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
}

/// Minimal unit for tests; override the fields under test.
#[cfg(test)]
pub(crate) fn test_unit() -> Unit {
    Unit {
        id: unit_id("src/sample.ts", "sample", Span::new(1, 5)),
        file_path: "src/sample.ts".into(),
        name: "sample".into(),
        kind: UnitKind::Function,
        span: Span::new(1, 5),
        loc: 5,
        nesting_depth: 0,
        branch_count: 0,
        early_return_count: 0,
        try_catch_count: 0,
        boolean_count: 0,
        callback_depth: 0,
        identifier_ambiguity: 0.0,
        context_switches: 0,
        side_effect_count: 0,
        render_side_effects: 0,
        effects: vec![],
        exception_irregularity: false,
        reassigned: vec![],
        source: String::new(),
    }
}
