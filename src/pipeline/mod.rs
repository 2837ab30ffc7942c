//! Scan orchestration
//!
//! Runs the staged fan-out: ingest, parallel per-file extraction, per-unit
//! evidence, rule evaluation, the clustering barrier, scoring, and report
//! assembly. The cache wraps extraction, evidence, and similarity by content
//! hash. Stages are separated by explicit barriers; the deadline and the
//! cancellation token are checked at every barrier, and in-flight file work
//! always runs to completion so no partial cache entries are written.

use crate::cache::{self, Cache};
use crate::error::{FailedScan, ScanError};
use crate::evidence::{self, EvidenceConfig};
use crate::extract::{self, FileAnalysis};
use crate::history::History;
use crate::ingest;
use crate::models::{
    unit_id, Evidence, RepoCoordinates, ScanKind, ScanReport, ScanWarning, UnitScores, WarningKind,
};
use crate::report::{self, ReportInputs};
use crate::rules::{self, Ruleset};
use crate::scoring::{self, ScoreConfig};
use crate::similarity::{self, ShingledUnit};
use chrono::{TimeZone, Utc};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default hard deadlines per scan kind.
const DEADLINE_FULL: Duration = Duration::from_secs(20 * 60);
const DEADLINE_INCREMENTAL: Duration = Duration::from_secs(60);

/// A structured scan request.
#[derive(Debug, Clone)]
pub enum ScanRequest {
    Full {
        root: PathBuf,
        commit: Option<String>,
        branch: Option<String>,
    },
    Incremental {
        root: PathBuf,
        commit: Option<String>,
        branch: Option<String>,
        /// Root-relative changed paths.
        changed_files: Vec<String>,
    },
}

impl ScanRequest {
    pub fn root(&self) -> &PathBuf {
        match self {
            ScanRequest::Full { root, .. } | ScanRequest::Incremental { root, .. } => root,
        }
    }

    pub fn kind(&self) -> ScanKind {
        match self {
            ScanRequest::Full { .. } => ScanKind::Full,
            ScanRequest::Incremental { .. } => ScanKind::Incremental,
        }
    }
}

/// Tunables for a scan run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker pool size. Defaults to the logical CPU count.
    pub workers: usize,
    /// Hard deadline override; `None` uses the per-kind default.
    pub deadline: Option<Duration>,
    pub score: ScoreConfig,
    pub evidence: EvidenceConfig,
    /// Scan-time override for tests; defaults to the wall clock.
    pub now_epoch: Option<i64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            deadline: None,
            score: ScoreConfig::default(),
            evidence: EvidenceConfig::default(),
            now_epoch: None,
        }
    }
}

/// Outcome of a scan: a whole report, or a failed-scan record. Recoverable
/// problems never surface here; they live on the report's warning list.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(Box<ScanReport>),
    Failed(FailedScan),
}

impl ScanOutcome {
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed(report) => Some(report),
            ScanOutcome::Failed(_) => None,
        }
    }
}

/// The scan engine. History and cache are injected capabilities; either may
/// be absent and the scan degrades accordingly.
pub struct Scanner<'a> {
    ruleset: &'a Ruleset,
    history: Option<&'a dyn History>,
    cache: Option<&'a Cache>,
    options: ScanOptions,
    cancel: Arc<AtomicBool>,
}

impl<'a> Scanner<'a> {
    pub fn new(ruleset: &'a Ruleset) -> Self {
        Self {
            ruleset,
            history: None,
            cache: None,
            options: ScanOptions::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_history(mut self, history: &'a dyn History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_cache(mut self, cache: &'a Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Token that cancels the scan at the next barrier.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run a scan. `prior` is the previous report for the same repository,
    /// used for incremental cluster reuse and the runway estimate.
    pub fn run(&self, request: &ScanRequest, prior: Option<&ScanReport>) -> ScanOutcome {
        let scan_id = Uuid::new_v4().to_string();
        match self.run_inner(&scan_id, request, prior) {
            Ok(report) => ScanOutcome::Completed(Box::new(report)),
            Err(err) => {
                warn!("scan {scan_id} failed: {err}");
                ScanOutcome::Failed(FailedScan {
                    scan_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn deadline(&self, kind: ScanKind) -> Duration {
        self.options.deadline.unwrap_or(match kind {
            ScanKind::Full => DEADLINE_FULL,
            ScanKind::Incremental => DEADLINE_INCREMENTAL,
        })
    }

    /// Barrier check: deadline first, then cancellation.
    fn checkpoint(
        &self,
        started: Instant,
        budget: Duration,
        stage: &'static str,
    ) -> Result<(), ScanError> {
        let elapsed = started.elapsed();
        if elapsed >= budget {
            return Err(ScanError::Deadline {
                stage,
                elapsed_secs: elapsed.as_secs(),
            });
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled { stage });
        }
        Ok(())
    }

    fn run_inner(
        &self,
        scan_id: &str,
        request: &ScanRequest,
        prior: Option<&ScanReport>,
    ) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let kind = request.kind();
        let budget = self.deadline(kind);
        let now_epoch = self.options.now_epoch.unwrap_or_else(|| Utc::now().timestamp());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()
            .map_err(|e| ScanError::Internal(format!("worker pool: {e}")))?;

        let mut warnings: Vec<ScanWarning> = Vec::new();

        // Stage 1: ingest.
        self.checkpoint(started, budget, "ingest")?;
        let root = request.root();
        let files = match request {
            ScanRequest::Full { .. } => ingest::enumerate(root)?,
            ScanRequest::Incremental { changed_files, .. } => {
                if !root.is_dir() {
                    return Err(ScanError::Input {
                        path: root.clone(),
                        message: "not a readable directory".into(),
                    });
                }
                // The include filter still applies to caller-supplied paths.
                ingest::select_changed(changed_files)
            }
        };
        info!("scan {scan_id}: {} candidate file(s)", files.len());

        // Stage 2a: parallel per-file extraction, cache-backed.
        self.checkpoint(started, budget, "extract")?;
        let extracted: Vec<FileAnalysis> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|file| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    self.extract_file(root, file)
                })
                .collect()
        });

        let mut units = Vec::new();
        let mut similarity_extra = Vec::new();
        for analysis in extracted {
            warnings.extend(analysis.warnings);
            units.extend(analysis.units);
            similarity_extra.extend(analysis.similarity_only);
        }
        debug!("scan {scan_id}: {} unit(s) extracted", units.len());

        // Stage 2b: per-unit evidence.
        self.checkpoint(started, budget, "evidence")?;
        let commit = self.resolve_commit(request);
        let evidence_results: Vec<(String, Result<Option<Evidence>, ScanError>)> =
            pool.install(|| {
                units
                    .par_iter()
                    .map(|unit| {
                        if self.cancel.load(Ordering::Relaxed) {
                            return (unit.id.clone(), Ok(None));
                        }
                        (unit.id.clone(), self.collect_evidence(unit, &commit, now_epoch))
                    })
                    .collect()
            });

        let mut evidence_map: BTreeMap<String, Option<Evidence>> = BTreeMap::new();
        let mut warned_paths: BTreeSet<String> = BTreeSet::new();
        if self.history.is_none() {
            warnings.push(ScanWarning {
                kind: WarningKind::History,
                path: root.display().to_string(),
                detail: "version-control history unavailable; evidence degraded to zero".into(),
            });
        }
        for (unit_id, result) in evidence_results {
            match result {
                Ok(ev) => {
                    evidence_map.insert(unit_id, ev);
                }
                Err(ScanError::History { path, message }) => {
                    if warned_paths.insert(path.clone()) {
                        warnings.push(ScanWarning {
                            kind: WarningKind::History,
                            path,
                            detail: message,
                        });
                    }
                    evidence_map.insert(unit_id, None);
                }
                Err(other) => return Err(other),
            }
        }

        // Stage 3: structural rule evaluation.
        self.checkpoint(started, budget, "rules")?;
        let mut findings: Vec<_> = units
            .iter()
            .flat_map(|unit| rules::evaluate(unit, self.ruleset))
            .collect();

        // Stage 4: similarity clustering (global barrier).
        self.checkpoint(started, budget, "cluster")?;
        let shingled = self.shingle_all(&units, &similarity_extra);
        let clusters = match request {
            ScanRequest::Full { .. } => similarity::cluster_full(&shingled),
            ScanRequest::Incremental { .. } => {
                let changed: BTreeSet<String> = units
                    .iter()
                    .map(|u| u.id.clone())
                    .chain(similarity_extra.iter().map(|e| e.id.clone()))
                    .collect();
                let fresh = similarity::cluster_incremental(&shingled, &changed);
                match prior {
                    Some(prev) => similarity::merge_clusters(&prev.clusters, fresh, &changed),
                    None => fresh,
                }
            }
        };

        let mut cluster_of: BTreeMap<&str, &str> = BTreeMap::new();
        for cluster in &clusters {
            for member in &cluster.members {
                cluster_of.insert(member.as_str(), cluster.id.as_str());
            }
        }

        // Cross-cutting rules need cluster membership.
        for unit in &units {
            findings.extend(rules::evaluate_cross_cutting(
                unit,
                self.ruleset,
                cluster_of.contains_key(unit.id.as_str()),
            ));
        }
        rules::sort_findings(&mut findings);

        // Stage 5: scoring and aggregates.
        self.checkpoint(started, budget, "score")?;
        let mut scores: BTreeMap<String, UnitScores> = BTreeMap::new();
        for unit in &units {
            let evidence = evidence_map.get(&unit.id).and_then(|e| e.as_ref());
            let mut unit_scores = scoring::score_unit(unit, evidence, &self.options.score);
            unit_scores.redundancy_cluster_id =
                cluster_of.get(unit.id.as_str()).map(|s| s.to_string());
            scores.insert(unit.id.clone(), unit_scores);
        }

        let score_vec: Vec<UnitScores> = scores.values().cloned().collect();
        let aggregates = scoring::aggregates(&score_vec, &clusters);

        let current_shadow: Vec<(String, Option<i64>)> = scores
            .values()
            .filter(|s| s.shadow)
            .map(|s| {
                let created = evidence_map
                    .get(&s.unit_id)
                    .and_then(|e| e.as_ref())
                    .and_then(|e| e.created_at);
                (s.unit_id.clone(), created)
            })
            .collect();
        let prior_shadow: Option<BTreeSet<String>> = prior
            .map(|p| p.summary.shadow_unit_ids.iter().cloned().collect());
        let runway = scoring::runway(
            &current_shadow,
            prior_shadow.as_ref(),
            now_epoch,
            &self.options.score,
        );

        // Stage 6: report assembly, committed whole under a fresh scan id.
        self.checkpoint(started, budget, "report")?;
        if let Some(cache) = self.cache {
            if cache.io_failures() > 0 {
                warnings.push(ScanWarning {
                    kind: WarningKind::Cache,
                    path: String::new(),
                    detail: format!("{} cache I/O failure(s); recomputed from inputs", cache.io_failures()),
                });
            }
        }

        let timestamp = Utc
            .timestamp_opt(now_epoch, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(report::assemble(ReportInputs {
            scan_id: scan_id.to_string(),
            scan_kind: kind,
            repo: self.coordinates(request),
            timestamp,
            units: &units,
            evidence: &evidence_map,
            scores: &scores,
            aggregates,
            runway,
            clusters,
            findings,
            warnings,
        }))
    }

    /// Read, hash, and analyze one file, consulting the cache. A file that
    /// disappeared is dropped silently; a non-UTF-8 file yields a warning.
    fn extract_file(&self, root: &PathBuf, file: &str) -> Option<FileAnalysis> {
        let bytes = std::fs::read(root.join(file)).ok()?;
        let hash = cache::content_hash(&bytes);

        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(_) => {
                return Some(FileAnalysis {
                    warnings: vec![ScanWarning {
                        kind: WarningKind::Ingest,
                        path: file.to_string(),
                        detail: "not valid UTF-8; skipped".into(),
                    }],
                    ..Default::default()
                });
            }
        };

        let key = cache::extract_key(&hash, extract::PARSER_VERSION, extract::EXTRACTOR_VERSION);
        if let Some(cache) = self.cache {
            if let Some(cached) = cache.get_json::<FileAnalysis>(&key) {
                return Some(rebind(cached, file));
            }
        }

        let analysis = extract::analyze_source(&source, file);
        if let Some(cache) = self.cache {
            cache.put_json(&key, &analysis);
        }
        Some(analysis)
    }

    fn collect_evidence(
        &self,
        unit: &crate::models::Unit,
        commit: &str,
        now_epoch: i64,
    ) -> Result<Option<Evidence>, ScanError> {
        let Some(history) = self.history else {
            return Ok(None);
        };

        let key = (!commit.is_empty())
            .then(|| cache::evidence_key(commit, &unit.file_path, unit.span.start, unit.span.end));
        if let (Some(cache), Some(key)) = (self.cache, key.as_ref()) {
            if let Some(cached) = cache.get_json::<Evidence>(key) {
                return Ok(Some(cached));
            }
        }

        let evidence = evidence::collect(history, unit, now_epoch, &self.options.evidence)?;
        if let (Some(cache), Some(key)) = (self.cache, key.as_ref()) {
            cache.put_json(key, &evidence);
        }
        Ok(Some(evidence))
    }

    /// Prepare similarity entries for every unit and stray top-level symbol,
    /// consulting the shingle cache.
    fn shingle_all(
        &self,
        units: &[crate::models::Unit],
        extra: &[extract::SimilarityEntry],
    ) -> Vec<ShingledUnit> {
        let build = |id: &str, name: &str, kind, file_path: &str, source: &str| {
            let key = cache::similarity_key(id, similarity::NORMALIZER_VERSION);
            if let Some(cache) = self.cache {
                if let Some(cached) = cache.get_json::<ShingledUnit>(&key) {
                    return cached;
                }
            }
            let shingled = ShingledUnit::build(id, name, kind, file_path, source);
            if let Some(cache) = self.cache {
                cache.put_json(&key, &shingled);
            }
            shingled
        };

        let mut entries: Vec<ShingledUnit> = units
            .iter()
            .map(|u| build(&u.id, &u.name, u.kind, &u.file_path, &u.source))
            .collect();
        entries.extend(
            extra
                .iter()
                .map(|e| build(&e.id, &e.name, e.kind, &e.file_path, &e.source)),
        );
        entries
    }

    fn resolve_commit(&self, request: &ScanRequest) -> String {
        let explicit = match request {
            ScanRequest::Full { commit, .. } | ScanRequest::Incremental { commit, .. } => {
                commit.clone()
            }
        };
        explicit
            .or_else(|| self.history.and_then(|h| h.head_commit()))
            .unwrap_or_default()
    }

    fn coordinates(&self, request: &ScanRequest) -> RepoCoordinates {
        let (root, branch) = match request {
            ScanRequest::Full { root, branch, .. }
            | ScanRequest::Incremental { root, branch, .. } => (root, branch.clone()),
        };
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        RepoCoordinates {
            name,
            commit: self.resolve_commit(request),
            branch: branch
                .or_else(|| self.history.and_then(|h| h.branch()))
                .unwrap_or_default(),
        }
    }
}

/// Rebind a cached analysis (keyed by content only) to the current path:
/// unit ids and paths are recomputed so identical files at different paths
/// stay distinct.
fn rebind(mut analysis: FileAnalysis, file: &str) -> FileAnalysis {
    for unit in &mut analysis.units {
        if unit.file_path != file {
            unit.file_path = file.to_string();
            unit.id = unit_id(file, &unit.name, unit.span);
        }
    }
    for entry in &mut analysis.similarity_only {
        if entry.file_path != file {
            entry.file_path = file.to_string();
            // The span is not stored on similarity entries; reuse the name
            // and file for a stable identity.
            entry.id = unit_id(file, &entry.name, crate::models::Span::new(0, 0));
        }
    }
    for warning in &mut analysis.warnings {
        warning.path = file.to_string();
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::models::Runway;
    use std::fs;
    use tempfile::tempdir;

    fn write_fixture(root: &std::path::Path) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/app.tsx"),
            r#"
export function App() {
  const [rows, setRows] = useState([]);
  fetch('/api/rows');
  if (rows.length) {
    return <ul>{rows.map(r => <li>{r}</li>)}</ul>;
  }
  return <div>empty</div>;
}
"#,
        )
        .unwrap();
        fs::write(
            root.join("src/format.ts"),
            r#"
export function formatResponse(payload) {
  const rows = payload.items.map(item => item.value);
  if (!rows.length) { return []; }
  return rows.filter(row => row != null);
}
"#,
        )
        .unwrap();
        fs::write(
            root.join("src/transform.ts"),
            r#"
export function transformPayload(payload) {
  const rows = payload.items.map(item => item.value);
  if (!rows.length) { return []; }
  return rows.filter(row => row != null);
}
"#,
        )
        .unwrap();
    }

    fn full_request(root: &std::path::Path) -> ScanRequest {
        ScanRequest::Full {
            root: root.to_path_buf(),
            commit: Some("c0ffee".into()),
            branch: Some("main".into()),
        }
    }

    fn options() -> ScanOptions {
        ScanOptions {
            workers: 2,
            now_epoch: Some(1_750_000_000),
            ..Default::default()
        }
    }

    /// Strip the per-scan identity for comparisons.
    fn normalized(report: &ScanReport) -> ScanReport {
        let mut clone = report.clone();
        clone.scan_id = String::new();
        clone.timestamp = String::new();
        clone
    }

    #[test]
    fn test_full_scan_basics() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let history = MemoryHistory::new();
        let ruleset = Ruleset::embedded();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());

        let outcome = scanner.run(&full_request(dir.path()), None);
        let report = outcome.report().expect("scan should complete");

        assert_eq!(report.summary.total_units, 3);
        assert_eq!(report.repo.commit, "c0ffee");
        assert_eq!(report.summary.refactoring_runway, Runway::InsufficientData);
        // The two near-identical functions cluster.
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].members.len(), 2);
        // The render-time fetch fires REACT-001.
        assert!(report.findings.iter().any(|f| f.rule_id == "REACT-001"));
        // Duplicate-logic findings reference the cluster members.
        assert!(report.findings.iter().any(|f| f.rule_id == "CX-004"));
        assert!(!report.hotspots.is_empty());
    }

    #[test]
    fn test_empty_root_scan_succeeds() {
        let dir = tempdir().unwrap();
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());

        let outcome = scanner.run(&full_request(dir.path()), None);
        let report = outcome.report().expect("empty scan should complete");
        assert_eq!(report.summary.total_units, 0);
        assert_eq!(report.summary.shadow_logic_density, 0.0);
        assert_eq!(report.summary.refactoring_runway, Runway::InsufficientData);
    }

    #[test]
    fn test_missing_history_degrades_with_warning() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let scanner = Scanner::new(&ruleset).with_options(options());

        let outcome = scanner.run(&full_request(dir.path()), None);
        let report = outcome.report().expect("scan should complete");
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::History));
        // Zero evidence everywhere, never fatal.
        assert!(report.hotspots.iter().all(|h| h.review_evidence == 0));
    }

    #[test]
    fn test_deadline_zero_fails_with_stage() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let mut opts = options();
        opts.deadline = Some(Duration::ZERO);
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(opts);

        match scanner.run(&full_request(dir.path()), None) {
            ScanOutcome::Failed(failed) => {
                assert!(failed.reason.contains("deadline"));
                assert!(failed.reason.contains("ingest"));
                assert!(!failed.scan_id.is_empty());
            }
            ScanOutcome::Completed(_) => panic!("expected deadline failure"),
        }
    }

    #[test]
    fn test_cancellation_fails_scan() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());
        scanner.cancel_token().store(true, Ordering::Relaxed);

        match scanner.run(&full_request(dir.path()), None) {
            ScanOutcome::Failed(failed) => assert!(failed.reason.contains("cancelled")),
            ScanOutcome::Completed(_) => panic!("expected cancellation"),
        }
    }

    #[test]
    fn test_cold_and_warm_cache_agree() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let cache_dir = tempdir().unwrap();
        let cache = Cache::open(cache_dir.path()).unwrap();
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_cache(&cache)
            .with_options(options());

        let request = full_request(dir.path());
        let cold = scanner.run(&request, None);
        let warm = scanner.run(&request, None);
        let cold = cold.report().unwrap();
        let warm = warm.report().unwrap();

        assert_ne!(cold.scan_id, warm.scan_id);
        assert_eq!(
            serde_json::to_string(&normalized(cold)).unwrap(),
            serde_json::to_string(&normalized(warm)).unwrap()
        );
    }

    #[test]
    fn test_incremental_all_files_matches_full() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());

        let full = scanner.run(&full_request(dir.path()), None);
        let full = full.report().unwrap();

        let incremental_request = ScanRequest::Incremental {
            root: dir.path().to_path_buf(),
            commit: Some("c0ffee".into()),
            branch: Some("main".into()),
            changed_files: vec![
                "src/app.tsx".into(),
                "src/format.ts".into(),
                "src/transform.ts".into(),
            ],
        };
        let incremental = scanner.run(&incremental_request, None);
        let incremental = incremental.report().unwrap();

        assert_eq!(
            full.summary.shadow_logic_density,
            incremental.summary.shadow_logic_density
        );
        assert_eq!(full.clusters, incremental.clusters);
        assert_eq!(full.summary.total_units, incremental.summary.total_units);
    }

    #[test]
    fn test_incremental_reuses_prior_clusters() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());

        let full = scanner.run(&full_request(dir.path()), None);
        let full = full.report().unwrap();
        assert_eq!(full.clusters.len(), 1);

        // Only the unrelated component changed: the format/transform cluster
        // carries over from the prior report.
        let incremental_request = ScanRequest::Incremental {
            root: dir.path().to_path_buf(),
            commit: Some("c0ffee".into()),
            branch: Some("main".into()),
            changed_files: vec!["src/app.tsx".into()],
        };
        let incremental = scanner.run(&incremental_request, Some(full));
        let incremental = incremental.report().unwrap();
        assert_eq!(incremental.clusters, full.clusters);
    }

    #[test]
    fn test_runway_with_prior_report() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path());
        let ruleset = Ruleset::embedded();
        let history = MemoryHistory::new();
        let scanner = Scanner::new(&ruleset)
            .with_history(&history)
            .with_options(options());

        let request = full_request(dir.path());
        let first = scanner.run(&request, None);
        let first = first.report().unwrap();
        assert_eq!(first.summary.refactoring_runway, Runway::InsufficientData);

        let second = scanner.run(&request, Some(first));
        let second = second.report().unwrap();
        assert!(matches!(
            second.summary.refactoring_runway,
            Runway::Months(_)
        ));
    }
}
