//! Scan report assembly
//!
//! Builds the immutable report snapshot: summary aggregates, the ranked
//! hotspot list with evidence-backed "why" bullets and suggested actions,
//! the cluster list, and the sorted findings.

use crate::models::{
    Cluster, Evidence, Finding, Hotspot, RepoCoordinates, Runway, ScanKind, ScanReport,
    ScanWarning, Summary, Unit, UnitScores,
};
use crate::scoring::Aggregates;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Hotspots shown on a report.
const HOTSPOT_LIMIT: usize = 5;
/// Rule-derived bullets and actions kept per hotspot.
const MAX_RULE_BULLETS: usize = 3;
const MAX_ACTIONS: usize = 5;

/// Everything the assembler needs, computed by the pipeline stages.
pub struct ReportInputs<'a> {
    pub scan_id: String,
    pub scan_kind: ScanKind,
    pub repo: RepoCoordinates,
    pub timestamp: DateTime<Utc>,
    pub units: &'a [Unit],
    pub evidence: &'a BTreeMap<String, Option<Evidence>>,
    pub scores: &'a BTreeMap<String, UnitScores>,
    pub aggregates: Aggregates,
    pub runway: Runway,
    pub clusters: Vec<Cluster>,
    pub findings: Vec<Finding>,
    pub warnings: Vec<ScanWarning>,
}

/// Assemble the report. The result is committed whole and never mutated.
pub fn assemble(inputs: ReportInputs<'_>) -> ScanReport {
    let mut shadow_unit_ids: Vec<String> = inputs
        .scores
        .values()
        .filter(|s| s.shadow)
        .map(|s| s.unit_id.clone())
        .collect();
    shadow_unit_ids.sort();

    let hotspots = build_hotspots(&inputs);

    let summary = Summary {
        total_units: inputs.aggregates.total_units,
        shadow_units: inputs.aggregates.shadow_units,
        shadow_logic_density: inputs.aggregates.shadow_logic_density,
        avg_cognitive_load: inputs.aggregates.avg_cognitive_load,
        redundancy_score: inputs.aggregates.redundancy_score,
        refactoring_runway: inputs.runway,
        shadow_unit_ids,
    };

    ScanReport {
        scan_id: inputs.scan_id,
        scan_kind: inputs.scan_kind,
        repo: inputs.repo,
        timestamp: inputs.timestamp.to_rfc3339(),
        summary,
        hotspots,
        clusters: inputs.clusters,
        findings: inputs.findings,
        warnings: inputs.warnings,
    }
}

/// Top five units by cognitive load that are shadow, padded with the
/// highest-load non-shadow units when fewer than five are shadow.
fn build_hotspots(inputs: &ReportInputs<'_>) -> Vec<Hotspot> {
    let mut ranked: Vec<&Unit> = inputs.units.iter().collect();
    ranked.sort_by(|a, b| {
        let la = load_of(inputs, a);
        let lb = load_of(inputs, b);
        lb.partial_cmp(&la)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut selected: Vec<&Unit> = ranked
        .iter()
        .copied()
        .filter(|u| shadow_of(inputs, u))
        .take(HOTSPOT_LIMIT)
        .collect();
    for unit in &ranked {
        if selected.len() >= HOTSPOT_LIMIT {
            break;
        }
        if !selected.iter().any(|s| s.id == unit.id) {
            selected.push(unit);
        }
    }

    selected
        .into_iter()
        .map(|unit| build_hotspot(inputs, unit))
        .collect()
}

fn load_of(inputs: &ReportInputs<'_>, unit: &Unit) -> f64 {
    inputs
        .scores
        .get(&unit.id)
        .map(|s| s.cognitive_load)
        .unwrap_or(0.0)
}

fn shadow_of(inputs: &ReportInputs<'_>, unit: &Unit) -> bool {
    inputs.scores.get(&unit.id).is_some_and(|s| s.shadow)
}

fn build_hotspot(inputs: &ReportInputs<'_>, unit: &Unit) -> Hotspot {
    let scores = inputs.scores.get(&unit.id);
    let evidence = inputs.evidence.get(&unit.id).and_then(|e| e.as_ref());
    let unit_findings: Vec<&Finding> = inputs
        .findings
        .iter()
        .filter(|f| f.unit_id == unit.id)
        .collect();
    let cluster_id = scores.and_then(|s| s.redundancy_cluster_id.clone());

    Hotspot {
        unit_id: unit.id.clone(),
        path: unit.file_path.clone(),
        symbol: unit.name.clone(),
        kind: unit.kind,
        span: unit.span,
        cognitive_load: scores.map(|s| s.cognitive_load.round() as u32).unwrap_or(0),
        review_evidence: scores.map(|s| s.review_evidence).unwrap_or(0),
        fragility: scores.map(|s| s.fragility.round() as u32).unwrap_or(0),
        shadow: scores.map(|s| s.shadow).unwrap_or(false),
        redundancy_cluster_id: cluster_id.clone(),
        why: build_why(unit, evidence, &unit_findings, cluster_id.as_deref()),
        actions: build_actions(unit, &unit_findings, cluster_id.as_deref()),
    }
}

/// Human-readable reasons a unit landed on the hotspot list.
fn build_why(
    unit: &Unit,
    evidence: Option<&Evidence>,
    findings: &[&Finding],
    cluster_id: Option<&str>,
) -> Vec<String> {
    let mut why = Vec::new();

    if unit.nesting_depth >= 4 {
        why.push(format!("deep nesting ({})", unit.nesting_depth));
    }
    if unit.branch_count >= 8 {
        why.push(format!("high branch count ({})", unit.branch_count));
    }
    if unit.boolean_count >= 4 {
        why.push(format!("boolean complexity ({})", unit.boolean_count));
    }
    if unit.try_catch_count == 0 && unit.loc > 20 {
        why.push("no error handling in a long body".to_string());
    }
    if unit.render_side_effects > 0 {
        why.push(format!("render side-effects ({})", unit.render_side_effects));
    }
    if unit.identifier_ambiguity > 0.3 {
        why.push(format!(
            "ambiguous identifiers ({:.0}%)",
            unit.identifier_ambiguity * 100.0
        ));
    }
    match evidence {
        Some(ev) if ev.distinct_authors <= 1 => {
            let mut touch = format!("low human touch ({} author", ev.distinct_authors);
            if !ev.touched_after_creation {
                touch.push_str(", never revised");
            }
            touch.push(')');
            why.push(touch);
        }
        None => why.push("no accessible history".to_string()),
        _ => {}
    }

    for finding in findings.iter().take(MAX_RULE_BULLETS) {
        why.push(format!("{}: {}", finding.rule_id, finding.explanation));
    }
    if let Some(id) = cluster_id {
        why.push(format!("member of redundancy cluster {id}"));
    }

    why
}

/// Actionable follow-ups: rule actions first, generic fallbacks after.
fn build_actions(unit: &Unit, findings: &[&Finding], cluster_id: Option<&str>) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();
    for finding in findings.iter().take(MAX_RULE_BULLETS) {
        if !actions.contains(&finding.action) {
            actions.push(finding.action.clone());
        }
    }
    if unit.nesting_depth >= 5 && !actions.iter().any(|a| a.contains("early return")) {
        actions.push("Split the function and use early returns".to_string());
    }
    if unit.try_catch_count == 0 && unit.loc > 20 && !actions.iter().any(|a| a.contains("try/catch"))
    {
        actions.push("Add error handling around the risky paths".to_string());
    }
    if cluster_id.is_some() && !actions.iter().any(|a| a.contains("shared")) {
        actions.push("Extract the shared utility named by the cluster".to_string());
    }
    if actions.is_empty() {
        actions.push("Assign an owner and request a review".to_string());
    }
    actions.truncate(MAX_ACTIONS);
    actions
}
