//! Plain-text reporter for terminal output.

use crate::models::{Runway, ScanReport};
use anyhow::Result;
use std::fmt::Write;

/// Render a human-readable summary of the report.
pub fn render(report: &ScanReport) -> Result<String> {
    let mut out = String::new();

    writeln!(
        out,
        "Shadowscope scan {} ({:?}) on {}@{}",
        report.scan_id,
        report.scan_kind,
        report.repo.name,
        short(&report.repo.commit)
    )?;
    writeln!(out)?;

    let s = &report.summary;
    writeln!(out, "Summary")?;
    writeln!(out, "  units analyzed:        {}", s.total_units)?;
    writeln!(
        out,
        "  shadow logic density:  {:.1}% ({} unit(s))",
        s.shadow_logic_density * 100.0,
        s.shadow_units
    )?;
    writeln!(out, "  avg cognitive load:    {}/100", s.avg_cognitive_load)?;
    writeln!(out, "  redundancy score:      {:.2}", s.redundancy_score)?;
    match s.refactoring_runway {
        Runway::Months(m) => writeln!(out, "  refactoring runway:    {m} month(s)")?,
        Runway::InsufficientData => writeln!(out, "  refactoring runway:    insufficient data")?,
    }

    if !report.hotspots.is_empty() {
        writeln!(out)?;
        writeln!(out, "Hotspots")?;
        for (i, h) in report.hotspots.iter().enumerate() {
            writeln!(
                out,
                "  {}. {}#{} [{}] load {}/100, evidence {}/100{}",
                i + 1,
                h.path,
                h.symbol,
                h.kind,
                h.cognitive_load,
                h.review_evidence,
                if h.shadow { " SHADOW" } else { "" }
            )?;
            for why in &h.why {
                writeln!(out, "     - {why}")?;
            }
            if let Some(action) = h.actions.first() {
                writeln!(out, "     => {action}")?;
            }
        }
    }

    if !report.clusters.is_empty() {
        writeln!(out)?;
        writeln!(out, "Redundancy clusters")?;
        for c in &report.clusters {
            writeln!(
                out,
                "  {} ({} member(s)) -> {}",
                c.id,
                c.members.len(),
                c.suggestion
            )?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "Warnings")?;
        for w in &report.warnings {
            writeln!(out, "  [{:?}] {}: {}", w.kind, w.path, w.detail)?;
        }
    }

    Ok(out)
}

fn short(commit: &str) -> &str {
    if commit.len() > 12 {
        &commit[..12]
    } else if commit.is_empty() {
        "unknown"
    } else {
        commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    #[test]
    fn test_render_mentions_key_figures() {
        let report = ScanReport {
            scan_id: "scan-9".into(),
            scan_kind: ScanKind::Full,
            repo: RepoCoordinates {
                name: "webapp".into(),
                commit: "abcdef0123456789".into(),
                branch: "main".into(),
            },
            timestamp: "2025-06-01T00:00:00+00:00".into(),
            summary: Summary {
                total_units: 4,
                shadow_units: 1,
                shadow_logic_density: 0.25,
                avg_cognitive_load: 40,
                redundancy_score: 0.25,
                refactoring_runway: Runway::Months(3),
                shadow_unit_ids: vec!["u1".into()],
            },
            hotspots: vec![Hotspot {
                unit_id: "u1".into(),
                path: "src/a.ts".into(),
                symbol: "tangle".into(),
                kind: UnitKind::Function,
                span: Span::new(1, 30),
                cognitive_load: 82,
                review_evidence: 5,
                fragility: 82,
                shadow: true,
                redundancy_cluster_id: None,
                why: vec!["deep nesting (6)".into()],
                actions: vec!["Split the function and use early returns".into()],
            }],
            clusters: vec![],
            findings: vec![],
            warnings: vec![ScanWarning {
                kind: WarningKind::Parse,
                path: "src/broken.ts".into(),
                detail: "malformed syntax at byte 12".into(),
            }],
        };

        let text = render(&report).unwrap();
        assert!(text.contains("25.0%"));
        assert!(text.contains("3 month(s)"));
        assert!(text.contains("src/a.ts#tangle"));
        assert!(text.contains("SHADOW"));
        assert!(text.contains("deep nesting (6)"));
        assert!(text.contains("src/broken.ts"));
        assert!(text.contains("abcdef012345"));
    }
}
