//! Cognitive-load scoring and scan aggregates
//!
//! The load model is a weighted sum of capped, normalized structural
//! features, followed by reactive-effect adjustments and a clamp to [0, 100].
//! Shadow is the conjunction of high load and low review evidence.

use crate::models::{Cluster, Evidence, Runway, Unit, UnitScores};
use std::collections::BTreeSet;

/// Feature weights. Percentage weights over features normalized to 0..100,
/// so the pre-adjustment maximum is their sum (75).
const W_NESTING: f64 = 15.0;
const W_BRANCH: f64 = 10.0;
const W_BOOLEAN: f64 = 8.0;
const W_CALLBACK: f64 = 12.0;
const W_AMBIGUITY: f64 = 10.0;
const W_CONTEXT: f64 = 5.0;
const W_EXCEPTION: f64 = 8.0;
const W_SIDE_EFFECT: f64 = 7.0;

/// Feature caps for normalization.
const CAP_NESTING: u32 = 8;
const CAP_BRANCH: u32 = 20;
const CAP_BOOLEAN: u32 = 12;
const CAP_CALLBACK: u32 = 6;
const CAP_CONTEXT: u32 = 5;
const CAP_SIDE_EFFECT: u32 = 6;

/// Reactive-effect adjustments, applied after the weighted sum.
const ADJ_UNSTABLE_DEPS: f64 = 15.0;
const ADJ_STABLE_EFFECTS: f64 = -5.0;
const ADJ_RENDER_SIDE_EFFECT: f64 = 20.0;

/// Fragility bump when history was unavailable for the unit.
const FRAGILITY_NO_EVIDENCE_BUMP: f64 = 10.0;

const DAY_SECS: i64 = 24 * 3600;

/// Shadow thresholds. Configurable but defaulted.
#[derive(Debug, Clone, Copy)]
pub struct ScoreConfig {
    pub shadow_evidence_threshold: u32,
    pub shadow_load_threshold: f64,
    /// Window for "recently created" shadow units in the runway model.
    pub runway_window_days: i64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            shadow_evidence_threshold: 30,
            shadow_load_threshold: 70.0,
            runway_window_days: 30,
        }
    }
}

fn capped(value: u32, cap: u32) -> f64 {
    f64::from(value.min(cap)) / f64::from(cap) * 100.0
}

/// Cognitive load in [0, 100]. Monotone nondecreasing in every feature.
pub fn cognitive_load(unit: &Unit) -> f64 {
    let nesting = capped(unit.nesting_depth, CAP_NESTING);
    let branches = capped(unit.branch_count, CAP_BRANCH);
    let booleans = capped(unit.boolean_count, CAP_BOOLEAN);
    let callbacks = capped(unit.callback_depth, CAP_CALLBACK);
    let ambiguity = (unit.identifier_ambiguity.clamp(0.0, 1.0)) * 100.0;
    let context = capped(unit.context_switches, CAP_CONTEXT);
    let exception = if unit.exception_irregularity { 100.0 } else { 0.0 };
    let side_effects = capped(unit.side_effect_count, CAP_SIDE_EFFECT);

    let weighted = (W_NESTING * nesting
        + W_BRANCH * branches
        + W_BOOLEAN * booleans
        + W_CALLBACK * callbacks
        + W_AMBIGUITY * ambiguity
        + W_CONTEXT * context
        + W_EXCEPTION * exception
        + W_SIDE_EFFECT * side_effects)
        / 100.0;

    let mut adjusted = weighted;
    if unit.effect_deps_incomplete() {
        adjusted += ADJ_UNSTABLE_DEPS;
    }
    if unit.effects_all_stable() {
        adjusted += ADJ_STABLE_EFFECTS;
    }
    if unit.render_side_effects > 0 {
        adjusted += ADJ_RENDER_SIDE_EFFECT;
    }

    adjusted.clamp(0.0, 100.0)
}

/// Score one unit. `evidence` is `None` when history was unavailable; the
/// unit then scores as zero evidence with a fragility bump.
pub fn score_unit(unit: &Unit, evidence: Option<&Evidence>, config: &ScoreConfig) -> UnitScores {
    let load = cognitive_load(unit);
    let review = evidence.map(|e| e.review_evidence).unwrap_or(0);
    let shadow = review < config.shadow_evidence_threshold && load > config.shadow_load_threshold;
    let fragility = match evidence {
        Some(_) => load,
        None => (load + FRAGILITY_NO_EVIDENCE_BUMP).min(100.0),
    };

    UnitScores {
        unit_id: unit.id.clone(),
        cognitive_load: load,
        review_evidence: review,
        shadow,
        fragility,
        redundancy_cluster_id: None,
    }
}

/// Whole-scan aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub total_units: usize,
    pub shadow_units: usize,
    pub shadow_logic_density: f64,
    pub avg_cognitive_load: u32,
    pub redundancy_score: f64,
}

pub fn aggregates(scores: &[UnitScores], clusters: &[Cluster]) -> Aggregates {
    let total = scores.len();
    if total == 0 {
        return Aggregates {
            total_units: 0,
            shadow_units: 0,
            shadow_logic_density: 0.0,
            avg_cognitive_load: 0,
            redundancy_score: 0.0,
        };
    }

    let shadow = scores.iter().filter(|s| s.shadow).count();
    let avg = scores.iter().map(|s| s.cognitive_load).sum::<f64>() / total as f64;

    // Singletons count as their own cluster. Cluster members that are
    // similarity-only entries do not appear in scores and are ignored here.
    let scored_ids: BTreeSet<&str> = scores.iter().map(|s| s.unit_id.as_str()).collect();
    let clustered: usize = clusters
        .iter()
        .map(|c| c.members.iter().filter(|m| scored_ids.contains(m.as_str())).count())
        .sum();
    let multi_clusters = clusters
        .iter()
        .filter(|c| c.members.iter().any(|m| scored_ids.contains(m.as_str())))
        .count();
    let unique_clusters = multi_clusters + (total - clustered.min(total));
    let redundancy = 1.0 - unique_clusters as f64 / total as f64;

    Aggregates {
        total_units: total,
        shadow_units: shadow,
        shadow_logic_density: shadow as f64 / total as f64,
        avg_cognitive_load: avg.round() as u32,
        redundancy_score: redundancy.clamp(0.0, 1.0),
    }
}

/// Refactoring runway in months: `current_shadow / max(K - H, 1)` where K is
/// shadow units created inside the runway window and H is prior-shadow units
/// that cleared. Without a prior scan the answer is "insufficient data".
pub fn runway(
    current_shadow: &[(String, Option<i64>)],
    prior_shadow_ids: Option<&BTreeSet<String>>,
    now_epoch: i64,
    config: &ScoreConfig,
) -> Runway {
    let Some(prior) = prior_shadow_ids else {
        return Runway::InsufficientData;
    };

    let window_start = now_epoch - config.runway_window_days * DAY_SECS;
    let created_recently = current_shadow
        .iter()
        .filter(|(_, created)| created.is_some_and(|t| t >= window_start))
        .count();

    let current_ids: BTreeSet<&str> = current_shadow.iter().map(|(id, _)| id.as_str()).collect();
    let healed = prior.iter().filter(|id| !current_ids.contains(id.as_str())).count();

    let denominator = created_recently.saturating_sub(healed).max(1);
    Runway::Months((current_shadow.len() / denominator) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{test_unit, EffectCall};

    fn evidence_with_score(score: u32) -> Evidence {
        Evidence {
            review_evidence: score,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_range_and_zero_floor() {
        let unit = test_unit();
        let load = cognitive_load(&unit);
        assert_eq!(load, 0.0);

        let mut maxed = test_unit();
        maxed.nesting_depth = 20;
        maxed.branch_count = 50;
        maxed.boolean_count = 30;
        maxed.callback_depth = 10;
        maxed.identifier_ambiguity = 1.0;
        maxed.context_switches = 9;
        maxed.exception_irregularity = true;
        maxed.side_effect_count = 12;
        maxed.render_side_effects = 3;
        maxed.kind = crate::models::UnitKind::Component;
        maxed.effects.push(EffectCall { name: "useEffect".into(), deps: None, has_cleanup: false });
        let load = cognitive_load(&maxed);
        assert_eq!(load, 100.0);
    }

    #[test]
    fn test_weighted_sum_exact() {
        let mut unit = test_unit();
        unit.nesting_depth = 4; // 50 * 15% = 7.5
        unit.branch_count = 10; // 50 * 10% = 5
        unit.exception_irregularity = true; // 100 * 8% = 8
        let load = cognitive_load(&unit);
        assert!((load - 20.5).abs() < 1e-9, "got {load}");
    }

    #[test]
    fn test_shadow_scenario_load() {
        // The deep, branchy, untouched function from the end-to-end
        // scenarios: high everything plus a dep-less effect.
        let mut unit = test_unit();
        unit.name = "refreshTokenIfExpired".into();
        unit.nesting_depth = 6; // 75 * .15 = 11.25
        unit.branch_count = 18; // 90 * .10 = 9
        unit.boolean_count = 12; // 100 * .08 = 8
        unit.callback_depth = 6; // 100 * .12 = 12
        unit.identifier_ambiguity = 0.6; // 60 * .10 = 6
        unit.context_switches = 5; // 100 * .05 = 5
        unit.exception_irregularity = true; // 100 * .08 = 8
        unit.side_effect_count = 6; // 100 * .07 = 7
        unit.effects.push(EffectCall { name: "useEffect".into(), deps: None, has_cleanup: false });

        let load = cognitive_load(&unit);
        assert!((load - 81.25).abs() < 1e-9, "got {load}");

        let scores = score_unit(&unit, Some(&evidence_with_score(5)), &ScoreConfig::default());
        assert!(scores.cognitive_load >= 80.0);
        assert!(scores.shadow);
    }

    #[test]
    fn test_monotone_in_each_feature() {
        let base = {
            let mut u = test_unit();
            u.nesting_depth = 2;
            u.branch_count = 3;
            u.boolean_count = 2;
            u.callback_depth = 1;
            u.identifier_ambiguity = 0.2;
            u.context_switches = 1;
            u.side_effect_count = 1;
            u
        };
        let base_load = cognitive_load(&base);

        let bump = |f: &dyn Fn(&mut Unit)| {
            let mut u = base.clone();
            f(&mut u);
            cognitive_load(&u)
        };

        assert!(bump(&|u| u.nesting_depth += 1) >= base_load);
        assert!(bump(&|u| u.branch_count += 1) >= base_load);
        assert!(bump(&|u| u.boolean_count += 1) >= base_load);
        assert!(bump(&|u| u.callback_depth += 1) >= base_load);
        assert!(bump(&|u| u.identifier_ambiguity += 0.1) >= base_load);
        assert!(bump(&|u| u.context_switches += 1) >= base_load);
        assert!(bump(&|u| u.exception_irregularity = true) >= base_load);
        assert!(bump(&|u| u.side_effect_count += 1) >= base_load);
    }

    #[test]
    fn test_stable_effects_bonus() {
        let mut unstable = test_unit();
        unstable.effects.push(EffectCall { name: "useEffect".into(), deps: None, has_cleanup: false });

        let mut stable = test_unit();
        stable.effects.push(EffectCall {
            name: "useEffect".into(),
            deps: Some(vec!["url".into()]),
            has_cleanup: true,
        });

        assert!(cognitive_load(&unstable) > cognitive_load(&stable));
        // The bonus cannot push below zero.
        assert_eq!(cognitive_load(&stable), 0.0);
    }

    #[test]
    fn test_reassigned_dep_penalized() {
        let mut unit = test_unit();
        unit.effects.push(EffectCall {
            name: "useEffect".into(),
            deps: Some(vec!["count".into()]),
            has_cleanup: false,
        });
        let clean = cognitive_load(&unit);
        unit.reassigned.push("count".into());
        assert!(cognitive_load(&unit) > clean);
    }

    #[test]
    fn test_render_side_effect_adjustment() {
        let mut unit = test_unit();
        unit.kind = crate::models::UnitKind::Component;
        let base = cognitive_load(&unit);
        unit.render_side_effects = 1;
        unit.side_effect_count = 1;
        let bumped = cognitive_load(&unit);
        assert!(bumped >= base + ADJ_RENDER_SIDE_EFFECT);
    }

    #[test]
    fn test_shadow_equivalence() {
        let config = ScoreConfig::default();
        let mut unit = test_unit();
        unit.nesting_depth = 8;
        unit.branch_count = 20;
        unit.boolean_count = 12;
        unit.callback_depth = 6;
        unit.identifier_ambiguity = 1.0;
        unit.context_switches = 5;
        unit.exception_irregularity = true;
        unit.side_effect_count = 6;

        let high = score_unit(&unit, Some(&evidence_with_score(10)), &config);
        assert!(high.cognitive_load > 70.0);
        assert!(high.shadow);

        let reviewed = score_unit(&unit, Some(&evidence_with_score(50)), &config);
        assert!(!reviewed.shadow);

        let simple = score_unit(&test_unit(), Some(&evidence_with_score(0)), &config);
        assert!(!simple.shadow);
    }

    #[test]
    fn test_fragility_bump_without_evidence() {
        let unit = test_unit();
        let with = score_unit(&unit, Some(&evidence_with_score(0)), &ScoreConfig::default());
        let without = score_unit(&unit, None, &ScoreConfig::default());
        assert_eq!(with.fragility, with.cognitive_load);
        assert_eq!(without.fragility, with.cognitive_load + 10.0);
    }

    #[test]
    fn test_aggregates_empty() {
        let agg = aggregates(&[], &[]);
        assert_eq!(agg.total_units, 0);
        assert_eq!(agg.shadow_logic_density, 0.0);
        assert_eq!(agg.redundancy_score, 0.0);
    }

    #[test]
    fn test_aggregates_density_and_redundancy() {
        let score = |id: &str, shadow: bool| UnitScores {
            unit_id: id.into(),
            cognitive_load: 50.0,
            review_evidence: 10,
            shadow,
            fragility: 50.0,
            redundancy_cluster_id: None,
        };
        let scores = vec![
            score("a", true),
            score("b", false),
            score("c", false),
            score("d", false),
        ];
        let clusters = vec![Cluster {
            id: "c1".into(),
            members: vec!["a".into(), "b".into()],
            suggestion: "sharedLogic".into(),
        }];

        let agg = aggregates(&scores, &clusters);
        assert_eq!(agg.total_units, 4);
        assert_eq!(agg.shadow_units, 1);
        assert!((agg.shadow_logic_density - 0.25).abs() < 1e-9);
        // unique clusters = 1 cluster + 2 singletons = 3; 1 - 3/4 = 0.25
        assert!((agg.redundancy_score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_runway_first_scan() {
        let current = vec![("a".to_string(), Some(0))];
        assert_eq!(
            runway(&current, None, 1_000_000, &ScoreConfig::default()),
            Runway::InsufficientData
        );
    }

    #[test]
    fn test_runway_with_prior() {
        let now = 1_000_000_000i64;
        let recent = now - 5 * DAY_SECS;
        let old = now - 200 * DAY_SECS;
        let config = ScoreConfig::default();

        // Three shadow units now, two of them created inside the window;
        // one prior shadow unit healed. K - H = 2 - 1 = 1 -> 3 months.
        let current = vec![
            ("a".to_string(), Some(recent)),
            ("b".to_string(), Some(recent)),
            ("c".to_string(), Some(old)),
        ];
        let prior: BTreeSet<String> =
            ["c".to_string(), "gone".to_string()].into_iter().collect();
        assert_eq!(runway(&current, Some(&prior), now, &config), Runway::Months(3));

        // Cleanup outpacing inflow clamps the denominator at 1.
        let prior_all: BTreeSet<String> = ["x".to_string(), "y".to_string(), "z".to_string()]
            .into_iter()
            .collect();
        let current_old = vec![("c".to_string(), Some(old))];
        assert_eq!(runway(&current_old, Some(&prior_all), now, &config), Runway::Months(1));
    }
}
