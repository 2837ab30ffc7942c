//! Shadowscope - shadow-logic analysis for TS/JS front-end code
//!
//! The engine quantifies "shadow logic": code whose structural complexity is
//! disproportionate to the human review evidence behind it. A scan walks a
//! repository, extracts analyzable units (components, hooks, functions) from
//! a concrete syntax tree, fuses version-control blame with commit signals
//! into a review-evidence score, clusters near-duplicate bodies, evaluates a
//! declarative ruleset, and assembles an immutable [`models::ScanReport`].

pub mod cache;
pub mod cli;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod history;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod reporters;
pub mod rules;
pub mod scoring;
pub mod similarity;

pub use error::{FailedScan, ScanError};
pub use models::ScanReport;
pub use pipeline::{ScanOutcome, ScanOptions, ScanRequest, Scanner};
