//! Candidate-file enumeration
//!
//! Walks the scan root, keeps the FEL extensions (`.ts`, `.tsx`, `.js`,
//! `.jsx`), and drops dependency caches, build outputs, coverage outputs,
//! minified artifacts, test fixtures, and version-control internals. Output
//! ordering is lexicographic so scan outputs are reproducible.

use crate::error::ScanError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::Path;
use std::sync::OnceLock;

/// Path fragments that disqualify a file wherever they appear.
const EXCLUDED_FRAGMENTS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".next",
    "out",
    "coverage",
    ".git",
    ".cache",
    "vendor",
    ".turbo",
    ".vercel",
    "storybook-static",
    "__tests__",
    "__mocks__",
    "fixtures",
];

/// Generated or derived artifacts excluded by suffix.
const EXCLUDED_SUFFIXES: &[&str] = &[
    "*.min.js",
    "*.bundle.js",
    "*.d.ts",
    "*.map",
    "*.snap",
];

const INCLUDE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

static SUFFIX_GLOBS: OnceLock<GlobSet> = OnceLock::new();

fn suffix_globs() -> &'static GlobSet {
    SUFFIX_GLOBS.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for pattern in EXCLUDED_SUFFIXES {
            builder.add(Glob::new(pattern).expect("static glob pattern"));
        }
        builder.build().expect("static glob set")
    })
}

/// Whether a root-relative path passes the include/exclude filter.
pub fn is_candidate(rel: &Path) -> bool {
    let ext = rel.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !INCLUDE_EXTENSIONS.contains(&ext) {
        return false;
    }
    if rel.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        EXCLUDED_FRAGMENTS.contains(&part.as_ref())
    }) {
        return false;
    }
    if let Some(name) = rel.file_name() {
        if suffix_globs().is_match(Path::new(name)) {
            return false;
        }
    }
    true
}

/// Enumerate candidate files under `root`, root-relative with `/` separators,
/// sorted lexicographically.
pub fn enumerate(root: &Path) -> Result<Vec<String>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::Input {
            path: root.to_path_buf(),
            message: "not a readable directory".into(),
        });
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .build();

    let mut files = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        if is_candidate(rel) {
            files.push(normalize(rel));
        }
    }
    files.sort();
    Ok(files)
}

/// Intersect a caller-supplied changed-path set with the include filter.
/// Paths are root-relative. Ordering is stable.
pub fn select_changed(changed: &[String]) -> Vec<String> {
    let mut files: Vec<String> = changed
        .iter()
        .filter(|p| is_candidate(Path::new(p)))
        .map(|p| normalize(Path::new(p)))
        .collect();
    files.sort();
    files.dedup();
    files
}

fn normalize(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
