//! Near-duplicate detection over normalized token streams
//!
//! Unit bodies are normalized (identifiers to `_VAR`, strings to `_STR`,
//! numbers to `_NUM`), shingled into 4-grams, and MinHash-signed with a fixed
//! 128-permutation family so candidate pairs can be screened cheaply. Exact
//! Jaccard confirms every edge; clusters are the connected components of the
//! resulting graph and the output ordering is fully deterministic.

use crate::models::{hex_prefix, Cluster, UnitKind};
use regex::Regex;
use rustc_hash::FxHasher;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Bumped when tokenization changes; part of the similarity cache key.
pub const NORMALIZER_VERSION: &str = "1";

/// Shingle width in tokens.
pub const SHINGLE_SIZE: usize = 4;
/// MinHash signature length.
pub const NUM_PERMUTATIONS: usize = 128;
/// Jaccard threshold for non-component pairs.
pub const TAU: f64 = 0.70;
/// Jaccard threshold when both members are components.
pub const TAU_COMPONENT: f64 = 0.85;

/// Seed for the reproducible permutation family.
const MINHASH_SEED: u64 = 0x5ad0_53c0_9e1d_7b21;

/// FEL reserved words, common built-ins, and the reactive-effect vocabulary.
/// These survive normalization; everything else becomes `_VAR`.
const KEYWORD_ALLOWLIST: &[&str] = &[
    // reserved words
    "const", "let", "var", "function", "return", "if", "else", "for", "while", "do", "switch",
    "case", "break", "continue", "try", "catch", "finally", "throw", "new", "delete", "typeof",
    "instanceof", "in", "of", "class", "extends", "super", "this", "import", "export", "default",
    "from", "async", "await", "yield", "true", "false", "null", "undefined", "void", "static",
    "get", "set", "interface", "type", "enum", "implements", "readonly", "as", "satisfies",
    // common built-ins
    "console", "Math", "JSON", "Object", "Array", "Promise", "String", "Number", "Boolean",
    "Map", "Set", "Date", "Error", "window", "document",
    // reactive-effect vocabulary
    "useEffect", "useLayoutEffect", "useInsertionEffect",
];

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(concat!(
            r#"(?s)(//[^\n]*|/\*.*?\*/)"#,       // 1: comments
            r#"|("[^"]*"|'[^']*'|`[^`]*`)"#,     // 2: strings
            r#"|(\d+\.?\d*)"#,                   // 3: numbers
            r#"|([A-Za-z_$][A-Za-z0-9_$]*)"#,    // 4: identifiers
            r#"|([{}()\[\];,.:?!<>=+\-*/&|^~%@#])"#, // 5: symbols
        ))
        .expect("static token regex")
    })
}

/// Normalize source into the token stream used for shingling.
pub fn normalize_tokens(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for caps in token_re().captures_iter(source) {
        if caps.get(1).is_some() {
            continue; // comments are stripped
        }
        if caps.get(2).is_some() {
            tokens.push("_STR".to_string());
        } else if caps.get(3).is_some() {
            tokens.push("_NUM".to_string());
        } else if let Some(ident) = caps.get(4) {
            let text = ident.as_str();
            if KEYWORD_ALLOWLIST.contains(&text) {
                tokens.push(text.to_string());
            } else {
                tokens.push("_VAR".to_string());
            }
        } else if let Some(sym) = caps.get(5) {
            tokens.push(sym.as_str().to_string());
        }
    }
    tokens
}

/// 4-gram shingles over a token stream, hashed to u64. Streams shorter than
/// the shingle width produce a single shingle.
pub fn shingles(tokens: &[String]) -> BTreeSet<u64> {
    let mut out = BTreeSet::new();
    if tokens.is_empty() {
        return out;
    }
    if tokens.len() < SHINGLE_SIZE {
        out.insert(hash_gram(tokens));
        return out;
    }
    for window in tokens.windows(SHINGLE_SIZE) {
        out.insert(hash_gram(window));
    }
    out
}

fn hash_gram(tokens: &[String]) -> u64 {
    let mut hasher = FxHasher::default();
    for t in tokens {
        t.hash(&mut hasher);
    }
    hasher.finish()
}

/// splitmix64, used to derive the reproducible permutation parameters.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn permutations() -> &'static Vec<(u64, u64)> {
    static PERMS: OnceLock<Vec<(u64, u64)>> = OnceLock::new();
    PERMS.get_or_init(|| {
        let mut state = MINHASH_SEED;
        (0..NUM_PERMUTATIONS)
            .map(|_| {
                let a = splitmix64(&mut state) | 1; // odd multiplier
                let b = splitmix64(&mut state);
                (a, b)
            })
            .collect()
    })
}

/// 128-permutation MinHash signature over a shingle set. An empty set signs
/// as all-max; empty entries are excluded from pairing before signatures are
/// compared.
pub fn signature(shingles: &BTreeSet<u64>) -> Vec<u64> {
    let mut sig = vec![u64::MAX; NUM_PERMUTATIONS];
    for &shingle in shingles {
        for (slot, &(a, b)) in sig.iter_mut().zip(permutations().iter()) {
            let h = a.wrapping_mul(shingle).wrapping_add(b);
            if h < *slot {
                *slot = h;
            }
        }
    }
    sig
}

/// Estimated Jaccard from two signatures: the fraction of matching slots.
pub fn estimate(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / a.len() as f64
}

/// Exact Jaccard over shingle sets. Two empty sets are identical.
pub fn exact_jaccard(a: &BTreeSet<u64>, b: &BTreeSet<u64>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// A unit prepared for clustering.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShingledUnit {
    pub id: String,
    pub name: String,
    pub kind: UnitKind,
    /// Directory of the containing file, used to restrict incremental
    /// candidate universes.
    pub dir: String,
    pub shingles: BTreeSet<u64>,
    pub signature: Vec<u64>,
}

impl ShingledUnit {
    pub fn build(id: &str, name: &str, kind: UnitKind, file_path: &str, source: &str) -> Self {
        let tokens = normalize_tokens(source);
        let shingles = shingles(&tokens);
        let signature = signature(&shingles);
        let dir = match file_path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            dir,
            shingles,
            signature,
        }
    }
}

fn pair_threshold(a: &ShingledUnit, b: &ShingledUnit) -> f64 {
    if a.kind == UnitKind::Component && b.kind == UnitKind::Component {
        TAU_COMPONENT
    } else {
        TAU
    }
}

/// Path-compressed union-find with union by rank.
struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Cluster the full candidate universe (every pair).
pub fn cluster_full(entries: &[ShingledUnit]) -> Vec<Cluster> {
    cluster_with(entries, |_, _| true)
}

/// Cluster an incremental universe: a pair is considered when both members
/// changed, or when one changed and the other lives in the same directory
/// subtree. An all-changed set therefore degenerates to the full universe.
pub fn cluster_incremental(entries: &[ShingledUnit], changed: &BTreeSet<String>) -> Vec<Cluster> {
    cluster_with(entries, |a, b| {
        let a_changed = changed.contains(&a.id);
        let b_changed = changed.contains(&b.id);
        if a_changed && b_changed {
            return true;
        }
        if !a_changed && !b_changed {
            return false;
        }
        same_subtree(&a.dir, &b.dir)
    })
}

fn same_subtree(a: &str, b: &str) -> bool {
    a == b
        || a.starts_with(&format!("{}/", b))
        || b.starts_with(&format!("{}/", a))
        || a.is_empty()
        || b.is_empty()
}

fn cluster_with<F>(entries: &[ShingledUnit], consider: F) -> Vec<Cluster>
where
    F: Fn(&ShingledUnit, &ShingledUnit) -> bool,
{
    let n = entries.len();
    if n < 2 {
        return vec![];
    }

    let mut sets = DisjointSets::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&entries[i], &entries[j]);
            if a.shingles.is_empty() || b.shingles.is_empty() {
                continue;
            }
            if !consider(a, b) {
                continue;
            }
            let tau = pair_threshold(a, b);
            if estimate(&a.signature, &b.signature) < tau {
                continue;
            }
            if exact_jaccard(&a.shingles, &b.shingles) >= tau {
                sets.union(i, j);
            }
        }
    }

    let mut components: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for i in 0..n {
        let root = sets.find(i);
        components.entry(root).or_default().push(i);
    }

    let mut clusters: Vec<Cluster> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let mut ids: Vec<String> = members.iter().map(|&i| entries[i].id.clone()).collect();
            ids.sort();
            let names: Vec<&str> = members.iter().map(|&i| entries[i].name.as_str()).collect();
            Cluster {
                id: cluster_id(&ids),
                suggestion: suggest_name(&names),
                members: ids,
            }
        })
        .collect();

    clusters.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
    clusters
}

fn cluster_id(sorted_members: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sorted_members.join("|"));
    hex_prefix(&hasher.finalize(), 8)
}

/// Merge prior clusters into a freshly computed incremental set. Prior
/// clusters touching a changed unit are dropped in favor of the recomputed
/// ones; the rest carry over verbatim.
pub fn merge_clusters(
    prior: &[Cluster],
    fresh: Vec<Cluster>,
    changed: &BTreeSet<String>,
) -> Vec<Cluster> {
    let mut merged: Vec<Cluster> = prior
        .iter()
        .filter(|c| !c.members.iter().any(|m| changed.contains(m)))
        .cloned()
        .collect();
    for cluster in fresh {
        if !merged.iter().any(|c| c.id == cluster.id) {
            merged.push(cluster);
        }
    }
    merged.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
    merged
}

/// Synthesize a shared-utility name from member symbol names: the longest
/// common prefix, lower-camel, prefixed with `shared`.
pub fn suggest_name(names: &[&str]) -> String {
    let Some(first) = names.first() else {
        return "sharedLogic".to_string();
    };
    let mut prefix = first.to_string();
    for name in &names[1..] {
        while !prefix.is_empty() && !name.starts_with(&prefix) {
            prefix.pop();
        }
    }
    if prefix.len() > 3 {
        let mut chars = prefix.chars();
        let head = chars.next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
        format!("shared{}{}", head, chars.as_str())
    } else {
        "sharedLogic".to_string()
    }
}
