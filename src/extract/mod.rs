//! Unit extraction from TS/JS concrete syntax trees
//!
//! Parses each file with tree-sitter (grammar selected by extension),
//! promotes top-level components, hooks, and functions to [`Unit`]s, and
//! collects structural features in a single walk of each unit's subtree.
//! The parser is stable on syntactically invalid input: malformed regions
//! become parse warnings and the rest of the file is still analyzed.

use crate::models::{unit_id, EffectCall, ScanWarning, Span, Unit, UnitKind, WarningKind};
use std::collections::{BTreeMap, BTreeSet};
use tree_sitter::{Language, Node, Parser};

/// Bumped when the grammar stack changes; part of the extract cache key.
pub const PARSER_VERSION: &str = "ts24";
/// Bumped when feature extraction changes; part of the extract cache key.
pub const EXTRACTOR_VERSION: &str = "1";

/// The fixed reactive-effect vocabulary.
pub const EFFECT_HOOKS: &[&str] = &["useEffect", "useLayoutEffect", "useInsertionEffect"];

/// Callee roots counted as network/storage side effects.
const SIDE_EFFECT_ROOTS: &[&str] = &["fetch", "localStorage", "sessionStorage", "axios"];

/// Identifier names counted as ambiguous.
const AMBIGUOUS_NAMES: &[&str] = &["data", "tmp", "result", "foo", "x", "y"];

/// Cap on parse warnings emitted per file.
const MAX_PARSE_WARNINGS: usize = 5;

/// FEL dialect, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Dialect {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.rsplit('.').next()? {
            "ts" => Some(Dialect::TypeScript),
            "tsx" => Some(Dialect::Tsx),
            "js" | "jsx" => Some(Dialect::JavaScript),
            _ => None,
        }
    }

    fn language(self) -> Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// A top-level symbol that was not promoted to a unit but still participates
/// in redundancy detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimilarityEntry {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub kind: UnitKind,
    pub source: String,
}

/// Everything extracted from one file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FileAnalysis {
    pub units: Vec<Unit>,
    pub similarity_only: Vec<SimilarityEntry>,
    pub warnings: Vec<ScanWarning>,
}

/// Parse a file's source and extract all units and features.
pub fn analyze_source(source: &str, file_path: &str) -> FileAnalysis {
    let Some(dialect) = Dialect::from_path(file_path) else {
        return FileAnalysis::default();
    };

    let mut parser = Parser::new();
    if parser.set_language(&dialect.language()).is_err() {
        return FileAnalysis::default();
    }
    let Some(tree) = parser.parse(source, None) else {
        return FileAnalysis::default();
    };

    let root = tree.root_node();
    let bytes = source.as_bytes();
    let mut analysis = FileAnalysis::default();

    collect_parse_warnings(root, file_path, &mut analysis.warnings);

    for i in 0..root.named_child_count() {
        let Some(child) = root.named_child(i) else {
            continue;
        };
        for (fn_node, name) in declared_functions(child, bytes) {
            build_symbol(fn_node, &name, file_path, bytes, &mut analysis);
        }
    }

    analysis
}

/// Walk the tree for ERROR/MISSING regions and report them as warnings.
fn collect_parse_warnings(root: Node, file_path: &str, warnings: &mut Vec<ScanWarning>) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if warnings.len() >= MAX_PARSE_WARNINGS {
            return;
        }
        if node.is_error() || node.is_missing() {
            warnings.push(ScanWarning {
                kind: WarningKind::Parse,
                path: file_path.to_string(),
                detail: format!("malformed syntax at byte {}", node.start_byte()),
            });
            continue;
        }
        if node.has_error() {
            for i in (0..node.child_count()).rev() {
                if let Some(child) = node.child(i) {
                    stack.push(child);
                }
            }
        }
    }
}

/// Resolve `(function_node, name)` pairs from a top-level statement.
///
/// Handles plain declarations, `const X = () => {}` assignments, exported
/// variants of both, and methods of top-level classes.
fn declared_functions<'t>(node: Node<'t>, src: &[u8]) -> Vec<(Node<'t>, String)> {
    match node.kind() {
        "export_statement" => node
            .child_by_field_name("declaration")
            .map(|decl| declared_functions(decl, src))
            .unwrap_or_default(),
        "function_declaration" | "generator_function_declaration" => node
            .child_by_field_name("name")
            .and_then(|n| node_text(n, src))
            .map(|name| vec![(node, name)])
            .unwrap_or_default(),
        "lexical_declaration" | "variable_declaration" => {
            let mut out = Vec::new();
            for i in 0..node.named_child_count() {
                let Some(declarator) = node.named_child(i) else {
                    continue;
                };
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let name = declarator
                    .child_by_field_name("name")
                    .and_then(|n| node_text(n, src));
                let value = declarator.child_by_field_name("value");
                if let (Some(name), Some(value)) = (name, value) {
                    if matches!(value.kind(), "arrow_function" | "function_expression") {
                        out.push((value, name));
                    }
                }
            }
            out
        }
        "class_declaration" => {
            let mut out = Vec::new();
            if let Some(body) = node.child_by_field_name("body") {
                for i in 0..body.named_child_count() {
                    let Some(member) = body.named_child(i) else {
                        continue;
                    };
                    if member.kind() != "method_definition" {
                        continue;
                    }
                    if let Some(name) = member
                        .child_by_field_name("name")
                        .and_then(|n| node_text(n, src))
                    {
                        out.push((member, name));
                    }
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Classify a resolved symbol and either promote it to a unit or record it
/// for redundancy detection only.
fn build_symbol(
    fn_node: Node,
    name: &str,
    file_path: &str,
    src: &[u8],
    analysis: &mut FileAnalysis,
) {
    let span = Span::new(
        fn_node.start_position().row as u32 + 1,
        fn_node.end_position().row as u32 + 1,
    );
    let source = node_text(fn_node, src).unwrap_or_default();
    let loc = count_loc(&source);

    // Hook classification wins over component on ambiguous names.
    let kind = if is_hook_name(name) {
        UnitKind::Hook
    } else if starts_uppercase(name) && returns_markup(fn_node) {
        UnitKind::Component
    } else {
        UnitKind::Function
    };

    let id = unit_id(file_path, name, span);

    if kind == UnitKind::Function && loc < 3 {
        analysis.similarity_only.push(SimilarityEntry {
            id,
            file_path: file_path.to_string(),
            name: name.to_string(),
            kind,
            source,
        });
        return;
    }

    let mut walk = FeatureWalk::new(src);
    walk.run(fn_node);

    let early_returns = walk.early_returns(fn_node);
    let identifier_ambiguity = walk.identifier_ambiguity();
    let context_switches = walk.context_switches();
    let render_side_effects = if kind == UnitKind::Component {
        walk.render_side_effects
    } else {
        0
    };

    analysis.units.push(Unit {
        id,
        file_path: file_path.to_string(),
        name: name.to_string(),
        kind,
        span,
        loc,
        nesting_depth: walk.max_nesting,
        branch_count: walk.branch_count,
        early_return_count: early_returns,
        try_catch_count: walk.try_count,
        boolean_count: walk.boolean_count,
        callback_depth: walk.max_callback_depth,
        identifier_ambiguity,
        context_switches,
        side_effect_count: walk.side_effect_count,
        render_side_effects,
        effects: walk.effects,
        exception_irregularity: walk.exception_irregularity,
        reassigned: walk.reassigned.into_iter().collect(),
        source,
    });
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_uppercase())
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Whether the function body evaluates to markup: a return statement (or an
/// arrow expression body) whose expression is a JSX element or fragment.
fn returns_markup(fn_node: Node) -> bool {
    let Some(body) = fn_node.child_by_field_name("body") else {
        return false;
    };
    if is_markup(unwrap_parens(body)) {
        return true;
    }
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        if node.kind() == "return_statement" {
            for i in 0..node.named_child_count() {
                if let Some(expr) = node.named_child(i) {
                    if is_markup(unwrap_parens(expr)) {
                        return true;
                    }
                }
            }
        }
        // Do not look into nested function bodies; their returns are theirs.
        if node.id() != body.id() && is_function_node(node) {
            continue;
        }
        for i in (0..node.named_child_count()).rev() {
            if let Some(child) = node.named_child(i) {
                stack.push(child);
            }
        }
    }
    false
}

fn unwrap_parens(node: Node) -> Node {
    let mut current = node;
    while current.kind() == "parenthesized_expression" {
        match current.named_child(0) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn is_markup(node: Node) -> bool {
    matches!(
        node.kind(),
        "jsx_element" | "jsx_self_closing_element" | "jsx_fragment"
    )
}

fn is_function_node(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function_declaration" | "method_definition"
    )
}

fn node_text(node: Node, src: &[u8]) -> Option<String> {
    node.utf8_text(src).ok().map(str::to_string)
}

/// Non-blank, non-comment line count for a snippet.
pub fn count_loc(source: &str) -> u32 {
    let mut loc = 0u32;
    let mut in_block_comment = false;
    for line in source.lines() {
        let mut rest = line.trim();
        if rest.is_empty() {
            continue;
        }
        let mut has_code = false;
        while !rest.is_empty() {
            if in_block_comment {
                match rest.find("*/") {
                    Some(idx) => {
                        in_block_comment = false;
                        rest = rest[idx + 2..].trim_start();
                    }
                    None => {
                        rest = "";
                    }
                }
            } else if let Some(idx) = rest.find("/*") {
                if rest[..idx].find("//").is_some() {
                    has_code |= !rest[..rest.find("//").unwrap()].trim().is_empty();
                    rest = "";
                } else {
                    has_code |= !rest[..idx].trim().is_empty();
                    in_block_comment = true;
                    rest = rest[idx + 2..].trim_start();
                }
            } else if let Some(idx) = rest.find("//") {
                has_code |= !rest[..idx].trim().is_empty();
                rest = "";
            } else {
                has_code = true;
                rest = "";
            }
        }
        if has_code {
            loc += 1;
        }
    }
    loc
}

/// Single-pass feature accumulator over a unit's subtree.
struct FeatureWalk<'a> {
    src: &'a [u8],
    max_nesting: u32,
    branch_count: u32,
    boolean_count: u32,
    try_count: u32,
    return_count: u32,
    max_callback_depth: u32,
    side_effect_count: u32,
    render_side_effects: u32,
    exception_irregularity: bool,
    effects: Vec<EffectCall>,
    identifiers: BTreeMap<String, u32>,
    reassigned: BTreeSet<String>,
    callback_depth: u32,
    effect_depth: u32,
}

const NESTING_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_statement",
    "try_statement",
    "ternary_expression",
];

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "else_clause",
    "switch_case",
    "switch_default",
    "ternary_expression",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
];

/// Whether an effect callback returns a teardown function: an expression
/// body that is itself a function, or a top-level `return` of one.
fn callback_returns_function(cb: Node) -> bool {
    if !matches!(cb.kind(), "arrow_function" | "function_expression") {
        return false;
    }
    let Some(body) = cb.child_by_field_name("body") else {
        return false;
    };
    if is_function_node(unwrap_parens(body)) {
        return true;
    }
    if body.kind() != "statement_block" {
        return false;
    }
    for i in 0..body.named_child_count() {
        let Some(stmt) = body.named_child(i) else {
            continue;
        };
        if stmt.kind() != "return_statement" {
            continue;
        }
        for j in 0..stmt.named_child_count() {
            if let Some(expr) = stmt.named_child(j) {
                if is_function_node(unwrap_parens(expr)) {
                    return true;
                }
            }
        }
    }
    false
}

impl<'a> FeatureWalk<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            max_nesting: 0,
            branch_count: 0,
            boolean_count: 0,
            try_count: 0,
            return_count: 0,
            max_callback_depth: 0,
            side_effect_count: 0,
            render_side_effects: 0,
            exception_irregularity: false,
            effects: Vec::new(),
            identifiers: BTreeMap::new(),
            reassigned: BTreeSet::new(),
            callback_depth: 0,
            effect_depth: 0,
        }
    }

    /// Walk the unit's subtree, starting below the wrapper node so the unit
    /// itself is not counted as a callback, and skipping its own name.
    fn run(&mut self, fn_node: Node) {
        let name_id = fn_node.child_by_field_name("name").map(|n| n.id());
        for i in 0..fn_node.named_child_count() {
            let Some(child) = fn_node.named_child(i) else {
                continue;
            };
            if Some(child.id()) == name_id {
                continue;
            }
            self.visit(child, 0);
        }
    }

    fn visit(&mut self, node: Node, nesting: u32) {
        let kind = node.kind();
        let mut child_nesting = nesting;

        if NESTING_KINDS.contains(&kind) {
            child_nesting += 1;
            self.max_nesting = self.max_nesting.max(child_nesting);
        }
        if BRANCH_KINDS.contains(&kind) {
            self.branch_count += 1;
        }

        match kind {
            "binary_expression" => {
                if let Some(op) = node.child_by_field_name("operator") {
                    if matches!(op.kind(), "&&" | "||" | "??") {
                        self.boolean_count += 1;
                    }
                }
            }
            "try_statement" => {
                self.try_count += 1;
                self.inspect_try(node);
            }
            "return_statement" => {
                self.return_count += 1;
            }
            "identifier" => {
                if let Some(text) = node_text(node, self.src) {
                    *self.identifiers.entry(text).or_insert(0) += 1;
                }
            }
            "assignment_expression" | "augmented_assignment_expression" => {
                if let Some(left) = node.child_by_field_name("left") {
                    if left.kind() == "identifier" {
                        if let Some(text) = node_text(left, self.src) {
                            self.reassigned.insert(text);
                        }
                    }
                }
            }
            "update_expression" => {
                if let Some(arg) = node.child_by_field_name("argument") {
                    if arg.kind() == "identifier" {
                        if let Some(text) = node_text(arg, self.src) {
                            self.reassigned.insert(text);
                        }
                    }
                }
            }
            "call_expression" => {
                if self.visit_call(node, child_nesting) {
                    return;
                }
            }
            "arrow_function" | "function_expression" => {
                // A nested callback; run() starts below the unit's wrapper.
                self.callback_depth += 1;
                self.max_callback_depth = self.max_callback_depth.max(self.callback_depth);
                self.visit_children(node, child_nesting);
                self.callback_depth -= 1;
                return;
            }
            _ => {}
        }

        self.visit_children(node, child_nesting);
    }

    fn visit_children(&mut self, node: Node, nesting: u32) {
        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                self.visit(child, nesting);
            }
        }
    }

    /// Handle a call expression: side-effect accounting and reactive-effect
    /// recognition. Returns true when the children were already visited.
    fn visit_call(&mut self, node: Node, nesting: u32) -> bool {
        let callee_root = node
            .child_by_field_name("function")
            .map(|f| self.callee_root(f))
            .unwrap_or_default();

        if SIDE_EFFECT_ROOTS.contains(&callee_root.as_str()) {
            self.side_effect_count += 1;
            if self.effect_depth == 0 {
                self.render_side_effects += 1;
            }
        }

        if EFFECT_HOOKS.contains(&callee_root.as_str()) {
            self.record_effect(node);
            // Walk the callback under the effect so side-effect calls inside
            // it are not attributed to render.
            if let Some(args) = node.child_by_field_name("arguments") {
                self.effect_depth += 1;
                self.visit_children(args, nesting);
                self.effect_depth -= 1;
            }
            return true;
        }
        false
    }

    /// Leftmost identifier of a callee (`axios.get` -> `axios`).
    fn callee_root(&self, callee: Node) -> String {
        let mut current = callee;
        loop {
            match current.kind() {
                "member_expression" => match current.child_by_field_name("object") {
                    Some(obj) => current = obj,
                    None => return String::new(),
                },
                "identifier" => return node_text(current, self.src).unwrap_or_default(),
                _ => return String::new(),
            }
        }
    }

    fn record_effect(&mut self, call: Node) {
        let name = call
            .child_by_field_name("function")
            .and_then(|f| node_text(f, self.src))
            .unwrap_or_default();
        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };

        let callback = args.named_child(0);
        let has_cleanup = callback.is_some_and(|cb| callback_returns_function(cb));

        let deps = args.named_child(1).and_then(|second| {
            (second.kind() == "array").then(|| {
                let mut names = Vec::new();
                for i in 0..second.named_child_count() {
                    if let Some(dep) = second.named_child(i) {
                        if let Some(text) = node_text(dep, self.src) {
                            names.push(text);
                        }
                    }
                }
                names
            })
        });

        self.effects.push(EffectCall { name, deps, has_cleanup });
    }

    /// Try without a catch clause, or a catch whose handler body is empty.
    fn inspect_try(&mut self, try_node: Node) {
        let handler = try_node.child_by_field_name("handler");
        match handler {
            None => self.exception_irregularity = true,
            Some(catch) => {
                let empty = catch
                    .child_by_field_name("body")
                    .map(|b| b.named_child_count() == 0)
                    .unwrap_or(true);
                if empty {
                    self.exception_irregularity = true;
                }
            }
        }
    }

    /// Return statements not at the body's tail.
    fn early_returns(&self, fn_node: Node) -> u32 {
        if self.return_count == 0 {
            return 0;
        }
        let tail_is_return = fn_node
            .child_by_field_name("body")
            .filter(|b| b.kind() == "statement_block")
            .and_then(|b| b.named_child(b.named_child_count().saturating_sub(1)))
            .is_some_and(|last| last.kind() == "return_statement");
        if tail_is_return {
            self.return_count - 1
        } else {
            self.return_count
        }
    }

    fn identifier_ambiguity(&self) -> f64 {
        let total: u32 = self.identifiers.values().sum();
        if total == 0 {
            return 0.0;
        }
        let ambiguous: u32 = self
            .identifiers
            .iter()
            .filter(|(name, _)| AMBIGUOUS_NAMES.contains(&name.to_lowercase().as_str()))
            .map(|(_, count)| *count)
            .sum();
        f64::from(ambiguous) / f64::from(total)
    }

    /// Distinct leading-lowercase prefixes among identifiers used >= 2 times.
    fn context_switches(&self) -> u32 {
        let mut prefixes = BTreeSet::new();
        for (name, count) in &self.identifiers {
            if *count < 2 {
                continue;
            }
            let prefix: String = name.chars().take_while(|c| c.is_ascii_lowercase()).collect();
            if !prefix.is_empty() {
                prefixes.insert(prefix);
            }
        }
        prefixes.len() as u32
    }
}
