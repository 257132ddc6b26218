//! Line-oriented rule matching.
//!
//! Patterns compile once per scan in [`prepare`]; a pattern that fails to
//! compile is dropped with a match-stage note and never aborts the run.
//! Matching is textual: hits inside string literals or comments are an
//! accepted limitation of the regex tier, not a defect. Findings come back
//! in canonical order (line, rule id, column) so reports diff cleanly
//! between runs.
//!
//! `slopscan:allow` markers suppress findings on their own line: bare, the
//! marker silences every rule; followed by ids, only those rules.
//!
//! This module also owns the lightweight source-structure helpers used by
//! fix validation: delimiter counts and top-level unit counts, both blind
//! to string and comment interiors.

use crate::catalog::Catalog;
use crate::models::rule::{Rule, RuleKind};
use crate::models::{Finding, NoteStage, ScanNote};
use regex::Regex;

/// Suppression marker recognized in source comments.
pub const ALLOW_MARKER: &str = "slopscan:allow";

/// Matched excerpts longer than this are cut for report readability.
const EXCERPT_MAX: usize = 120;

/// Candidate function headers for the function-length rule. Keyword-led
/// statements (`if (...) {` and friends) also match the last alternative
/// and are filtered out afterwards.
const FUNCTION_HEADER: &str =
    r"\bfunction\b|=>\s*\{|^\s*(?:export\s+)?(?:public\s+|private\s+|protected\s+|static\s+|async\s+)*[A-Za-z_$][\w$]*\s*\([^)]*\)\s*\{\s*$";

const NON_HEADER_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "do", "else", "return", "try", "new", "typeof",
    "await",
];

/// A rule with its pattern compiled for this scan.
pub struct CompiledRule {
    pub rule: Rule,
    engine: Engine,
}

impl CompiledRule {
    /// The compiled pattern, for engines that have one. Fix application
    /// re-locates matched spans through this.
    pub fn regex(&self) -> Option<&Regex> {
        match &self.engine {
            Engine::Pattern(re) => Some(re),
            _ => None,
        }
    }
}

enum Engine {
    Pattern(Regex),
    FileLines(usize),
    FunctionLines { limit: usize, header: Regex },
}

/// Compile every rule once. Rules whose pattern does not compile are
/// skipped with a note; everything else proceeds.
pub fn prepare(catalog: &Catalog) -> (Vec<CompiledRule>, Vec<ScanNote>) {
    let mut compiled = Vec::new();
    let mut notes = Vec::new();
    for rule in catalog.rules() {
        let engine = match &rule.kind {
            RuleKind::Pattern(p) => match Regex::new(p) {
                Ok(re) => Engine::Pattern(re),
                Err(e) => {
                    notes.push(
                        ScanNote::new(NoteStage::Match, format!("pattern does not compile: {e}"))
                            .with_rule(&rule.id),
                    );
                    continue;
                }
            },
            RuleKind::MaxFileLines(n) => Engine::FileLines(*n),
            RuleKind::MaxFunctionLines(n) => match Regex::new(FUNCTION_HEADER) {
                Ok(re) => Engine::FunctionLines {
                    limit: *n,
                    header: re,
                },
                Err(e) => {
                    notes.push(
                        ScanNote::new(NoteStage::Match, format!("pattern does not compile: {e}"))
                            .with_rule(&rule.id),
                    );
                    continue;
                }
            },
        };
        compiled.push(CompiledRule {
            rule: rule.clone(),
            engine,
        });
    }
    (compiled, notes)
}

/// What an allow marker on a line suppresses.
enum Suppression {
    All,
    Ids(Vec<String>),
}

fn parse_allow(line: &str) -> Option<Suppression> {
    let pos = line.find(ALLOW_MARKER)?;
    let rest = &line[pos + ALLOW_MARKER.len()..];
    let mut ids = Vec::new();
    for tok in rest.split(|c: char| c.is_whitespace() || c == ',') {
        let t = tok.trim();
        if t.is_empty() {
            continue;
        }
        if t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            ids.push(t.to_string());
        } else {
            break;
        }
    }
    if ids.is_empty() {
        Some(Suppression::All)
    } else {
        Some(Suppression::Ids(ids))
    }
}

fn allows(line: &str, rule_id: &str) -> bool {
    match parse_allow(line) {
        Some(Suppression::All) => true,
        Some(Suppression::Ids(ids)) => ids.iter().any(|id| id == rule_id),
        None => false,
    }
}

/// Match every compiled rule against one file's content.
///
/// `path` is the root-relative display path recorded on findings. Output
/// order is the canonical (line, rule id, column).
pub fn match_file(path: &str, content: &str, rules: &[CompiledRule]) -> Vec<Finding> {
    let lines: Vec<&str> = content.lines().collect();
    let mut findings: Vec<Finding> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let suppression = parse_allow(line);
        if matches!(suppression, Some(Suppression::All)) {
            continue;
        }
        for cr in rules {
            let Engine::Pattern(re) = &cr.engine else {
                continue;
            };
            if let Some(Suppression::Ids(ids)) = &suppression {
                if ids.iter().any(|id| *id == cr.rule.id) {
                    continue;
                }
            }
            for m in re.find_iter(line) {
                findings.push(finding(cr, path, idx + 1, m.start() + 1, m.as_str()));
            }
        }
    }

    // Metric rules; line structure is computed only when one is present.
    let mut infos: Option<Vec<LineInfo>> = None;
    for cr in rules {
        match &cr.engine {
            Engine::FileLines(limit) => {
                // the finding sits on the first over-limit line, so that is
                // where an allow marker suppresses it
                if lines.len() > *limit && !allows(lines[*limit], &cr.rule.id) {
                    findings.push(finding(
                        cr,
                        path,
                        *limit + 1,
                        1,
                        &format!("{} lines", lines.len()),
                    ));
                }
            }
            Engine::FunctionLines { limit, header } => {
                let infos = infos.get_or_insert_with(|| profile_lines(&lines));
                for (start, len) in function_extents(&lines, infos, header) {
                    if len > *limit && !allows(lines[start], &cr.rule.id) {
                        findings.push(finding(cr, path, start + 1, 1, &format!("{len} lines")));
                    }
                }
            }
            Engine::Pattern(_) => {}
        }
    }

    findings.sort_by(|a, b| {
        a.line
            .cmp(&b.line)
            .then_with(|| a.rule.cmp(&b.rule))
            .then_with(|| a.col.cmp(&b.col))
    });
    findings
}

fn finding(cr: &CompiledRule, path: &str, line: usize, col: usize, matched: &str) -> Finding {
    Finding {
        rule: cr.rule.id.clone(),
        category: cr.rule.category,
        severity: cr.rule.severity,
        file: path.to_string(),
        line,
        col,
        matched: excerpt(matched),
        message: cr.rule.message.clone(),
    }
}

fn excerpt(s: &str) -> String {
    if s.chars().count() <= EXCERPT_MAX {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(EXCERPT_MAX).collect();
        out.push_str("...");
        out
    }
}

// ---------------------------------------------------------------------------
// Source structure: a heuristic lexer that skips string literals and
// comments so delimiter counts reflect code, not data.

#[derive(Default)]
struct CodeScanner {
    in_block_comment: bool,
    in_template: bool,
}

#[derive(Default)]
struct LineProfile {
    brace_opens: u32,
    brace_closes: u32,
    paren: i64,
    bracket: i64,
}

struct LineInfo {
    prof: LineProfile,
    /// Line begins inside a block comment or template literal.
    in_literal: bool,
}

impl CodeScanner {
    fn line(&mut self, line: &str) -> LineProfile {
        let mut prof = LineProfile::default();
        let bytes = line.as_bytes();
        // Quoted strings never span lines; template/comment state does.
        let mut in_str: Option<u8> = None;
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if self.in_block_comment {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    self.in_block_comment = false;
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            if self.in_template {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == b'`' {
                    self.in_template = false;
                }
                i += 1;
                continue;
            }
            if let Some(q) = in_str {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    in_str = None;
                }
                i += 1;
                continue;
            }
            match b {
                b'/' if bytes.get(i + 1) == Some(&b'/') => break,
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    self.in_block_comment = true;
                    i += 2;
                    continue;
                }
                b'\'' | b'"' => in_str = Some(b),
                b'`' => self.in_template = true,
                b'(' => prof.paren += 1,
                b')' => prof.paren -= 1,
                b'[' => prof.bracket += 1,
                b']' => prof.bracket -= 1,
                b'{' => prof.brace_opens += 1,
                b'}' => prof.brace_closes += 1,
                _ => {}
            }
            i += 1;
        }
        prof
    }
}

fn profile_lines(lines: &[&str]) -> Vec<LineInfo> {
    let mut sc = CodeScanner::default();
    lines
        .iter()
        .map(|l| {
            let in_literal = sc.in_block_comment || sc.in_template;
            let prof = sc.line(l);
            LineInfo { prof, in_literal }
        })
        .collect()
}

/// Net open-minus-close counts per delimiter pair, outside strings and
/// comments. Fix validation compares these before and after a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimCounts {
    pub paren: i64,
    pub bracket: i64,
    pub brace: i64,
}

pub fn delimiter_counts(text: &str) -> DelimCounts {
    let mut sc = CodeScanner::default();
    let mut out = DelimCounts {
        paren: 0,
        bracket: 0,
        brace: 0,
    };
    for line in text.lines() {
        let p = sc.line(line);
        out.paren += p.paren;
        out.bracket += p.bracket;
        out.brace += p.brace_opens as i64 - p.brace_closes as i64;
    }
    out
}

const DECL_KEYWORDS: &[&str] = &[
    "export", "import", "function", "class", "async", "const", "let", "var", "interface", "type",
    "enum",
];

/// Count of top-level declarations: lines at brace depth zero that open a
/// declaration. Style fixes must leave this count unchanged, which lets a
/// rewrite drop an expression statement but never a declaration.
pub fn top_level_units(text: &str) -> usize {
    let mut sc = CodeScanner::default();
    let mut depth: i64 = 0;
    let mut units = 0;
    for line in text.lines() {
        let in_literal = sc.in_block_comment || sc.in_template;
        let prof = sc.line(line);
        if depth == 0 && !in_literal && starts_declaration(line) {
            units += 1;
        }
        depth += prof.brace_opens as i64 - prof.brace_closes as i64;
    }
    units
}

fn starts_declaration(line: &str) -> bool {
    let t = line.trim_start();
    DECL_KEYWORDS.iter().any(|k| {
        t.starts_with(k)
            && t[k.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_' && c != '$')
    })
}

fn first_identifier(line: &str) -> Option<&str> {
    let t = line.trim_start();
    let end = t
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
        .map(|(i, _)| i)
        .unwrap_or(t.len());
    if end == 0 {
        None
    } else {
        Some(&t[..end])
    }
}

/// (header line index, total line count) for every detected function whose
/// block closes within the file. Bodies that never open a brace within two
/// lines of the header (expression-bodied arrows) are skipped.
fn function_extents(lines: &[&str], infos: &[LineInfo], header: &Regex) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if infos[i].in_literal || line.trim_start().starts_with("//") {
            continue;
        }
        if !header.is_match(line) {
            continue;
        }
        if let Some(first) = first_identifier(line) {
            if NON_HEADER_KEYWORDS.contains(&first) {
                continue;
            }
        }
        let mut depth: i64 = 0;
        let mut opened = false;
        for (j, info) in infos.iter().enumerate().skip(i) {
            if info.prof.brace_opens > 0 {
                opened = true;
            }
            depth += info.prof.brace_opens as i64 - info.prof.brace_closes as i64;
            if opened && depth <= 0 {
                out.push((i, j - i + 1));
                break;
            }
            if !opened && j - i >= 2 {
                break;
            }
        }
    }
    out
}
