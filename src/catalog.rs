//! Rule catalog: the built-in rule set plus user rule files.
//!
//! Rules are static once loaded. Ordering is catalog declaration order:
//! built-ins first, then rule-file rules sorted by file path. Integrity
//! checks are fatal: no two rules may share an id, and categories are a
//! closed set (`DuplicateRule` / `InvalidCategory`).
//!
//! Rule files are TOML or YAML (keyed by extension), each holding a
//! `rules = [...]` list. Length-limit rules are built-in only; their
//! thresholds come from `[rules.<id>] max_lines` config overrides.

use crate::config::RuleTuning;
use crate::error::CatalogError;
use crate::models::rule::{Category, Rule, RuleFile, RuleKind, Severity};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Default threshold for `max-file-length`.
pub const DEFAULT_MAX_FILE_LINES: usize = 400;
/// Default threshold for `max-function-length`.
pub const DEFAULT_MAX_FUNCTION_LINES: usize = 60;

#[derive(Debug, Clone)]
/// Ordered, validated rule collection.
pub struct Catalog {
    rules: Vec<Rule>,
}

impl Catalog {
    /// The built-in rule set. Covers every category; patterns are the
    /// textual tier (string-literal and comment false positives are an
    /// accepted limitation of line-oriented matching).
    pub fn builtin() -> Catalog {
        let rules = vec![
            rule(
                "no-any",
                Category::TypeSafety,
                Severity::High,
                RuleKind::Pattern(r":\s*any\b|<\s*any\s*>|\bas\s+any\b".into()),
                "explicit 'any' defeats the type checker",
                false,
                None,
            ),
            rule(
                "no-non-null-assertion",
                Category::TypeSafety,
                Severity::Medium,
                RuleKind::Pattern(r"[\w\)\]]!\s*[\.\(:\[]".into()),
                "non-null assertion hides a possible null/undefined",
                false,
                None,
            ),
            rule(
                "no-ts-suppress",
                Category::TypeSafety,
                Severity::High,
                RuleKind::Pattern(r"@ts-(?:ignore|nocheck)\b".into()),
                "type-checker suppression comment",
                false,
                None,
            ),
            rule(
                "no-empty-catch",
                Category::ErrorHandling,
                Severity::High,
                RuleKind::Pattern(r"catch\s*(?:\([^)]*\))?\s*\{\s*\}".into()),
                "swallowed exception: empty catch block",
                false,
                None,
            ),
            rule(
                "no-throw-string",
                Category::ErrorHandling,
                Severity::Medium,
                RuleKind::Pattern(r#"\bthrow\s+['"`]"#.into()),
                "throwing a bare string loses the stack trace",
                false,
                None,
            ),
            // var->let changes hoisting; the template is review-only unless
            // config lists the rule under `autofix`
            rule(
                "no-var",
                Category::Immutability,
                Severity::Medium,
                RuleKind::Pattern(r"\bvar(\s+[A-Za-z_$])".into()),
                "'var' declaration; use let or const",
                false,
                Some("let$1".into()),
            ),
            rule(
                "no-eval",
                Category::Security,
                Severity::Critical,
                RuleKind::Pattern(r"\beval\s*\(|\bnew\s+Function\s*\(".into()),
                "dynamic code evaluation",
                false,
                None,
            ),
            rule(
                "no-hardcoded-secret",
                Category::Security,
                Severity::Critical,
                RuleKind::Pattern(
                    r#"(?i)\b(?:password|passwd|secret|api_?key|token)\s*[:=]\s*['"][^'"]{4,}['"]"#
                        .into(),
                ),
                "possible hardcoded credential",
                false,
                None,
            ),
            rule(
                "no-sync-io",
                Category::Performance,
                Severity::Medium,
                RuleKind::Pattern(
                    r"\b(?:readFileSync|writeFileSync|readdirSync|existsSync|execSync)\s*\(".into(),
                ),
                "synchronous I/O blocks the event loop",
                false,
                None,
            ),
            rule(
                "no-deep-relative-import",
                Category::Architecture,
                Severity::Medium,
                RuleKind::Pattern(r"(?:\.\./){3,}".into()),
                "deep relative import; add a path alias",
                false,
                None,
            ),
            rule(
                "max-file-length",
                Category::Architecture,
                Severity::Low,
                RuleKind::MaxFileLines(DEFAULT_MAX_FILE_LINES),
                "file exceeds the line limit",
                false,
                None,
            ),
            rule(
                "max-function-length",
                Category::Architecture,
                Severity::Medium,
                RuleKind::MaxFunctionLines(DEFAULT_MAX_FUNCTION_LINES),
                "function body exceeds the line limit",
                false,
                None,
            ),
            rule(
                "no-console",
                Category::Style,
                Severity::Low,
                // span ends at the first `;` so a second statement on the
                // line survives the autofix; a literal `;` inside the
                // arguments defeats the match
                RuleKind::Pattern(
                    r"\bconsole\.(?:log|debug|info|trace|warn|error)\s*\([^;]*\)\s*;?".into(),
                ),
                "console call left in source",
                true,
                Some(String::new()),
            ),
            rule(
                "no-debugger",
                Category::Style,
                Severity::Medium,
                RuleKind::Pattern(r"\bdebugger\s*;?".into()),
                "debugger statement left in source",
                true,
                Some(String::new()),
            ),
            rule(
                "no-todo-comment",
                Category::Style,
                Severity::Low,
                RuleKind::Pattern(r"(?://|#|/\*)\s*(?:TODO|FIXME|XXX|HACK)\b".into()),
                "unresolved marker comment",
                false,
                None,
            ),
            rule(
                "no-trailing-whitespace",
                Category::Style,
                Severity::Low,
                RuleKind::Pattern(r"[ \t]+$".into()),
                "trailing whitespace",
                true,
                Some(String::new()),
            ),
        ];
        Catalog { rules }
    }

    /// Build the catalog: built-ins, then rules from `rules_dir` (sorted by
    /// file path), then integrity validation.
    pub fn load(rules_dir: Option<&Path>) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::builtin();
        if let Some(dir) = rules_dir {
            catalog.rules.extend(load_rule_dir(dir)?);
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Apply per-rule config tuning: `enabled = false` removes a rule,
    /// `severity` replaces it, `max_lines` replaces a length threshold.
    /// Ids in `autofix` become auto-applicable when the rule has a fix
    /// template; unknown ids are ignored for forward compatibility.
    pub fn with_tuning(
        mut self,
        tuning: &BTreeMap<String, RuleTuning>,
        autofix: &[String],
    ) -> Catalog {
        self.rules.retain(|r| {
            tuning
                .get(&r.id)
                .and_then(|t| t.enabled)
                .unwrap_or(true)
        });
        for rule in &mut self.rules {
            if let Some(t) = tuning.get(&rule.id) {
                if let Some(sev) = t.severity {
                    rule.severity = sev;
                }
                if let Some(max) = t.max_lines {
                    match &mut rule.kind {
                        RuleKind::MaxFileLines(n) | RuleKind::MaxFunctionLines(n) => *n = max,
                        RuleKind::Pattern(_) => {}
                    }
                }
            }
            if rule.has_fix() && autofix.iter().any(|id| *id == rule.id) {
                rule.autofixable = true;
            }
        }
        self
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(CatalogError::DuplicateRule(rule.id.clone()));
            }
        }
        Ok(())
    }
}

fn rule(
    id: &str,
    category: Category,
    severity: Severity,
    kind: RuleKind,
    message: &str,
    autofixable: bool,
    fix: Option<String>,
) -> Rule {
    Rule {
        id: id.into(),
        category,
        severity,
        kind,
        message: message.into(),
        autofixable,
        fix,
    }
}

/// Parse every `*.toml|yaml|yml` under `dir` into rules, sorted by path so
/// catalog order is stable across platforms.
fn load_rule_dir(dir: &Path) -> Result<Vec<Rule>, CatalogError> {
    let mut rules = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CatalogError::UnreadableDir {
            path: dir.to_string_lossy().to_string(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk error")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => "TOML",
            Some("yaml") | Some("yml") => "YAML",
            _ => continue,
        };
        let text = fs::read_to_string(path).map_err(|e| CatalogError::UnreadableFile {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: RuleFile = if format == "TOML" {
            toml::from_str(&text).map_err(|e| CatalogError::MalformedFile {
                path: path.to_string_lossy().to_string(),
                format,
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|e| CatalogError::MalformedFile {
                path: path.to_string_lossy().to_string(),
                format,
                message: e.to_string(),
            })?
        };
        for rec in file.rules {
            let category =
                Category::parse(&rec.category).ok_or_else(|| CatalogError::InvalidCategory {
                    rule: rec.id.clone(),
                    category: rec.category.clone(),
                })?;
            rules.push(Rule {
                id: rec.id,
                category,
                severity: rec.severity,
                kind: RuleKind::Pattern(rec.pattern),
                message: rec
                    .message
                    .unwrap_or_else(|| "rule matched".to_string()),
                autofixable: rec.autofixable,
                fix: rec.fix,
            });
        }
    }
    Ok(rules)
}
