//! Fix application.
//!
//! Each finding moves `Pending -> {Applied, Skipped, MarkedIntentional}`.
//! Autofixable rules apply without review; everything else goes through a
//! decider (the CLI wires an interactive prompt, tests wire closures).
//! Files are processed serially and re-matched after every applied fix, so
//! a fix never acts on stale line numbers. An applied rewrite must pass
//! validation before it sticks: delimiter balance may not change, and a
//! style-category fix may not change the top-level declaration count. A
//! failed validation reverts the buffer and surfaces as a fix-stage note.
//!
//! All accepted edits to one file land in a single atomic write (temp file
//! in the same directory, then rename). Write failures are reported per
//! file and never abort the batch.

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::matcher::{self, delimiter_counts, top_level_units, CompiledRule, ALLOW_MARKER};
use crate::models::rule::{Category, Severity};
use crate::models::{Finding, NoteStage, ScanNote};
use crate::scan::CancelToken;
use crate::utils::display_path;
use crate::walker::{self, IgnoreSet};
use similar::TextDiff;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use tempfile::NamedTempFile;

/// Extra applies allowed beyond the initially matched count before a file
/// is declared non-convergent.
const FIX_APPLY_SLACK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-finding choice during the review loop.
pub enum FixDecision {
    Apply,
    Skip,
    MarkIntentional,
}

/// Chooses what to do with a non-autofixable finding. The diff preview is
/// present only when the rule carries a fix template.
pub type Decider<'a> = dyn FnMut(&Finding, Option<&str>) -> FixDecision + 'a;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixStats {
    pub applied: usize,
    pub skipped: usize,
    pub marked: usize,
    pub failed: usize,
    pub files_changed: usize,
}

#[derive(Debug)]
pub struct FixReport {
    pub stats: FixStats,
    pub notes: Vec<ScanNote>,
}

/// Run a fix pass over the tree under `settings.root`.
pub fn run_fix(
    catalog: &Catalog,
    settings: &Settings,
    cancel: &CancelToken,
    decide: &mut Decider<'_>,
) -> Result<FixReport, ConfigError> {
    let ignore = IgnoreSet::new(&settings.ignore)?;
    let (files, mut notes) = walker::collect_files(&settings.root, &ignore);
    let (rules, match_notes) = matcher::prepare(catalog);
    notes.extend(match_notes);

    let min = settings.threshold.min_severity();
    let mut stats = FixStats::default();
    for path in &files {
        if cancel.load(Ordering::Relaxed) {
            notes.push(ScanNote::new(
                NoteStage::Fix,
                "cancelled; remaining files untouched",
            ));
            break;
        }
        fix_file(
            path,
            &settings.root,
            &rules,
            min,
            decide,
            &mut stats,
            &mut notes,
        );
    }
    Ok(FixReport { stats, notes })
}

/// Position of a finding within its file, ordered like the matcher output.
type FixKey = (usize, String, usize);

fn key(f: &Finding) -> FixKey {
    (f.line, f.rule.clone(), f.col)
}

fn fix_file(
    path: &Path,
    root: &Path,
    rules: &[CompiledRule],
    min: Severity,
    decide: &mut Decider<'_>,
    stats: &mut FixStats,
    notes: &mut Vec<ScanNote>,
) {
    let rel = display_path(path, root);
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            notes.push(ScanNote::new(NoteStage::Fix, e.to_string()).with_file(rel));
            return;
        }
    };
    if walker::is_binary(&bytes) {
        return;
    }
    // Rewrites must round-trip every byte outside the fixed spans. Lossy
    // decoding would fold invalid sequences into U+FFFD on untouched lines,
    // so files that are not valid UTF-8 are left alone.
    let original = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => {
            notes.push(
                ScanNote::new(NoteStage::Fix, "not valid UTF-8; left untouched")
                    .with_file(rel),
            );
            return;
        }
    };
    let mut content = original.clone();

    // `cursor` is the last handled position; only findings beyond it are
    // offered, so a skipped finding is never re-offered after later edits
    // shift the buffer.
    let mut cursor: Option<FixKey> = None;
    let initial = matcher::match_file(&rel, &content, rules)
        .iter()
        .filter(|f| f.severity.at_least(min))
        .count();
    let max_applies = initial * 2 + FIX_APPLY_SLACK;
    let mut applies = 0usize;
    loop {
        let findings = matcher::match_file(&rel, &content, rules);
        let candidate = findings
            .into_iter()
            .filter(|f| f.severity.at_least(min))
            .find(|f| cursor.as_ref().map_or(true, |c| key(f) > *c));
        let Some(f) = candidate else { break };
        let k = key(&f);
        let rule = match rules.iter().find(|r| r.rule.id == f.rule) {
            Some(r) => r,
            None => {
                cursor = Some(k);
                continue;
            }
        };

        let rewrite = rule
            .rule
            .fix
            .as_deref()
            .and_then(|tpl| rewrite_line(&content, &f, rule, tpl));

        let decision = if rule.rule.autofixable && rewrite.is_some() {
            FixDecision::Apply
        } else {
            let diff = rewrite
                .as_ref()
                .map(|r| line_diff(&f, r));
            decide(&f, diff.as_deref())
        };

        match decision {
            FixDecision::Apply => {
                let Some(rewrite) = rewrite else {
                    notes.push(
                        ScanNote::new(NoteStage::Fix, "rule has no fix template")
                            .with_file(&f.file)
                            .with_rule(&f.rule),
                    );
                    stats.skipped += 1;
                    cursor = Some(k);
                    continue;
                };
                if rewrite.content == content {
                    notes.push(
                        ScanNote::new(NoteStage::Fix, "fix leaves the match in place; skipped")
                            .with_file(&f.file)
                            .with_rule(&f.rule),
                    );
                    stats.failed += 1;
                    cursor = Some(k);
                    continue;
                }
                applies += 1;
                if applies > max_applies {
                    notes.push(
                        ScanNote::new(
                            NoteStage::Fix,
                            "fixes do not converge; remaining findings left for review",
                        )
                        .with_file(&f.file)
                        .with_rule(&f.rule),
                    );
                    stats.failed += 1;
                    break;
                }
                match validate(&content, &rewrite.content, rule.rule.category) {
                    Ok(()) => {
                        content = rewrite.content;
                        stats.applied += 1;
                        // re-offer the same line: other rules there are
                        // recomputed against the new text
                        cursor = Some((f.line, String::new(), 0));
                    }
                    Err(reason) => {
                        notes.push(
                            ScanNote::new(NoteStage::Fix, reason)
                                .with_file(&f.file)
                                .with_rule(&f.rule),
                        );
                        stats.failed += 1;
                        cursor = Some(k);
                    }
                }
            }
            FixDecision::Skip => {
                stats.skipped += 1;
                cursor = Some(k);
            }
            FixDecision::MarkIntentional => {
                content = mark_intentional(&content, f.line, &f.rule);
                stats.marked += 1;
                cursor = Some(k);
            }
        }
    }

    if content != original {
        match write_atomic(path, &content) {
            Ok(()) => stats.files_changed += 1,
            Err(e) => {
                notes.push(
                    ScanNote::new(NoteStage::Write, e.to_string()).with_file(&rel),
                );
            }
        }
    }
}

struct Rewrite {
    content: String,
    old_line: String,
    new_line: Option<String>,
}

/// Apply `template` to the finding's span. Returns the whole-file result;
/// a line whose code is emptied by the rewrite is removed entirely.
fn rewrite_line(content: &str, f: &Finding, rule: &CompiledRule, template: &str) -> Option<Rewrite> {
    let re = rule.regex()?;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let line = lines.get(f.line.saturating_sub(1))?.clone();

    let caps = re
        .captures_iter(&line)
        .find(|c| c.get(0).map(|m| m.start() + 1) == Some(f.col))?;
    let span = caps.get(0)?;
    let mut expansion = String::new();
    caps.expand(template, &mut expansion);
    let new_line = format!("{}{}{}", &line[..span.start()], expansion, &line[span.end()..]);

    let drop_line = !line.trim().is_empty() && new_line.trim().is_empty();
    if drop_line {
        lines.remove(f.line - 1);
    } else {
        lines[f.line - 1] = new_line.clone();
    }
    Some(Rewrite {
        content: rebuild(&lines, content),
        old_line: line,
        new_line: if drop_line { None } else { Some(new_line) },
    })
}

fn rebuild(lines: &[String], original: &str) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let sep = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = lines.join(sep);
    if original.ends_with('\n') {
        out.push_str(sep);
    }
    out
}

/// Post-fix validation: the abstract "still parses" check of the textual
/// tier. Delimiter balance must be unchanged for every rule; style rules
/// additionally may not change the top-level declaration count.
fn validate(before: &str, after: &str, category: Category) -> Result<(), String> {
    if delimiter_counts(before) != delimiter_counts(after) {
        return Err("fix changes delimiter balance; reverted".to_string());
    }
    if category == Category::Style && top_level_units(before) != top_level_units(after) {
        return Err("fix changes top-level declarations; reverted".to_string());
    }
    Ok(())
}

fn line_diff(f: &Finding, rewrite: &Rewrite) -> String {
    let old = format!("{}\n", rewrite.old_line);
    let new = match &rewrite.new_line {
        Some(l) => format!("{l}\n"),
        None => String::new(),
    };
    let diff = TextDiff::from_lines(&old, &new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        out.push_str(&format!("{}:{} {}{}", f.file, f.line, sign, change));
    }
    out
}

/// Append (or extend) the allow marker so the matcher treats this line as
/// reviewed. The next scan suppresses the rule here.
fn mark_intentional(content: &str, line_no: usize, rule_id: &str) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    if let Some(line) = lines.get_mut(line_no.saturating_sub(1)) {
        if line.contains(ALLOW_MARKER) {
            *line = line.replacen(ALLOW_MARKER, &format!("{ALLOW_MARKER} {rule_id}"), 1);
        } else {
            *line = format!("{line} // {ALLOW_MARKER} {rule_id}");
        }
    }
    rebuild(&lines, content)
}

/// Write through a temp file in the same directory, then rename over the
/// target, so a crash or failed validation never leaves a truncated file.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Interactive decider for the CLI: shows the finding (and diff when one
/// exists) on stderr and reads a/s/i from stdin. EOF means skip.
pub fn prompt_decision(finding: &Finding, diff: Option<&str>) -> FixDecision {
    eprintln!(
        "{}:{}:{} [{}] {}",
        finding.file, finding.line, finding.col, finding.rule, finding.message
    );
    if let Some(d) = diff {
        eprint!("{d}");
    }
    let options = if diff.is_some() {
        "[a]pply / [s]kip / [i]ntentional"
    } else {
        "[s]kip / [i]ntentional"
    };
    loop {
        eprint!("{options} > ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => return FixDecision::Skip,
            Ok(_) => {}
        }
        match line.trim() {
            "a" | "apply" if diff.is_some() => return FixDecision::Apply,
            "s" | "skip" => return FixDecision::Skip,
            "i" | "intentional" | "mark" => return FixDecision::MarkIntentional,
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleTuning, Threshold, DEFAULT_IGNORES};
    use crate::scan;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn settings(root: PathBuf, threshold: Threshold) -> Settings {
        Settings {
            root,
            threshold,
            fail_on: Severity::High,
            output: "human".to_string(),
            ignore: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            autofix: vec![],
            rules_dir: None,
            tuning: BTreeMap::new(),
            config_found: false,
        }
    }

    fn no_prompts() -> impl FnMut(&Finding, Option<&str>) -> FixDecision {
        |f: &Finding, _: Option<&str>| panic!("unexpected prompt for {}", f.rule)
    }

    #[test]
    fn test_autofix_removes_console_line_and_converges() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("a.js"),
            "const a = 1;\nconsole.log(\"debug\")\nconst b = 2;\n",
        )
        .unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.applied, 1);
        assert_eq!(report.stats.files_changed, 1);
        assert_eq!(
            fs::read_to_string(root.join("a.js")).unwrap(),
            "const a = 1;\nconst b = 2;\n"
        );

        // the applied fix eliminated its finding
        let rescan = scan::run_scan(&catalog, &cfg, &scan::cancel_token()).unwrap();
        assert!(!rescan.findings.iter().any(|f| f.rule == "no-console"));

        // and a second fix run has nothing to do
        let mut decide = no_prompts();
        let again = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(again.stats.applied, 0);
        assert_eq!(again.stats.files_changed, 0);
    }

    #[test]
    fn test_console_fix_leaves_trailing_statement() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.js"), "console.log(a); doWork();\n").unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.applied, 1);
        assert_eq!(
            fs::read_to_string(root.join("a.js")).unwrap(),
            " doWork();\n"
        );
    }

    #[test]
    fn test_template_rewrite_replaces_span() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.js"), "var x = 1;\n").unwrap();

        // no-var carries a template but applies only when configured
        let catalog = Catalog::builtin().with_tuning(&BTreeMap::new(), &["no-var".to_string()]);
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.applied, 1);
        assert_eq!(
            fs::read_to_string(root.join("a.js")).unwrap(),
            "let x = 1;\n"
        );
    }

    #[test]
    fn test_non_utf8_file_is_left_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        // Latin-1 byte in a comment: passes the NUL sniff but is not UTF-8.
        let raw: &[u8] = b"// caf\xe9 legacy header\nconsole.log(\"debug\")\n";
        fs::write(root.join("a.js"), raw).unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();

        assert_eq!(report.stats.applied, 0);
        assert_eq!(report.stats.files_changed, 0);
        assert!(report.notes.iter().any(|n| {
            n.stage == NoteStage::Fix
                && n.file.as_deref() == Some("a.js")
                && n.message.contains("UTF-8")
        }));
        // every byte survives, including the one the fix never touched
        assert_eq!(fs::read(root.join("a.js")).unwrap(), raw);
    }

    #[test]
    fn test_skip_and_mark_intentional() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("a.ts"),
            "const x: any = 1;\nconst y: any = 2;\n",
        )
        .unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut calls = 0;
        let mut decide = |f: &Finding, diff: Option<&str>| {
            assert_eq!(f.rule, "no-any");
            assert!(diff.is_none(), "no-any has no fix template");
            calls += 1;
            if calls == 1 {
                FixDecision::Skip
            } else {
                FixDecision::MarkIntentional
            }
        };
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.marked, 1);

        let content = fs::read_to_string(root.join("a.ts")).unwrap();
        assert_eq!(
            content,
            "const x: any = 1;\nconst y: any = 2; // slopscan:allow no-any\n"
        );

        // the marked line is suppressed on the next scan; the skipped one
        // surfaces again
        let rescan = scan::run_scan(&catalog, &cfg, &scan::cancel_token()).unwrap();
        let any_findings: Vec<_> = rescan
            .findings
            .iter()
            .filter(|f| f.rule == "no-any")
            .collect();
        assert_eq!(any_findings.len(), 1);
        assert_eq!(any_findings[0].line, 1);
    }

    #[test]
    fn test_marked_metric_finding_stays_suppressed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "a\nb\nc\nd\ne\n").unwrap();

        let mut tuning = BTreeMap::new();
        tuning.insert(
            "max-file-length".to_string(),
            RuleTuning {
                max_lines: Some(3),
                ..Default::default()
            },
        );
        let catalog = Catalog::builtin().with_tuning(&tuning, &[]);
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = |f: &Finding, _: Option<&str>| {
            assert_eq!(f.rule, "max-file-length");
            FixDecision::MarkIntentional
        };
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.marked, 1);
        assert_eq!(
            fs::read_to_string(root.join("a.ts")).unwrap(),
            "a\nb\nc\nd // slopscan:allow max-file-length\ne\n"
        );

        // the annotation holds on the next scan
        let rescan = scan::run_scan(&catalog, &cfg, &scan::cancel_token()).unwrap();
        assert!(!rescan.findings.iter().any(|f| f.rule == "max-file-length"));
    }

    #[test]
    fn test_unbalanced_rewrite_is_reverted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let rules = root.join("rules");
        fs::create_dir_all(&rules).unwrap();
        fs::write(
            rules.join("team.toml"),
            r#"
[[rules]]
id = "team-strip-open-brace"
category = "style"
severity = "low"
pattern = "\\{"
autofixable = true
fix = ""
"#,
        )
        .unwrap();
        let before = "function f() {\n  return 1;\n}\n";
        fs::write(root.join("a.js"), before).unwrap();

        let catalog = Catalog::load(Some(&rules)).unwrap();
        let mut cfg = settings(root.to_path_buf(), Threshold::Brutal);
        cfg.ignore.push("rules/**".to_string());
        let mut decide = |_: &Finding, _: Option<&str>| FixDecision::Skip;
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();

        assert!(report.stats.failed >= 1);
        assert!(report
            .notes
            .iter()
            .any(|n| n.stage == NoteStage::Fix && n.rule.as_deref() == Some("team-strip-open-brace")));
        assert_eq!(fs::read_to_string(root.join("a.js")).unwrap(), before);
    }

    #[test]
    fn test_style_fix_may_not_drop_declarations() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let rules = root.join("rules");
        fs::create_dir_all(&rules).unwrap();
        fs::write(
            rules.join("team.toml"),
            r#"
[[rules]]
id = "team-strip-const"
category = "style"
severity = "low"
pattern = "^const .*$"
autofixable = true
fix = ""
"#,
        )
        .unwrap();
        let before = "const kept = 1;\n";
        fs::write(root.join("a.js"), before).unwrap();

        let catalog = Catalog::load(Some(&rules)).unwrap();
        let mut cfg = settings(root.to_path_buf(), Threshold::Brutal);
        cfg.ignore.push("rules/**".to_string());
        let mut decide = |_: &Finding, _: Option<&str>| FixDecision::Skip;
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();

        assert_eq!(report.stats.applied, 0);
        assert!(report.stats.failed >= 1);
        assert_eq!(fs::read_to_string(root.join("a.js")).unwrap(), before);
    }

    #[test]
    fn test_fix_loop_handles_line_shifts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("a.js"),
            "console.log(1)\nconsole.log(2)\nconst keep = 1;\n",
        )
        .unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.applied, 2);
        assert_eq!(report.stats.files_changed, 1);
        assert_eq!(
            fs::read_to_string(root.join("a.js")).unwrap(),
            "const keep = 1;\n"
        );
    }

    #[test]
    fn test_threshold_excludes_low_findings_from_fix() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let before = "console.log(1)\n";
        fs::write(root.join("a.js"), before).unwrap();

        // relaxed = critical only; the low-severity console finding is out
        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Relaxed);
        let mut decide = no_prompts();
        let report = run_fix(&catalog, &cfg, &scan::cancel_token(), &mut decide).unwrap();
        assert_eq!(report.stats.applied, 0);
        assert_eq!(fs::read_to_string(root.join("a.js")).unwrap(), before);
    }

    #[test]
    fn test_cancelled_fix_leaves_files_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let before = "console.log(1)\n";
        fs::write(root.join("a.js"), before).unwrap();

        let token = scan::cancel_token();
        token.store(true, Ordering::Relaxed);
        let mut decide = no_prompts();
        let report = run_fix(
            &Catalog::builtin(),
            &settings(root.to_path_buf(), Threshold::Brutal),
            &token,
            &mut decide,
        )
        .unwrap();
        assert_eq!(report.stats.applied, 0);
        assert_eq!(fs::read_to_string(root.join("a.js")).unwrap(), before);
        assert!(report
            .notes
            .iter()
            .any(|n| n.stage == NoteStage::Fix && n.message.contains("cancelled")));
    }

    #[test]
    fn test_mark_extends_existing_marker() {
        let marked = mark_intentional("let x!: any; // slopscan:allow no-any\n", 1, "no-non-null-assertion");
        assert_eq!(
            marked,
            "let x!: any; // slopscan:allow no-non-null-assertion no-any\n"
        );
    }
}
