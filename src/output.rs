//! Output rendering for scan reports and the rule listing.
//!
//! Supports `human` (default) and `json` outputs. JSON shapes come from
//! pure compose helpers so tests can pin them without capturing stdout.

use crate::catalog::Catalog;
use crate::models::rule::RuleKind;
use crate::models::rule::Severity;
use crate::models::{NoteStage, ScanNote, ScanReport};
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Print a scan report in the requested format.
pub fn print_report(report: &ScanReport, output: &str) {
    match output {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_scan_json(report)).unwrap()
        ),
        _ => {
            let color = use_colors(output);
            for f in &report.findings {
                let icon = severity_icon(f.severity, color);
                let tag = severity_tag(f.severity, color);
                let loc = format!("{}:{}:{}", f.file, f.line, f.col);
                let loc = if color { loc.bold().to_string() } else { loc };
                println!("{} {} {} ❲{}❳ — {}", icon, tag, loc, f.rule, f.message);
            }
            for n in &report.notes {
                println!("{}", format_note(n, color));
            }
            let s = &report.summary;
            let summary = format!(
                "— Summary — critical={} high={} medium={} low={} files={} skipped={}",
                s.critical, s.high, s.medium, s.low, s.files_scanned, s.files_skipped
            );
            if color {
                println!("{}", summary.bold());
            } else {
                println!("{}", summary);
            }
            for b in &s.buckets {
                println!("  {}/{}: {}", b.severity, b.category, b.count);
            }
        }
    }
}

/// Print the rule catalog in the requested format.
pub fn print_rules(catalog: &Catalog, output: &str) {
    match output {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_rules_json(catalog)).unwrap()
        ),
        _ => {
            let color = use_colors(output);
            for r in catalog.rules() {
                let tag = severity_tag(r.severity, color);
                let auto = if r.autofixable {
                    " (autofix)"
                } else if r.has_fix() {
                    " (fix template)"
                } else {
                    ""
                };
                println!("{} {} {}{} — {}", tag, r.id, r.category, auto, r.message);
            }
        }
    }
}

fn severity_icon(sev: Severity, color: bool) -> String {
    let raw = match sev {
        Severity::Critical => "✖",
        Severity::High => "▲",
        Severity::Medium => "◆",
        Severity::Low => "·",
    };
    if !color {
        return raw.to_string();
    }
    match sev {
        Severity::Critical => raw.red().to_string(),
        Severity::High => raw.yellow().to_string(),
        Severity::Medium => raw.blue().to_string(),
        Severity::Low => raw.bright_black().to_string(),
    }
}

fn severity_tag(sev: Severity, color: bool) -> String {
    let raw = format!("⟦{}⟧", sev);
    if !color {
        return raw;
    }
    match sev {
        Severity::Critical => raw.red().bold().to_string(),
        Severity::High => raw.yellow().bold().to_string(),
        Severity::Medium => raw.blue().bold().to_string(),
        Severity::Low => raw.bright_black().bold().to_string(),
    }
}

fn format_note(n: &ScanNote, color: bool) -> String {
    let stage = match n.stage {
        NoteStage::Walk => "walk",
        NoteStage::Match => "match",
        NoteStage::Fix => "fix",
        NoteStage::Write => "write",
        NoteStage::Scan => "scan",
    };
    let head = format!("⚠ ⟦{}⟧", stage);
    let head = if color {
        head.magenta().to_string()
    } else {
        head
    };
    let mut ctx = String::new();
    if let Some(file) = &n.file {
        ctx.push_str(&format!(" {}", file));
    }
    if let Some(rule) = &n.rule {
        ctx.push_str(&format!(" ❲{}❳", rule));
    }
    format!("{}{} — {}", head, ctx, n.message)
}

/// Print fix-pass notes and counters to stderr, leaving stdout for the
/// report that follows.
pub fn print_fix_summary(fixed: &crate::fix::FixReport, output: &str) {
    let color = use_colors(output);
    for n in &fixed.notes {
        eprintln!("{}", format_note(n, color));
    }
    let s = &fixed.stats;
    eprintln!(
        "{} fixes: applied={} skipped={} marked={} failed={} files changed={}",
        crate::utils::info_prefix(),
        s.applied,
        s.skipped,
        s.marked,
        s.failed,
        s.files_changed
    );
}

/// Compose the scan JSON object (pure) for testing/snapshot purposes.
pub fn compose_scan_json(report: &ScanReport) -> JsonVal {
    // Directly serialize ScanReport as JSON, keeping stable shape
    serde_json::to_value(report).unwrap()
}

/// Compose the rule-listing JSON object (pure) for testing/snapshot
/// purposes.
pub fn compose_rules_json(catalog: &Catalog) -> JsonVal {
    let items: Vec<_> = catalog
        .rules()
        .iter()
        .map(|r| {
            let kind = match &r.kind {
                RuleKind::Pattern(p) => json!({ "pattern": p }),
                RuleKind::MaxFileLines(n) => json!({ "max_file_lines": n }),
                RuleKind::MaxFunctionLines(n) => json!({ "max_function_lines": n }),
            };
            json!({
                "id": r.id,
                "category": r.category.to_string(),
                "severity": r.severity.to_string(),
                "autofixable": r.autofixable,
                "fixable": r.has_fix(),
                "kind": kind,
                "message": r.message,
            })
        })
        .collect();
    json!({"rules": items, "total": catalog.rules().len()})
}
