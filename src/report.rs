//! Finding aggregation into a `ScanReport`.
//!
//! The reporter serializes results after the parallel matching phase: it
//! drops findings below the severity floor, imposes the canonical order
//! (file, line, rule id, column), and builds summary buckets ordered by
//! severity rank then the catalog's category declaration order. Summary
//! counts are derived from the retained findings, so they always agree
//! with the finding list.

use crate::catalog::Catalog;
use crate::models::rule::{Category, Severity};
use crate::models::{Bucket, Finding, ScanNote, ScanReport, Summary};
use std::collections::BTreeMap;

/// Build the report for one scan invocation.
///
/// `min_severity` is the threshold floor; findings below it are dropped
/// before any counting so the summary and the list always describe the
/// same set.
pub fn aggregate(
    mut findings: Vec<Finding>,
    notes: Vec<ScanNote>,
    catalog: &Catalog,
    min_severity: Severity,
    files_scanned: usize,
    files_skipped: usize,
) -> ScanReport {
    findings.retain(|f| f.severity.at_least(min_severity));
    findings.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.rule.cmp(&b.rule))
            .then_with(|| a.col.cmp(&b.col))
    });

    let mut critical = 0;
    let mut high = 0;
    let mut medium = 0;
    let mut low = 0;
    for f in &findings {
        match f.severity {
            Severity::Critical => critical += 1,
            Severity::High => high += 1,
            Severity::Medium => medium += 1,
            Severity::Low => low += 1,
        }
    }

    let order = category_order(catalog);
    let rank = |c: Category| order.iter().position(|x| *x == c).unwrap_or(usize::MAX);
    let mut grouped: BTreeMap<(u8, usize), (Severity, Category, usize)> = BTreeMap::new();
    for f in &findings {
        let key = (f.severity.rank(), rank(f.category));
        grouped
            .entry(key)
            .and_modify(|(_, _, n)| *n += 1)
            .or_insert((f.severity, f.category, 1));
    }
    let buckets = grouped
        .into_values()
        .map(|(severity, category, count)| Bucket {
            severity,
            category,
            count,
        })
        .collect();

    ScanReport {
        findings,
        notes,
        summary: Summary {
            critical,
            high,
            medium,
            low,
            buckets,
            files_scanned,
            files_skipped,
        },
    }
}

/// Categories in the order they first appear in the catalog. Bucket order
/// follows this, not the alphabet, so reports are stable run to run.
fn category_order(catalog: &Catalog) -> Vec<Category> {
    let mut seen: Vec<Category> = Vec::new();
    for rule in catalog.rules() {
        if !seen.contains(&rule.category) {
            seen.push(rule.category);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(file: &str, line: usize, rule: &str, severity: Severity, category: Category) -> Finding {
        Finding {
            rule: rule.to_string(),
            category,
            severity,
            file: file.to_string(),
            line,
            col: 1,
            matched: String::new(),
            message: String::new(),
        }
    }

    #[test]
    fn test_canonical_sort_across_files() {
        let findings = vec![
            mk("src/b.ts", 2, "no-any", Severity::High, Category::TypeSafety),
            mk("src/a.ts", 9, "no-eval", Severity::Critical, Category::Security),
            mk("src/a.ts", 2, "no-var", Severity::Medium, Category::Immutability),
            mk("src/a.ts", 2, "no-any", Severity::High, Category::TypeSafety),
        ];
        let report = aggregate(
            findings,
            vec![],
            &Catalog::builtin(),
            Severity::Low,
            2,
            0,
        );
        let keys: Vec<_> = report
            .findings
            .iter()
            .map(|f| (f.file.as_str(), f.line, f.rule.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("src/a.ts", 2, "no-any"),
                ("src/a.ts", 2, "no-var"),
                ("src/a.ts", 9, "no-eval"),
                ("src/b.ts", 2, "no-any"),
            ]
        );
    }

    #[test]
    fn test_summary_counts_match_findings() {
        let findings = vec![
            mk("a", 1, "no-eval", Severity::Critical, Category::Security),
            mk("a", 2, "no-any", Severity::High, Category::TypeSafety),
            mk("a", 3, "no-any", Severity::High, Category::TypeSafety),
            mk("a", 4, "no-console", Severity::Low, Category::Style),
        ];
        let report = aggregate(
            findings,
            vec![],
            &Catalog::builtin(),
            Severity::Low,
            1,
            0,
        );
        assert_eq!(report.summary.critical, 1);
        assert_eq!(report.summary.high, 2);
        assert_eq!(report.summary.low, 1);
        assert_eq!(report.summary.total(), report.findings.len());
        let bucket_total: usize = report.summary.buckets.iter().map(|b| b.count).sum();
        assert_eq!(bucket_total, report.findings.len());
    }

    #[test]
    fn test_buckets_follow_severity_then_catalog_order() {
        // style is declared after type-safety in the builtin catalog, so
        // within one severity the type-safety bucket comes first.
        let findings = vec![
            mk("a", 1, "x", Severity::Low, Category::Style),
            mk("a", 2, "y", Severity::Low, Category::TypeSafety),
            mk("a", 3, "z", Severity::Critical, Category::Security),
        ];
        let report = aggregate(
            findings,
            vec![],
            &Catalog::builtin(),
            Severity::Low,
            1,
            0,
        );
        let order: Vec<_> = report
            .summary
            .buckets
            .iter()
            .map(|b| (b.severity, b.category))
            .collect();
        assert_eq!(
            order,
            vec![
                (Severity::Critical, Category::Security),
                (Severity::Low, Category::TypeSafety),
                (Severity::Low, Category::Style),
            ]
        );
    }

    #[test]
    fn test_threshold_floor_drops_lower_severities() {
        let findings = vec![
            mk("a", 1, "w", Severity::Critical, Category::Security),
            mk("a", 2, "x", Severity::High, Category::TypeSafety),
            mk("a", 3, "y", Severity::Medium, Category::Style),
            mk("a", 4, "z", Severity::Low, Category::Style),
        ];
        let report = aggregate(
            findings,
            vec![],
            &Catalog::builtin(),
            Severity::High,
            1,
            0,
        );
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.summary.medium, 0);
        assert_eq!(report.summary.low, 0);
    }

    #[test]
    fn test_thresholds_produce_nested_sets() {
        let findings = vec![
            mk("a", 1, "w", Severity::Critical, Category::Security),
            mk("a", 2, "x", Severity::High, Category::TypeSafety),
            mk("a", 3, "y", Severity::Medium, Category::Style),
            mk("a", 4, "z", Severity::Low, Category::Style),
        ];
        let catalog = Catalog::builtin();
        let mut previous: Option<Vec<Finding>> = None;
        for floor in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            let report = aggregate(findings.clone(), vec![], &catalog, floor, 1, 0);
            if let Some(prev) = &previous {
                for f in prev {
                    assert!(report.findings.contains(f), "stricter floor lost a finding");
                }
            }
            previous = Some(report.findings);
        }
    }
}
