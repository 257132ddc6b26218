//! Shared data models for scan output: findings, notes, and the report.

pub mod rule;

use rule::{Category, Severity};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A single rule match at a specific file location.
pub struct Finding {
    pub rule: String,
    pub category: Category,
    pub severity: Severity,
    /// Root-relative path with forward slashes.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column of the matched span.
    pub col: usize,
    /// The matched text.
    pub matched: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// Pipeline stage a note originated from.
pub enum NoteStage {
    Walk,
    Match,
    Fix,
    Write,
    Scan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// An annotated non-fatal error. Notes ride along in the report so nothing
/// is silently dropped, and stay distinct from findings.
pub struct ScanNote {
    pub stage: NoteStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
}

impl ScanNote {
    pub fn new(stage: NoteStage, message: impl Into<String>) -> Self {
        ScanNote {
            stage,
            file: None,
            rule: None,
            message: message.into(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Count for one (severity, category) pair. Only non-empty pairs appear.
pub struct Bucket {
    pub severity: Severity,
    pub category: Category,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Aggregated totals used by printers and the exit-code gate.
pub struct Summary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Severity-then-category buckets, ordered by severity rank then the
    /// catalog's category declaration order.
    pub buckets: Vec<Bucket>,
    pub files_scanned: usize,
    pub files_skipped: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }

    pub fn count_at_least(&self, floor: Severity) -> usize {
        Severity::ALL
            .iter()
            .filter(|s| s.at_least(floor))
            .map(|s| match s {
                Severity::Critical => self.critical,
                Severity::High => self.high,
                Severity::Medium => self.medium,
                Severity::Low => self.low,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// The aggregated, sorted output of one scan invocation. Immutable;
/// superseded by a fresh report after any fix pass.
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub notes: Vec<ScanNote>,
    pub summary: Summary,
}
