//! Rule schema: detection rules, categories, and severities.
//!
//! The catalog is an ordered collection of `Rule`s. Categories are a closed
//! enumeration. Rule files on disk deserialize into `RuleRecord`s with the
//! category kept as a raw string so catalog loading can reject unknown
//! categories with a dedicated error instead of a generic parse failure.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Finding severity, most severe first.
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities in display order (most severe first).
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Rank for ordering; 0 is the most severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    /// True when `self` is at least as severe as `floor`.
    pub fn at_least(self, floor: Severity) -> bool {
        self.rank() <= floor.rank()
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Closed category set. The reporter groups buckets by the order categories
/// first appear in the catalog, not by this declaration order.
pub enum Category {
    TypeSafety,
    ErrorHandling,
    Immutability,
    Security,
    Performance,
    Architecture,
    Style,
}

impl Category {
    /// All known categories.
    pub const ALL: [Category; 7] = [
        Category::TypeSafety,
        Category::ErrorHandling,
        Category::Immutability,
        Category::Security,
        Category::Performance,
        Category::Architecture,
        Category::Style,
    ];

    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "type-safety" => Some(Category::TypeSafety),
            "error-handling" => Some(Category::ErrorHandling),
            "immutability" => Some(Category::Immutability),
            "security" => Some(Category::Security),
            "performance" => Some(Category::Performance),
            "architecture" => Some(Category::Architecture),
            "style" => Some(Category::Style),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::TypeSafety => "type-safety",
            Category::ErrorHandling => "error-handling",
            Category::Immutability => "immutability",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Architecture => "architecture",
            Category::Style => "style",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// What the matcher runs for a rule.
pub enum RuleKind {
    /// Line-oriented regex; the pattern source is compiled once per scan.
    Pattern(String),
    /// File exceeds a line-count limit. Threshold overridable per rule.
    MaxFileLines(usize),
    /// A function body exceeds a line-count limit. Threshold overridable.
    MaxFunctionLines(usize),
}

#[derive(Debug, Clone)]
/// A single detection rule. Immutable once the catalog is built.
pub struct Rule {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub kind: RuleKind,
    /// Finding message shown to the user.
    pub message: String,
    /// True when the fix may be applied without interactive review.
    pub autofixable: bool,
    /// Replacement template for the matched span. `$1`..`$n` expand capture
    /// groups for `Pattern` rules. A line left empty after replacement is
    /// removed entirely.
    pub fix: Option<String>,
}

impl Rule {
    /// A rule can only be applied mechanically when it has a template.
    pub fn has_fix(&self) -> bool {
        self.fix.is_some()
    }
}

#[derive(Debug, Deserialize)]
/// On-disk rule-set file (TOML or YAML).
pub struct RuleFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
}

#[derive(Debug, Deserialize)]
/// One rule entry from a rule-set file. Category stays a string so the
/// catalog can report `InvalidCategory` with the offending rule id.
pub struct RuleRecord {
    pub id: String,
    pub category: String,
    pub severity: Severity,
    pub pattern: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub autofixable: bool,
    #[serde(default)]
    pub fix: Option<String>,
}
