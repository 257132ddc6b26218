//! Configuration discovery and effective settings resolution.
//!
//! slopscan reads `slopscan.toml|yaml|yml` from the scan root (or closest
//! ancestor) and merges it with CLI flags to produce `Settings`.
//! Defaults:
//! - `threshold`: `brutal` (every severity reported)
//! - `fail_on`: `high`
//! - `output`: `human`
//! - `ignore`: built-in defaults (`.git`, `node_modules`, `target`, ...)
//!
//! Overrides precedence: CLI > config file > defaults. Unrecognized fields
//! are ignored so older binaries keep reading newer configs; a missing file
//! means full defaults; a malformed file is fatal.

use crate::error::ConfigError;
use crate::models::rule::Severity;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Globs excluded from every scan, before config/CLI additions.
pub const DEFAULT_IGNORES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/vendor/**",
    "**/*.min.js",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reporting strictness. Each tier maps to a minimum severity, so the set
/// of findings at one tier is a subset of the next stricter tier's.
pub enum Threshold {
    Relaxed,
    Balanced,
    Nitpicky,
    Brutal,
}

impl Threshold {
    pub fn min_severity(self) -> Severity {
        match self {
            Threshold::Relaxed => Severity::Critical,
            Threshold::Balanced => Severity::High,
            Threshold::Nitpicky => Severity::Medium,
            Threshold::Brutal => Severity::Low,
        }
    }

    pub fn parse(s: &str) -> Option<Threshold> {
        match s {
            "relaxed" => Some(Threshold::Relaxed),
            "balanced" => Some(Threshold::Balanced),
            "nitpicky" => Some(Threshold::Nitpicky),
            "brutal" => Some(Threshold::Brutal),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Per-rule tuning section under `[rules.<id>]`.
pub struct RuleTuning {
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
    /// Limit override for the length-based rules.
    pub max_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `slopscan.toml|yaml|yml`.
pub struct FileConfig {
    pub threshold: Option<String>,
    pub fail_on: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Rule ids whose fixes apply without per-finding review. Extends the
    /// autofixable flags carried by the rules themselves.
    #[serde(default)]
    pub autofix: Vec<String>,
    pub rules_dir: Option<String>,
    #[serde(default)]
    pub rules: Option<BTreeMap<String, RuleTuning>>, // [rules.<id>]
}

#[derive(Debug, Clone)]
/// Fully-resolved settings used by commands after applying precedence.
pub struct Settings {
    /// Scan root: the CLI path when given, else the detected repository root.
    pub root: PathBuf,
    pub threshold: Threshold,
    /// Severity floor for the non-zero exit gate.
    pub fail_on: Severity,
    pub output: String,
    pub ignore: Vec<String>,
    pub autofix: Vec<String>,
    pub rules_dir: Option<PathBuf>,
    pub tuning: BTreeMap<String, RuleTuning>,
    /// False when no config file was found and defaults are in effect.
    pub config_found: bool,
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops when a `slopscan.toml|yaml|yml` or a `.git` directory is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    // Walk up to find config or .git; else return start
    let mut cur = start;
    loop {
        if config_file_in(cur).is_some() || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

fn config_file_in(dir: &Path) -> Option<PathBuf> {
    for name in ["slopscan.toml", "slopscan.yaml", "slopscan.yml"] {
        let p = dir.join(name);
        if p.is_file() {
            return Some(p);
        }
    }
    None
}

/// Load one config file, keyed by extension: `.yaml|.yml` parse as YAML,
/// anything else as TOML.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if yaml {
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Malformed {
            path: path.to_string_lossy().to_string(),
            format: "YAML",
            message: e.to_string(),
        })
    } else {
        toml::from_str(&text).map_err(|e| ConfigError::Malformed {
            path: path.to_string_lossy().to_string(),
            format: "TOML",
            message: e.to_string(),
        })
    }
}

/// Find and load the nearest config file at or above `start`.
fn discover_config(start: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let mut cur = start;
    loop {
        if let Some(path) = config_file_in(cur) {
            return load_config_file(&path).map(Some);
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return Ok(None),
        }
    }
}

/// Resolve `Settings` by merging CLI flags, the discovered config file, and
/// defaults.
pub fn resolve_settings(
    cli_path: Option<&str>,
    cli_config: Option<&str>,
    cli_threshold: Option<&str>,
    cli_fail_on: Option<&str>,
    cli_output: Option<&str>,
    cli_rules_dir: Option<&str>,
    cli_ignore: &[String],
) -> Result<Settings, ConfigError> {
    let root = match cli_path {
        Some(p) => PathBuf::from(p),
        None => {
            // Relative "." has no parents to walk; start from the real cwd
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            detect_repo_root(&cwd)
        }
    };

    let cfg = match cli_config {
        Some(p) => Some(load_config_file(Path::new(p))?),
        None => {
            let abs = if root.is_absolute() {
                root.clone()
            } else {
                std::env::current_dir()
                    .map(|c| c.join(&root))
                    .unwrap_or_else(|_| root.clone())
            };
            discover_config(&abs)?
        }
    };
    let config_found = cfg.is_some();
    let cfg = cfg.unwrap_or_default();

    let threshold_src = cli_threshold
        .map(|s| s.to_string())
        .or(cfg.threshold)
        .unwrap_or_else(|| "brutal".to_string());
    let threshold = Threshold::parse(&threshold_src).ok_or_else(|| ConfigError::InvalidValue {
        field: "threshold",
        value: threshold_src.clone(),
        expected: "relaxed, balanced, nitpicky, brutal",
    })?;

    let fail_on_src = cli_fail_on
        .map(|s| s.to_string())
        .or(cfg.fail_on)
        .unwrap_or_else(|| "high".to_string());
    let fail_on = Severity::parse(&fail_on_src).ok_or_else(|| ConfigError::InvalidValue {
        field: "fail_on",
        value: fail_on_src.clone(),
        expected: "critical, high, medium, low",
    })?;

    let output = cli_output
        .map(|s| s.to_string())
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());
    if output != "human" && output != "json" {
        return Err(ConfigError::InvalidValue {
            field: "output",
            value: output,
            expected: "human, json",
        });
    }

    let mut ignore: Vec<String> = DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();
    ignore.extend(cfg.ignore);
    ignore.extend(cli_ignore.iter().cloned());

    let rules_dir = cli_rules_dir
        .map(|s| s.to_string())
        .or(cfg.rules_dir)
        .map(|d| {
            let p = PathBuf::from(&d);
            if p.is_absolute() {
                p
            } else {
                root.join(p)
            }
        });

    Ok(Settings {
        root,
        threshold,
        fail_on,
        output,
        ignore,
        autofix: cfg.autofix,
        rules_dir,
        tuning: cfg.rules.unwrap_or_default(),
        config_found,
    })
}
