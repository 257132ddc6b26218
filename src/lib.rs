//! Slopscan core library.
//!
//! This crate exposes programmatic APIs for scanning source trees against a
//! rule catalog and applying guided fixes, mirroring the `slopscan` binary.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective settings resolution.
//! - `catalog`: Built-in rule catalog plus project rule files.
//! - `walker`: File collection with ignore globs and binary sniffing.
//! - `matcher`: Per-line pattern matching and size metrics.
//! - `scan`: Parallel scan pass producing a report.
//! - `fix`: Guided fix pass with validation and atomic writes.
//! - `report`: Canonical ordering and summary aggregation.
//! - `models`: Data models for rules, findings, notes, and reports.
//! - `output`: Human/JSON printers for reports and the rule listing.
//! - `utils`: Supporting helpers.
//! - `error`: Error types for configuration and catalog loading.
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod fix;
pub mod matcher;
pub mod models;
pub mod output;
pub mod report;
pub mod scan;
pub mod utils;
pub mod walker;
