//! Fatal error types. Everything else (walk, match, fix-validation, write
//! failures) is isolated to its file/rule/finding and surfaces as a
//! `ScanNote` in the report rather than an error.

use thiserror::Error;

#[derive(Debug, Error)]
/// Settings problems. Always fatal before scanning starts.
pub enum ConfigError {
    #[error("config file not readable: {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid {format}: {path}: {message}")]
    Malformed {
        path: String,
        format: &'static str,
        message: String,
    },

    #[error("invalid {field} '{value}' (expected one of: {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
/// Catalog integrity problems. Fatal: a broken catalog never scans.
pub enum CatalogError {
    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("rule '{rule}' has unknown category '{category}'")]
    InvalidCategory { rule: String, category: String },

    #[error("rule file not readable: {path}: {source}")]
    UnreadableFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rule file is not valid {format}: {path}: {message}")]
    MalformedFile {
        path: String,
        format: &'static str,
        message: String,
    },

    #[error("rules directory not readable: {path}: {source}")]
    UnreadableDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
