//! File discovery for the scan root.
//!
//! Walks the tree (following symlinks), prunes ignored directories, drops
//! ignored files, and returns candidates in path order so downstream output
//! is deterministic. Binary detection happens at read time via [`is_binary`]
//! so each candidate is read exactly once.

use crate::error::ConfigError;
use crate::models::{NoteStage, ScanNote};
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Bytes inspected for the NUL heuristic.
const BINARY_SNIFF_LEN: usize = 8192;

/// Compiled ignore globs, matched against root-relative paths.
///
/// A glob ending in `/**` also prunes the directory it names, so ignored
/// trees are never entered.
#[derive(Debug)]
pub struct IgnoreSet {
    files: Vec<Pattern>,
    dirs: Vec<Pattern>,
}

impl IgnoreSet {
    pub fn new(globs: &[String]) -> Result<IgnoreSet, ConfigError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for g in globs {
            let pat = Pattern::new(g).map_err(|_| ConfigError::InvalidValue {
                field: "ignore",
                value: g.clone(),
                expected: "a valid glob pattern",
            })?;
            if let Some(prefix) = g.strip_suffix("/**") {
                dirs.push(Pattern::new(prefix).map_err(|_| ConfigError::InvalidValue {
                    field: "ignore",
                    value: g.clone(),
                    expected: "a valid glob pattern",
                })?);
            }
            dirs.push(pat.clone());
            files.push(pat);
        }
        Ok(IgnoreSet { files, dirs })
    }

    pub fn matches_file(&self, rel: &Path) -> bool {
        self.files.iter().any(|p| p.matches_path(rel))
    }

    pub fn matches_dir(&self, rel: &Path) -> bool {
        self.dirs.iter().any(|p| p.matches_path(rel))
    }
}

/// `true` when `bytes` look like binary content (NUL within the sniff
/// window). Callers pass the full file content; only the head is examined.
pub fn is_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    head.contains(&0)
}

/// Enumerate candidate files under `root` in sorted path order.
///
/// Ignored directories are pruned without being entered. Symlinks are
/// followed; cycles are detected and skipped. Unreadable directories
/// produce a walk-stage note instead of aborting the scan.
pub fn collect_files(
    root: &Path,
    ignore: &IgnoreSet,
) -> (Vec<PathBuf>, Vec<ScanNote>) {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut notes: Vec<ScanNote> = Vec::new();

    let walk = WalkDir::new(root).follow_links(true).into_iter();
    let mut it = walk.filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        let rel = e.path().strip_prefix(root).unwrap_or(e.path());
        !ignore.matches_dir(rel)
    });
    while let Some(entry) = it.next() {
        match entry {
            Ok(e) => {
                if !e.file_type().is_file() {
                    continue;
                }
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                if ignore.matches_file(rel) {
                    continue;
                }
                files.push(e.path().to_path_buf());
            }
            Err(err) => {
                // A cycle would otherwise re-enter an ancestor; drop it and
                // keep walking.
                if err.loop_ancestor().is_some() {
                    continue;
                }
                let mut note = ScanNote::new(NoteStage::Walk, err.to_string());
                if let Some(p) = err.path() {
                    note = note.with_file(p.to_string_lossy());
                }
                notes.push(note);
            }
        }
    }

    files.sort();
    (files, notes)
}
