//! Scan orchestration: walk, read, match in parallel, aggregate.
//!
//! Files are matched on the rayon pool with no cross-file state; each
//! file is read once into its own buffer. The reporter imposes the
//! canonical order afterwards, so parallelism never shows up in output.
//! Cancellation is cooperative at file granularity: workers check the
//! token before starting a file and the remainder is counted as skipped.

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::matcher::{self, CompiledRule};
use crate::models::{Finding, NoteStage, ScanNote, ScanReport};
use crate::report;
use crate::utils::display_path;
use crate::walker::{self, IgnoreSet};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Setting it stops new per-file work.
pub type CancelToken = Arc<AtomicBool>;

pub fn cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

enum FileOutcome {
    Scanned(Vec<Finding>),
    Binary,
    Unreadable(ScanNote),
    Cancelled,
}

/// Run one full scan under `settings` and aggregate the report.
pub fn run_scan(
    catalog: &Catalog,
    settings: &Settings,
    cancel: &CancelToken,
) -> Result<ScanReport, ConfigError> {
    let ignore = IgnoreSet::new(&settings.ignore)?;
    let (files, mut notes) = walker::collect_files(&settings.root, &ignore);
    let (rules, match_notes) = matcher::prepare(catalog);
    notes.extend(match_notes);

    let per_file: Vec<FileOutcome> = files
        .par_iter()
        .map(|path| scan_file(path, &settings.root, &rules, cancel))
        .collect();

    let mut findings: Vec<Finding> = Vec::new();
    let mut files_scanned = 0;
    let mut files_skipped = 0;
    let mut cancelled = 0;
    for outcome in per_file {
        match outcome {
            FileOutcome::Scanned(mut file_findings) => {
                files_scanned += 1;
                findings.append(&mut file_findings);
            }
            FileOutcome::Binary => files_skipped += 1,
            FileOutcome::Unreadable(note) => {
                files_skipped += 1;
                notes.push(note);
            }
            FileOutcome::Cancelled => {
                files_skipped += 1;
                cancelled += 1;
            }
        }
    }
    if cancelled > 0 {
        notes.push(ScanNote::new(
            NoteStage::Scan,
            format!("cancelled before {cancelled} file(s) were scanned"),
        ));
    }

    Ok(report::aggregate(
        findings,
        notes,
        catalog,
        settings.threshold.min_severity(),
        files_scanned,
        files_skipped,
    ))
}

fn scan_file(
    path: &Path,
    root: &Path,
    rules: &[CompiledRule],
    cancel: &CancelToken,
) -> FileOutcome {
    if cancel.load(Ordering::Relaxed) {
        return FileOutcome::Cancelled;
    }
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return FileOutcome::Unreadable(
                ScanNote::new(NoteStage::Scan, e.to_string()).with_file(display_path(path, root)),
            )
        }
    };
    if walker::is_binary(&bytes) {
        return FileOutcome::Binary;
    }
    let content = String::from_utf8_lossy(&bytes);
    let rel = display_path(path, root);
    FileOutcome::Scanned(matcher::match_file(&rel, &content, rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Threshold, DEFAULT_IGNORES};
    use crate::models::rule::Severity;
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

    #[test]
    fn test_scan_counts_and_findings() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.ts"), "const x: any = 1;\n").unwrap();
        fs::write(root.join("src/b.ts"), "const ok = 1;\n").unwrap();

        let catalog = Catalog::builtin();
        let report = run_scan(
            &catalog,
            &settings(root.to_path_buf(), Threshold::Brutal),
            &cancel_token(),
        )
        .unwrap();
        assert_eq!(report.summary.files_scanned, 2);
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].file, "src/a.ts");
    }

    #[test]
    fn test_rescan_of_unchanged_tree_is_identical() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/a.ts"),
            "var a = 1;\nconsole.log(a)\nconst b: any = 2;\n",
        )
        .unwrap();
        fs::write(root.join("src/b.ts"), "eval(code);\ndebugger;\n").unwrap();

        let catalog = Catalog::builtin();
        let cfg = settings(root.to_path_buf(), Threshold::Brutal);
        let first = run_scan(&catalog, &cfg, &cancel_token()).unwrap();
        let second = run_scan(&catalog, &cfg, &cancel_token()).unwrap();
        assert_eq!(first, second);
        assert!(first.findings.len() >= 4);
    }

    #[test]
    fn test_ignored_paths_never_appear_in_findings() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "eval(x);\n").unwrap();
        fs::create_dir_all(root.join("gen")).unwrap();
        fs::write(root.join("gen/out.js"), "eval(x);\n").unwrap();
        fs::write(root.join("main.js"), "const a = 1;\n").unwrap();

        let mut cfg = settings(root.to_path_buf(), Threshold::Brutal);
        cfg.ignore.push("gen/**".to_string());
        let report = run_scan(&Catalog::builtin(), &cfg, &cancel_token()).unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.summary.files_scanned, 1);
    }

    #[test]
    fn test_binary_files_are_skipped_by_content() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        // misnamed binary: .ts extension, NUL in content
        fs::write(root.join("blob.ts"), b"eval(x)\x00\x01\x02").unwrap();
        fs::write(root.join("code.ts"), "eval(x)\n").unwrap();

        let report = run_scan(
            &Catalog::builtin(),
            &settings(root.to_path_buf(), Threshold::Brutal),
            &cancel_token(),
        )
        .unwrap();
        assert_eq!(report.summary.files_scanned, 1);
        assert_eq!(report.summary.files_skipped, 1);
        assert!(report.findings.iter().all(|f| f.file == "code.ts"));
    }

    #[test]
    fn test_threshold_filters_scan_output() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        // high (no-any) and critical (no-eval) findings
        fs::write(root.join("a.ts"), "const x: any = 1;\neval(x);\n").unwrap();

        let catalog = Catalog::builtin();
        let relaxed = run_scan(
            &catalog,
            &settings(root.to_path_buf(), Threshold::Relaxed),
            &cancel_token(),
        )
        .unwrap();
        assert_eq!(relaxed.findings.len(), 1);
        assert_eq!(relaxed.findings[0].rule, "no-eval");

        let balanced = run_scan(
            &catalog,
            &settings(root.to_path_buf(), Threshold::Balanced),
            &cancel_token(),
        )
        .unwrap();
        assert_eq!(balanced.findings.len(), 2);
        for f in &relaxed.findings {
            assert!(balanced.findings.contains(f));
        }
    }

    #[test]
    fn test_cancelled_scan_stops_at_file_granularity() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "eval(x);\n").unwrap();
        fs::write(root.join("b.ts"), "eval(x);\n").unwrap();

        let token = cancel_token();
        token.store(true, Ordering::Relaxed);
        let report = run_scan(
            &Catalog::builtin(),
            &settings(root.to_path_buf(), Threshold::Brutal),
            &token,
        )
        .unwrap();
        assert_eq!(report.summary.files_scanned, 0);
        assert!(report.findings.is_empty());
        assert!(report
            .notes
            .iter()
            .any(|n| n.stage == NoteStage::Scan && n.message.contains("cancelled")));
    }
}
