//! Shared helpers: colored stderr prefixes and path display.

use owo_colors::OwoColorize;
use std::path::Path;

fn use_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

pub fn error_prefix() -> String {
    if use_colors() {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

pub fn note_prefix() -> String {
    if use_colors() {
        "note:".yellow().bold().to_string()
    } else {
        "note:".to_string()
    }
}

pub fn info_prefix() -> String {
    if use_colors() {
        "info:".cyan().bold().to_string()
    } else {
        "info:".to_string()
    }
}

/// Root-relative display path with forward slashes, used everywhere a file
/// is shown or recorded.
pub fn display_path(path: &Path, root: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}
