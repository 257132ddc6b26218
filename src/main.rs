//! Slopscan CLI binary entry point.
//! Resolves settings, loads the rule catalog, and runs scan/fix passes.

mod catalog;
mod cli;
mod config;
mod error;
mod fix;
mod matcher;
mod models;
mod output;
mod report;
mod scan;
mod utils;
mod walker;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let settings = match config::resolve_settings(
        cli.path.as_deref(),
        cli.config.as_deref(),
        cli.threshold.as_deref(),
        cli.fail_on.as_deref(),
        cli.output.as_deref(),
        cli.rules.as_deref(),
        &cli.ignore,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {}", crate::utils::error_prefix(), e);
            std::process::exit(2);
        }
    };
    // Friendly note if no slopscan config was found
    if !settings.config_found && settings.output != "json" {
        eprintln!(
            "{} {}",
            crate::utils::note_prefix(),
            "No slopscan.toml found; using defaults."
        );
    }

    let catalog = match catalog::Catalog::load(settings.rules_dir.as_deref()) {
        Ok(c) => c.with_tuning(&settings.tuning, &settings.autofix),
        Err(e) => {
            eprintln!("{} {}", crate::utils::error_prefix(), e);
            std::process::exit(2);
        }
    };

    if cli.list_rules {
        output::print_rules(&catalog, &settings.output);
        return;
    }

    let cancel = scan::cancel_token();

    if cli.fix {
        let mut decide = fix::prompt_decision;
        let fixed = match fix::run_fix(&catalog, &settings, &cancel, &mut decide) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("{} {}", crate::utils::error_prefix(), e);
                std::process::exit(2);
            }
        };
        output::print_fix_summary(&fixed, &settings.output);
    }

    // --fix falls through to a fresh scan so the report and the exit gate
    // reflect what is still in the tree.
    let report = match scan::run_scan(&catalog, &settings, &cancel) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} {}", crate::utils::error_prefix(), e);
            std::process::exit(2);
        }
    };
    output::print_report(&report, &settings.output);

    if report.summary.count_at_least(settings.fail_on) > 0 {
        std::process::exit(1);
    }
}
