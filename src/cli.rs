//! CLI argument parsing via `clap`.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "slopscan",
    version,
    about = "Pattern-based source scanner",
    long_about = "Slopscan — a fast CLI to find (and fix) careless patterns left behind in source trees.\n\nConfiguration precedence: CLI > slopscan.toml > defaults.",
    after_help = "Examples:\n  slopscan\n  slopscan src --threshold nitpicky\n  slopscan --fix\n  slopscan --report --output json --fail-on critical\n  slopscan --list-rules"
)]
/// Top-level CLI options.
pub struct Cli {
    #[arg(help = "Path to scan (default: current dir)")]
    pub path: Option<String>,
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "report", help = "Apply auto-fixable findings; prompt for the rest")]
    pub fix: bool,
    #[arg(long, action = clap::ArgAction::SetTrue, help = "Scan and report only; never touch files")]
    pub report: bool,
    #[arg(long, action = clap::ArgAction::SetTrue, help = "List the active rule catalog and exit")]
    pub list_rules: bool,
    #[arg(long, help = "Path to a config file (default: discovered upward from the scan path)")]
    pub config: Option<String>,
    #[arg(long, help = "Directory of extra rule files (*.toml, *.yaml)")]
    pub rules: Option<String>,
    #[arg(long, help = "Extra ignore glob, repeatable (e.g. --ignore 'gen/**')")]
    pub ignore: Vec<String>,
    #[arg(long, help = "Sensitivity tier: relaxed|balanced|nitpicky|brutal (default: brutal)")]
    pub threshold: Option<String>,
    #[arg(long, help = "Exit 1 when findings at or above this severity remain (default: high)")]
    pub fail_on: Option<String>,
    #[arg(long, help = "Output mode: human|json (default: human)")]
    pub output: Option<String>,
}
