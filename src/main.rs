// ABOUTME: CLI entry point for dbcmp
// ABOUTME: Parses flags, runs the comparison and maps the verdict to output and exit code

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dbcmp::commands;
use dbcmp::config::{self, FileConfig, Overrides, RunConfig};
use dbcmp::verify::ComparisonResult;
use indicatif::ProgressBar;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbcmp")]
#[command(
    about = "Check that two MySQL/PostgreSQL databases hold the same data",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Source database (postgres://..., mysql://... or user:pass@tcp(host:port)/db)
    #[arg(long)]
    source: Option<String>,
    /// Target database, same formats as --source
    #[arg(long)]
    target: Option<String>,
    /// Skip tables whose name contains any of these substrings (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
    /// Rows per checksum page (minimum 2, default 1000)
    #[arg(long)]
    page_size: Option<u64>,
    /// Path to a dbcmp.toml with source, target, exclude and page_size
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Output format for the verdict
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Log generated SQL and per-page digests
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = default_log_level(cli.verbose, cli.quiet);
    // Logs go to stderr; stdout only carries the verdict
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let file = match &cli.config_path {
        Some(path) => config::load_config_file(path)?,
        None => FileConfig::default(),
    };
    let run = RunConfig::resolve(
        file,
        Overrides {
            source: cli.source,
            target: cli.target,
            exclude: cli.exclude,
            page_size: cli.page_size,
        },
    )?;

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        commands::table_progress_bar()
    };

    let result = commands::compare(&run.source, &run.target, &run.options, progress)
        .await
        .map_err(|e| {
            tracing::debug!("{}", e.format_detailed());
            e
        })
        .context("error during comparison")?;

    match cli.format {
        OutputFormat::Text => println!("{}", verdict_line(&result)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        ),
    }

    if !result.is_match() {
        std::process::exit(1);
    }
    Ok(())
}

/// Filter used when `RUST_LOG` is unset; `debug` shows the generated SQL
fn default_log_level(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

fn verdict_line(result: &ComparisonResult) -> String {
    if result.is_match() {
        "Database values are same.".to_string()
    } else {
        format!(
            "Database values differ. Tables: {}",
            result.mismatches.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_lines() {
        let mut result = ComparisonResult::default();
        assert_eq!(verdict_line(&result), "Database values are same.");

        result.mismatches = vec!["Table1".into(), "Table2".into()];
        assert_eq!(
            verdict_line(&result),
            "Database values differ. Tables: Table1, Table2"
        );
    }

    #[test]
    fn test_cli_parses_exclude_list() {
        let cli = Cli::try_parse_from([
            "dbcmp",
            "--source",
            "postgres://a/db",
            "--exclude",
            "audit,Sessions",
            "--exclude",
            "jobs",
            "--page-size",
            "20",
        ])
        .unwrap();
        assert_eq!(cli.exclude, vec!["audit", "Sessions", "jobs"]);
        assert_eq!(cli.page_size, Some(20));
        assert!(cli.target.is_none());
        assert!(cli.format == OutputFormat::Text);
    }

    #[test]
    fn test_default_log_levels() {
        assert_eq!(default_log_level(true, false), "debug");
        assert_eq!(default_log_level(false, true), "warn");
        assert_eq!(default_log_level(false, false), "info");
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["dbcmp", "--verbose", "--quiet"]).is_err());
    }
}
