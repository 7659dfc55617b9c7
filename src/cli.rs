use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use crate::report::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "deltascan")]
#[command(about = "Incremental source tree analyzer with content-hash caching", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a project tree
    Analyze {
        /// Project root
        path: PathBuf,

        /// Reuse cached results for unchanged files
        #[arg(short, long)]
        incremental: bool,

        /// Configuration file (defaults to .deltascan.toml searched upward from the path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of files parsed concurrently
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Per-file parse timeout in milliseconds
        #[arg(long)]
        file_timeout_ms: Option<u64>,

        /// Whole-run timeout in milliseconds
        #[arg(long)]
        run_timeout_ms: Option<u64>,

        /// Neither load nor persist the cache
        #[arg(long)]
        no_cache: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,

        /// Increase log verbosity (-v debug, -vv trace)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbosity: u8,
    },

    /// Inspect or clear the persisted cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List files whose cached results depend on a file, transitively
    Dependents {
        /// Project root
        path: PathBuf,

        /// File relative to the project root
        file: String,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show entry, edge and expiry counts
    Stats {
        path: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Delete the persisted cache file
    Clear {
        path: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_flags() {
        let cli = Cli::parse_from([
            "deltascan", "analyze", "/repo", "--incremental", "-j", "4", "--format", "json", "-vv",
        ]);
        match cli.command {
            Commands::Analyze {
                path,
                incremental,
                jobs,
                format,
                verbosity,
                ..
            } => {
                assert_eq!(path, PathBuf::from("/repo"));
                assert!(incremental);
                assert_eq!(jobs, Some(4));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(verbosity, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
