use anyhow::Result;
use clap::Parser;
use deltascan::cli::{CacheAction, Cli, Commands};
use deltascan::commands::{self, analyze::AnalyzeConfig, CliOverrides};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    deltascan::observability::install_panic_hook();
    let cli = Cli::parse();

    let verbosity = match &cli.command {
        Commands::Analyze { verbosity, .. } => *verbosity,
        _ => 0,
    };
    init_logging(verbosity);

    match cli.command {
        Commands::Analyze {
            path,
            incremental,
            config,
            jobs,
            file_timeout_ms,
            run_timeout_ms,
            no_cache,
            format,
            output,
            quiet,
            verbosity,
        } => {
            let unsuccessful = commands::analyze::handle_analyze(AnalyzeConfig {
                path,
                incremental,
                config,
                overrides: CliOverrides {
                    jobs,
                    file_timeout_ms,
                    run_timeout_ms,
                    no_cache,
                    quiet,
                },
                format,
                output,
                verbosity,
            })?;
            if unsuccessful > 0 {
                tracing::warn!("{} files could not be analyzed", unsuccessful);
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats { path, config } => {
                commands::cache::cache_stats(&path, config.as_deref())?;
            }
            CacheAction::Clear { path, config } => {
                commands::cache::clear_cache(&path, config.as_deref())?;
            }
        },
        Commands::Dependents { path, file, config } => {
            commands::cache::list_dependents(&path, &file, config.as_deref())?;
        }
    }
    Ok(())
}

/// `DELTASCAN_LOG` wins; otherwise warnings, or debug/trace with `-v`/`-vv`.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("DELTASCAN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("deltascan={default_level}")));

    // log records from the cache layer are bridged by tracing-subscriber's tracing-log feature
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
