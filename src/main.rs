use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use metarr::cli::run_batch;
use metarr::config::{Config, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "metarr")]
#[command(about = "Config-driven media-metadata enrichment engine", version)]
struct Cli {
    /// Configuration file path
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Record save destinations without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Emit structured diagnostic events on stderr
    #[arg(long)]
    debug: bool,

    /// Place files via hardlink instead of move
    #[arg(long)]
    hardlink: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    // CLI flags override the corresponding options.
    if cli.dry_run {
        config.options.dry_run = true;
    }
    if cli.debug {
        config.options.debug = true;
    }
    if cli.hardlink {
        config.options.hardlink = true;
    }

    // Diagnostic events go to stderr; debug mode lowers the level floor.
    let default_filter = if config.options.debug {
        "metarr=debug"
    } else {
        "metarr=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Ctrl-C flips the abort flag; in-flight plugins are cancelled and the
    // partial response still gets emitted.
    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = abort_tx.send(true);
        }
    });

    let outcome = match run_batch(&config, abort_rx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let rendered = match serde_json::to_string_pretty(&outcome.response) {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("ERROR: failed to serialize response: {}", e);
            std::process::exit(3);
        }
    };

    println!("{}", rendered);

    if let Some(report_path) = &config.options.report_path {
        if let Err(e) = std::fs::write(report_path, &rendered) {
            eprintln!(
                "ERROR: failed to persist report to {}: {}",
                report_path.display(),
                e
            );
        }
    }

    std::process::exit(outcome.exit_code());
}
