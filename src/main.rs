//! refactor-swarm - dependency-ordered refactoring of Python projects
//!
//! Mirrors a target directory into a sandbox and refines its files batch by
//! batch, leaves first.

use clap::Parser;
use colored::Colorize;
use refactor_swarm::{Pipeline, SwarmConfig, SwarmError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refactor-swarm")]
#[command(version)]
#[command(about = "Analyze, remediate and verify a Python project in dependency order", long_about = None)]
struct Cli {
    /// Python project to refactor (left untouched; work happens in a sandbox)
    #[arg(long, value_name = "DIR")]
    target_dir: PathBuf,

    /// Settings file (defaults to refactor-swarm.toml in the target directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Failed verifications allowed per batch before abandoning it
    #[arg(long, value_name = "N")]
    max_iterations: Option<u32>,

    /// Quality score at or above which remediation is skipped
    #[arg(long, value_name = "X")]
    quality_threshold: Option<f64>,

    /// Pause between batches in milliseconds
    #[arg(long, value_name = "MS", env = "REFACTOR_SWARM_DELAY_MS")]
    delay_ms: Option<u64>,

    /// Directory under which the sandbox copy is created
    #[arg(long, value_name = "DIR")]
    sandbox_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load_config(&self) -> refactor_swarm::Result<SwarmConfig> {
        let mut config = match &self.config {
            Some(path) => SwarmConfig::load_file(path)?,
            None => SwarmConfig::load(&self.target_dir)?,
        };
        if let Some(max) = self.max_iterations {
            config = config.with_max_iterations(max);
        }
        if let Some(threshold) = self.quality_threshold {
            config = config.with_quality_threshold(threshold);
        }
        if let Some(delay) = self.delay_ms {
            config = config.with_rate_limit_delay_ms(delay);
        }
        if let Some(root) = &self.sandbox_root {
            config = config.with_sandbox_root(root);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        "refactor_swarm=debug,info"
    } else {
        "refactor_swarm=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli) -> refactor_swarm::Result<bool> {
    if !cli.target_dir.is_dir() {
        return Err(SwarmError::InvalidTarget {
            path: cli.target_dir.clone(),
        });
    }
    let config = cli.load_config()?;

    println!(
        "{} {} (threshold {:.2}, up to {} attempts per batch)",
        "Refactoring".green().bold(),
        cli.target_dir.display(),
        config.quality_threshold,
        config.max_iterations
    );

    let summary = Pipeline::new(config, &cli.target_dir).run().await?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", summary);
    Ok(summary.all_passed())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => {
            println!(
                "{} some batches were abandoned; see the summary above",
                "Note:".yellow().bold()
            );
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}
