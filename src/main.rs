//! FoldBatch CLI - batch dispatcher for structure prediction jobs
//!
//! Runs one prediction process per descriptor with bounded concurrency and
//! writes a summary report to the output directory. SIGINT/SIGTERM stop the
//! running predictions, the report is still written, and the exit code is 1.

use anyhow::Context;
use clap::Parser;
use console::style;
use foldbatch::config::{BatchConfig, CliArgs, Commands};
use foldbatch::core::BatchRunner;
use foldbatch::error::BatchError;
use foldbatch::shutdown::install_shutdown_handler;
use foldbatch::system::{DeviceDetector, HostResources};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise the level follows -q / -v
fn init_logging(args: &CliArgs) {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(command) = &args.command {
        return handle_command(command);
    }

    // Build configuration
    let config = BatchConfig::from_cli(&args).map_err(BatchError::ConfigError)?;

    // Print configuration if verbose
    if args.verbose > 0 && !args.quiet {
        print_config(&config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let outcome = runtime.block_on(async {
        let shutdown = install_shutdown_handler();
        BatchRunner::new(config).with_cancellation(shutdown).run().await
    })?;

    if !args.quiet {
        outcome.print_summary();
    }

    if outcome.interrupted {
        anyhow::bail!(
            "Run interrupted, partial report written to {}",
            outcome.report_path.display()
        );
    }

    Ok(())
}

fn handle_command(command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Resources { device_query } => {
            let host = HostResources::collect(&DeviceDetector::new(device_query.clone()));
            host.print_summary();
            Ok(())
        }
    }
}

fn print_config(config: &BatchConfig) -> anyhow::Result<()> {
    println!("=== Configuration ===");
    println!("Input:        {}", config.input_dir.display());
    println!("Output:       {}", config.output_dir.display());
    match &config.interpreter {
        Some(interpreter) => println!("Executable:   {} {}", interpreter, config.executable.display()),
        None => println!("Executable:   {}", config.executable.display()),
    }
    println!("Concurrency:  {}", config.max_concurrent);
    println!("Timeout:      {}", humantime::format_duration(config.job_timeout));
    println!("Template:     {}", config.template_date);
    match config.device_override {
        Some(n) => println!("Devices:      {} (fixed)", n),
        None => println!("Devices:      detect via {}", config.device_query),
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        println!("\n{}", json);
    }

    println!();
    Ok(())
}
