//! mc-coordinator - Parallel Explicit-State Model Checking
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use mc_coordinator::config::{CheckerConfig, CliArgs, DemoModel};
use mc_coordinator::models::{DieHard, TokenRing};
use mc_coordinator::progress::{print_header, print_summary, ProgressReporter};
use mc_coordinator::{Checker, ErrorCode, Model};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ErrorCode> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = CheckerConfig::from_args(&args).context("Invalid configuration")?;

    match args.model {
        DemoModel::DieHard => check(DieHard, config),
        DemoModel::TokenRing => check(
            TokenRing::new(args.processes).with_hoarding(args.hoarding),
            config,
        ),
    }
}

fn check<M: Model>(model: M, config: CheckerConfig) -> Result<ErrorCode> {
    let show_progress = config.show_progress;
    let dump = config.dump.clone();
    let name = model.name().to_string();

    let checker = Checker::new(model, config).context("Failed to initialize checker")?;

    // Setup signal handler for graceful shutdown
    let shutdown_flag = checker.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    if show_progress {
        print_header(
            &name,
            checker.strategy_name(),
            checker.config_snapshot().workers,
            checker.liveness_checker(),
        );
    }

    let progress = show_progress.then(ProgressReporter::new);
    if let Some(p) = &progress {
        p.set_status("Computing initial states...");
        let reporter = p.clone();
        checker.on_progress(Box::new(move |stats| reporter.update(stats)));
    }

    let code = checker.model_check().context("Model check failed")?;

    if let Some(p) = &progress {
        if code == ErrorCode::NoError {
            p.finish("Model check completed");
        } else {
            p.finish_and_clear();
        }
    }

    let outcome = checker.outcome(code);
    print_summary(&outcome, &checker.get_all_values(), dump.as_deref());

    if checker.is_recovery() {
        info!("Run resumed from a checkpoint");
    }

    Ok(code)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("mc_coordinator=debug,warn")
    } else {
        EnvFilter::new("mc_coordinator=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
