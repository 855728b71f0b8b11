//! rns510-codefinder: recover the RNS510 PIN over the service console

mod args;
mod logger;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process::ExitCode;

use codefinder_core::prelude::*;
use codefinder_core::protocol::open_transport;

use args::Args;
use report::Reporter;

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    match run(&args) {
        Ok(outcome) => {
            if args.json {
                // Terminal event already went out as a JSON line
                tracing::info!("{}", report::summary(&outcome));
            } else {
                if let Some(code) = outcome.found() {
                    println!("{}", code);
                }
                eprintln!("{}", report::summary(&outcome));
            }
            ExitCode::from(report::exit_status(&outcome.terminal))
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(report::STARTUP_FAILURE)
        }
    }
}

fn run(args: &Args) -> Result<SearchOutcome> {
    let cancel = CancelToken::new();
    install_signal_handlers(&cancel)?;

    let profile = args.device_profile()?;
    let codec = VerifyPinCodec::new(profile).context("invalid device profile")?;
    let range = args.code_range(codec.digits())?;
    let config = args.transport_config();

    tracing::info!(
        "Opening {} at {} baud ({:?} reply window)",
        config.port_name,
        config.baud_rate,
        config.timeout
    );
    let transport = open_transport(&config, codec.boundary())
        .with_context(|| format!("failed to open {}", config.port_name))?;

    let mut reporter = Reporter::new(std::io::stdout().lock(), args.json);
    let mut controller = SearchController::new(codec, args.search_config());
    Ok(controller.run(transport, range, &cancel, &mut reporter))
}

/// First SIGINT/SIGTERM cancels the search; a second one exits immediately
fn install_signal_handlers(cancel: &CancelToken) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        // Registered first so it sees the flag before this signal sets it
        signal_hook::flag::register_conditional_shutdown(signal, 130, cancel.flag())
            .context("failed to register signal handler")?;
        signal_hook::flag::register(signal, cancel.flag())
            .context("failed to register signal handler")?;
    }
    Ok(())
}
