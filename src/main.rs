//! StreamGoo CLI - corrupting your transport streams on purpose.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use console::Term;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use streamgoo::cli::Cli;
use streamgoo::config::{init_logging, Config};
use streamgoo::control::ControlSurface;
use streamgoo::error::{ExitStatus, Result};
use streamgoo::goo::{GooControl, GooEngine};
use streamgoo::record::Recorder;
use streamgoo::relay::Relay;
use streamgoo::transport::{PacketSource, UdpSink};
use streamgoo::{PRODUCT_NAME, VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                exit(ExitStatus::InvalidArguments)
            } else {
                exit(ExitStatus::Clean)
            };
        }
    };

    if cli.print_config {
        return match Config::example().to_toml() {
            Ok(text) => {
                println!("{text}");
                exit(ExitStatus::Clean)
            }
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                exit(ExitStatus::UnknownError)
            }
        };
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            return exit(e.exit_status());
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{} {}", "✗".red(), e);
        return exit(e.exit_status());
    }

    let quiet = config.logging.quiet;
    match run(config).await {
        Ok(()) => {
            info!("Terminated {}", PRODUCT_NAME);
            exit(ExitStatus::Clean)
        }
        Err(e) => {
            let status = e.exit_status();
            error!("{} ({})", e, status);
            if !quiet {
                eprintln!("{} {}", "✗".red(), e);
            }
            wait_for_acknowledgement();
            exit(status)
        }
    }
}

/// Set up every collaborator and relay until the operator quits.
async fn run(config: Config) -> Result<()> {
    if !config.logging.quiet {
        print_banner();
    }

    let control = Arc::new(GooControl::new(config.goo.factor));

    let sink = UdpSink::connect(&config.output).await?;
    let recorder = Recorder::from_config(&config.record)?.map(Arc::new);
    let source = PacketSource::bind(&config.input)?;

    if config.goo.factor > 0 {
        info!(
            "Goo factor {}/10000, {} ms windows, {} ms pauses, type {}, warmup {} ms",
            config.goo.factor,
            config.goo.duration.as_millis(),
            config.goo.pause.as_millis(),
            config
                .goo
                .goo_type
                .map_or_else(|| "random".to_string(), |t| t.to_string()),
            config.goo.warmup.as_millis()
        );
    } else {
        info!("Goo factor is 0, relaying untouched");
    }

    let engine = GooEngine::new(Arc::clone(&control), &config.goo);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    let _control_thread =
        ControlSurface::new(Arc::clone(&control), recorder.clone(), shutdown_tx).spawn();

    let relay = Relay::new(source, Box::new(sink), engine, recorder);
    relay.run(shutdown_rx).await?;

    Ok(())
}

fn print_banner() {
    println!("{}", format!("{PRODUCT_NAME} TS Testing Tool").bright_cyan().bold());
    println!(
        "{}",
        format!("Corrupting your Transport Streams on purpose (v{VERSION})").bright_cyan()
    );
    println!();
}

/// Let an interactive operator read the failure before the window closes.
fn wait_for_acknowledgement() {
    let term = Term::stdout();
    if term.is_term() {
        println!("\nHit any key to quit");
        let _ = term.read_key();
    }
}

fn exit(status: ExitStatus) -> ExitCode {
    ExitCode::from(status.code())
}
