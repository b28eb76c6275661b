//! Kemper Sim - virtual Kemper unit on the console
//!
//! Runs the device on a tick loop and offers a REPL for playing the host side
//! of the link.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kemper_sim::cli::{self, Command};
use kemper_sim::midi::format_frame;
use kemper_sim::{DeviceConfig, VirtualDevice};

/// Kemper Sim - wire-level Kemper protocol partner for controller firmware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print unsolicited frames (keep-alives, tempo, morph, tuner)
    #[arg(short, long)]
    monitor: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            DeviceConfig::load(path).await?
        }
        None => DeviceConfig::default(),
    };

    if let Some(path) = &args.write_config {
        config.save(path).await?;
        info!("Configuration written to {}", path);
        return Ok(());
    }

    let device = VirtualDevice::new(config)?;
    info!(
        "Starting Kemper Sim (product type {:02X}, device id {:02X})",
        device.header().product_type,
        device.header().device_id
    );

    run_app(device, args.monitor, shutdown_signal()).await?;

    info!("Kemper Sim shutdown complete");
    Ok(())
}

async fn run_app(
    mut device: VirtualDevice,
    mut monitor: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);

    // Readline blocks; keep it off the runtime so shutdown never waits on it
    std::thread::spawn(move || {
        if let Err(e) = cli::read_lines(line_tx) {
            warn!("REPL stopped: {}", e);
        }
    });

    println!("{}", "=== Kemper Sim ===".bold().cyan());
    println!("Type 'help' for commands, 'quit' to exit\n");

    let mut ticker = tokio::time::interval(Duration::from_millis(device.config().tick_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                device.tick();
                print_outbound(&mut device, monitor);
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!("REPL input closed");
                    break;
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Monitor(on))) => {
                        monitor = on;
                        println!("monitor {}", if on { "on" } else { "off" });
                    }
                    Ok(Some(command)) => match cli::execute(&mut device, &command) {
                        Ok(text) if text.is_empty() => {}
                        Ok(text) => println!("{}", text),
                        Err(e) => println!("{} {:#}", "error:".red(), e),
                    },
                    Err(e) => println!("{} {:#}", "error:".red(), e),
                }
                // Replies to the command are always shown
                print_outbound(&mut device, true);
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping tick loop");
                break;
            }
        }
    }

    let stats = device.stats();
    info!(
        "Received {} frames ({} parsed, {} unparsed, {} malformed), sent {}",
        stats.received(),
        stats.parsed(),
        stats.unparsed(),
        stats.malformed(),
        device.sent_count()
    );
    Ok(())
}

fn print_outbound(device: &mut VirtualDevice, show: bool) {
    let now = device.now_ms();
    let header = device.header();
    for frame in device.drain_outbound() {
        if show {
            println!("{}", format_frame(now, &"OUT".red().to_string(), &header, &frame));
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
