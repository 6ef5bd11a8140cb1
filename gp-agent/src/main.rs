//! Gpuprint Agent (gpuprintd)
//!
//! Discovers GPU devices on the local PCI bus and publishes fingerprint
//! events for a cluster scheduler to consume.
//!
//! # Output Contract
//! - One JSON event per line on stdout: either a full device snapshot or a
//!   terminal error for that stream
//! - Diagnostics go to the systemd journal, or stderr when no journal is
//!   available; stdout carries events only
//!
//! # Lifecycle
//! - Each configured device instance runs its own polling loop
//! - A loop that hits a hardware or inventory failure publishes exactly one
//!   error event and closes its stream
//! - SIGINT stops all loops at their next iteration boundary

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use gp_core::{
    load_config, validate_config, CapabilityMode, CapabilityProvider, FingerprintWorker,
    HostInventory, NullCapabilityProvider, Shutdown, StaticCapabilityProvider, WorkerSources,
    DEFAULT_CONFIG_PATH,
};
use gp_error::GpuprintError;
use gp_protocol::FingerprintResponse;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Event Output
// ============================================================================

/// One NDJSON line on stdout: the instance name plus the event payload.
#[derive(Serialize)]
struct EventRecord<'a> {
    instance: &'a str,
    #[serde(flatten)]
    response: &'a FingerprintResponse,
}

/// Forward one worker's event stream to stdout, one JSON object per line.
/// Returns when the stream closes or stdout goes away.
fn spawn_stream_writer(
    instance: String,
    mut stream: mpsc::Receiver<FingerprintResponse>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(response) = stream.recv().await {
            if let Some(reason) = response.error.as_deref() {
                warn!("Stream {} reported a terminal error: {}", instance, reason);
            }
            let record = EventRecord {
                instance: &instance,
                response: &response,
            };
            let line = match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(e) => {
                    error!("Could not encode event for {}: {}", instance, e);
                    continue;
                }
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if writeln!(out, "{}", line).and_then(|()| out.flush()).is_err() {
                // Consumer went away; the worker stops at its next send
                return;
            }
        }
        debug!("Event stream for {} closed", instance);
    })
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("gpuprintd {} - GPU fingerprint agent", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    gpuprintd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!(
        "    -c, --config PATH   Configuration file (default: {})",
        DEFAULT_CONFIG_PATH
    );
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    GPUPRINT_LOG        Log level (trace, debug, info, warn, error)");
    eprintln!();
    eprintln!("OUTPUT:");
    eprintln!("    One JSON event per line on stdout. Diagnostics go to the");
    eprintln!("    systemd journal, or stderr when no journal is available.");
}

fn print_version() {
    println!("gpuprintd {}", VERSION);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 1: Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = args[i].clone();
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // PHASE 2: Initialize logging. Events own stdout, so diagnostics go to
    // the systemd journal when one is present and to stderr otherwise.
    let log_level = std::env::var("GPUPRINT_LOG").unwrap_or_else(|_| "info".to_string());

    let mut use_journald = Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
                use_journald = false;
                tracing_subscriber::fmt()
                    .with_target(false)
                    .with_level(true)
                    .with_env_filter(&log_level)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(&log_level)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("STARTUP: gpuprintd {} starting", VERSION);
    info!(
        "STARTUP: Logging to {}",
        if use_journald { "systemd journal" } else { "stderr" }
    );

    // PHASE 3: Load and validate configuration
    let config = load_config(Path::new(&config_path))
        .with_context(|| format!("reading configuration from {}", config_path))?;
    if let Err(e) = validate_config(&config) {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!(
        "STARTUP: Config: {} ({} device instances)",
        config_path,
        config.devices.len()
    );
    info!("STARTUP: PID: {}", std::process::id());

    // PHASE 4: Probe the inventory tool once. A failure is not fatal here;
    // each worker reports it as the single error event on its stream so the
    // consumer learns why no snapshots will follow.
    let probe_failure = match HostInventory::new().probe() {
        Ok(()) => None,
        Err(e) => {
            warn!("PCI inventory probe failed: {}", e);
            Some(e.to_string())
        }
    };

    // PHASE 5: Start one fingerprint loop per configured device instance
    let shutdown = Shutdown::new();
    let mut handles = Vec::new();

    for spec in &config.devices {
        let filter = spec.filter()?;
        let version_driver = match spec.version_driver() {
            Some(driver) => driver.to_string(),
            None => {
                error!("Instance {} has no driver to read a version from", spec.name);
                std::process::exit(1);
            }
        };
        let capabilities: Box<dyn CapabilityProvider> = match spec.capabilities {
            CapabilityMode::Static => Box::new(StaticCapabilityProvider),
            CapabilityMode::None => Box::new(NullCapabilityProvider),
        };

        let (events, stream) = mpsc::channel(config.event_capacity);
        let mut worker = FingerprintWorker::new(
            &spec.name,
            filter,
            version_driver,
            WorkerSources::host(capabilities),
            events,
            shutdown.clone(),
        )
        .with_vendor(&spec.vendor)
        .with_device_type(&spec.device_type)
        .with_poll_period(spec.poll_period(config.poll_period_secs));
        if let Some(reason) = &probe_failure {
            worker = worker.with_init_error(GpuprintError::hardware_init(reason));
        }

        info!(
            "STARTUP: Instance {} polling every {}s",
            spec.name,
            spec.poll_period(config.poll_period_secs).as_secs()
        );
        handles.push(spawn_stream_writer(spec.name.clone(), stream));
        handles.push(tokio::spawn(worker.run()));
    }

    // PHASE 6: Stop every loop at its next iteration boundary on SIGINT
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGNAL: Received SIGINT - stopping fingerprint loops");
                signal_shutdown.trigger();
            }
            Err(e) => warn!("Could not install the SIGINT handler: {}", e),
        }
    });

    // PHASE 7: Wait for every loop and stream to finish
    for handle in handles {
        let _ = handle.await;
    }

    // Every stream ending on its own means each closed after a terminal error
    if !shutdown.is_triggered() {
        error!("All fingerprint streams closed; exiting");
        std::process::exit(1);
    }

    info!("SHUTDOWN: Agent terminated gracefully");
    Ok(())
}
