//! Core application runner (business logic) for `yoda-sniffer`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::duration::parse_duration;
use crate::events::EventSink;
use crate::mac_address::MacAddress;
use crate::output::{OutputFormat, Reading};
use crate::scanner::{Backend, ScanError, Scanner};
use crate::tracker::{DiscoveredDevice, Tracker};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::ops::ControlFlow;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Bluetooth MAC address of the scale. Skips discovery.
    #[arg(short = 'a', long, value_name = "MAC")]
    pub address: Option<MacAddress>,

    /// Discovery scan timeout.
    /// Accepts duration with suffix: 30s, 1m, 500ms.
    /// Without suffix, value is interpreted as seconds.
    /// Without a timeout (or with 0) discovery ends at the first scale found.
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Output format for weight changes
    #[arg(long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "weight")]
    pub influxdb_measurement: String,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Verbose output, log every advertisement and parse error
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Timeout to discover with. A zero timeout means "until the first match".
    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("No Yoda1 scale found")]
    NoDeviceFound,
    #[error("Multiple scales found but no --address parameter specified")]
    AmbiguousDevice(Vec<MacAddress>),
}

/// Message shown to the user before discovery starts.
pub fn discovery_message(timeout: Option<Duration>) -> String {
    match timeout {
        Some(t) => format!(
            "Searching for the Yoda1 for {} seconds. Step or turn on your scale",
            t.as_secs_f64()
        ),
        None => "Searching for the Yoda1. Step or turn on your scale".to_string(),
    }
}

fn write_devices(devices: &[DiscoveredDevice], out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "--- Found Devices ---")?;
    for device in devices {
        writeln!(out, "{}", device.address)?;
    }
    writeln!(out, "---------------------")
}

/// Pick the one device to watch, or explain why there is none.
///
/// When several devices were found they are listed to `err`.
fn select_device(devices: &[DiscoveredDevice], err: &mut dyn Write) -> Result<MacAddress, RunError> {
    match devices {
        [] => Err(RunError::NoDeviceFound),
        [device] => Ok(device.address),
        _ => {
            write_devices(devices, err)?;
            Err(RunError::AmbiguousDevice(
                devices.iter().map(|d| d.address).collect(),
            ))
        }
    }
}

/// Run the core processing loop, writing weight changes to `out` and device lists to `err`.
///
/// - Without `options.address`, discovers scales first and watches the only one found.
/// - Watches until `cancel` resolves or the scanner stops delivering advertisements.
/// - Resolving `cancel` during discovery ends the run without error.
pub async fn run_with_io<C>(
    options: Options,
    scanner: &dyn Scanner,
    sink: &dyn EventSink,
    out: &mut dyn Write,
    err: &mut dyn Write,
    cancel: C,
) -> Result<(), RunError>
where
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let tracker = Tracker::new(scanner, sink);

    let address = match options.address {
        Some(address) => address,
        None => {
            let timeout = options.discovery_timeout();
            log::info!("{}", discovery_message(timeout));

            let devices = tokio::select! {
                devices = tracker.discover(timeout) => devices?,
                _ = &mut cancel => {
                    log::info!("Discovery canceled.");
                    return Ok(());
                }
            };
            select_device(&devices, err)?
        }
    };

    let formatter = options.format.formatter(&options.influxdb_measurement);
    let mut write_error = None;

    let end = tracker
        .watch(
            address,
            |measurement| {
                let reading = Reading {
                    address,
                    measurement: *measurement,
                    timestamp: SystemTime::now(),
                };
                match writeln!(out, "{}", formatter.format(&reading)) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        write_error = Some(e);
                        ControlFlow::Break(())
                    }
                }
            },
            cancel,
        )
        .await?;
    log::debug!("Watch on {} ended: {:?}", address, end);

    match write_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
