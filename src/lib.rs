//! `yoda-sniffer` library.
//!
//! Decodes weights from the manufacturer data of Yoda1 BLE scales and tracks
//! scales through discovery and watch scans.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The core “business logic” lives in [`crate::app`] and [`crate::tracker`] where it
//! can be tested deterministically with an injected scanner, event sink and output streams.

pub mod app;
pub mod decode;
pub mod duration;
pub mod events;
pub mod mac_address;
pub mod measurement;
pub mod output;
pub mod scanner;
pub mod tracker;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use decode::{DecodeError, decode_manufacturer_data, decode_scale_data};
pub use events::{EventSink, LogSink, TrackerEvent};
pub use mac_address::{MacAddress, YODA_ADDRESS_PREFIX};
pub use measurement::{Measurement, WeightUnit};
pub use output::{OutputFormat, OutputFormatter, Reading};
pub use scanner::{Advertisement, Backend, PlatformScanner, ScanError, ScanSession, Scanner};
pub use tracker::{DiscoveredDevice, Tracker, WatchEnd};
