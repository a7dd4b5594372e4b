//! Tracker events and the sinks that receive them.
//!
//! The tracker never logs directly. Everything worth telling a user goes
//! through an [`EventSink`] handed to it by the caller.

use crate::decode::DecodeError;
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use crate::tracker::DiscoveredDevice;
use log::Level;
use std::fmt;
use std::time::Duration;

/// Something that happened while scanning.
#[derive(Debug)]
pub enum TrackerEvent<'a> {
    DiscoveryStarted { timeout: Option<Duration> },
    DeviceFound(&'a DiscoveredDevice),
    DiscoveryFinished { found: usize },
    ListeningStarted { address: MacAddress },
    AdvertisementReceived { address: MacAddress },
    WeightChanged {
        address: MacAddress,
        measurement: &'a Measurement,
    },
    DecodeFailed {
        address: MacAddress,
        error: &'a DecodeError,
    },
    WatchCancelled { address: MacAddress },
}

impl TrackerEvent<'_> {
    /// Log level the event is reported at by [`LogSink`].
    pub fn level(&self) -> Level {
        match self {
            TrackerEvent::DeviceFound(_)
            | TrackerEvent::DiscoveryFinished { .. }
            | TrackerEvent::ListeningStarted { .. }
            | TrackerEvent::WatchCancelled { .. } => Level::Info,
            TrackerEvent::DiscoveryStarted { .. }
            | TrackerEvent::AdvertisementReceived { .. }
            | TrackerEvent::WeightChanged { .. }
            | TrackerEvent::DecodeFailed { .. } => Level::Debug,
        }
    }
}

impl fmt::Display for TrackerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerEvent::DiscoveryStarted { timeout: Some(t) } => {
                write!(f, "Scanning for Yoda1 scales for {:?}", t)
            }
            TrackerEvent::DiscoveryStarted { timeout: None } => {
                write!(f, "Scanning for Yoda1 scales until one is found")
            }
            TrackerEvent::DeviceFound(device) => match &device.measurement {
                Some(m) => write!(f, "Found a Yoda1 scale: {} ({})", device.address, m),
                None => write!(f, "Found a Yoda1 scale: {}", device.address),
            },
            TrackerEvent::DiscoveryFinished { found } => {
                write!(f, "Scan complete. Found {} devices.", found)
            }
            TrackerEvent::ListeningStarted { address } => {
                write!(f, "Listening for events from {}", address)
            }
            TrackerEvent::AdvertisementReceived { address } => {
                write!(f, "Received advertisement from {}", address)
            }
            TrackerEvent::WeightChanged {
                address,
                measurement,
            } => write!(f, "Weight changed on {}: {}", address, measurement),
            TrackerEvent::DecodeFailed { address, error } => {
                write!(f, "Error parsing advertisement data from {}: {}", address, error)
            }
            TrackerEvent::WatchCancelled { .. } => write!(f, "Event watching canceled."),
        }
    }
}

/// Receiver of tracker events.
pub trait EventSink: Send + Sync {
    fn event(&self, event: &TrackerEvent<'_>);
}

/// Sink forwarding every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn event(&self, event: &TrackerEvent<'_>) {
        log::log!(event.level(), "{}", event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn event(&self, _event: &TrackerEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, advertisement};

    #[test]
    fn test_device_found_message() {
        let with_weight = DiscoveredDevice::from_first_sight(advertisement(TEST_MAC, &[0x1B, 0x58]));
        assert_eq!(
            TrackerEvent::DeviceFound(&with_weight).to_string(),
            "Found a Yoda1 scale: 50:FB:19:00:00:01 (70.00kg)"
        );

        let without = DiscoveredDevice::from_first_sight(advertisement(TEST_MAC, &[0x1B]));
        assert_eq!(
            TrackerEvent::DeviceFound(&without).to_string(),
            "Found a Yoda1 scale: 50:FB:19:00:00:01"
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TrackerEvent::DiscoveryFinished { found: 2 }.to_string(),
            "Scan complete. Found 2 devices."
        );
        assert_eq!(
            TrackerEvent::ListeningStarted { address: TEST_MAC }.to_string(),
            "Listening for events from 50:FB:19:00:00:01"
        );
        assert_eq!(
            TrackerEvent::WatchCancelled { address: TEST_MAC }.to_string(),
            "Event watching canceled."
        );
        assert_eq!(
            TrackerEvent::DecodeFailed {
                address: TEST_MAC,
                error: &DecodeError::NoManufacturerData,
            }
            .to_string(),
            "Error parsing advertisement data from 50:FB:19:00:00:01: No manufacturer data in advertisement"
        );
    }

    #[test]
    fn test_levels() {
        assert_eq!(TrackerEvent::DiscoveryFinished { found: 0 }.level(), Level::Info);
        assert_eq!(
            TrackerEvent::AdvertisementReceived { address: TEST_MAC }.level(),
            Level::Debug
        );
    }
}
