//! Device tracking: discovery of Yoda1 scales and watching one of them.
//!
//! Both modes run one scan session at a time. The session is stopped on every
//! way out of an operation, including the operation's future being dropped.

use crate::decode::DecodeError;
use crate::events::{EventSink, TrackerEvent};
use crate::mac_address::{MacAddress, YODA_ADDRESS_PREFIX};
use crate::measurement::Measurement;
use crate::scanner::{Advertisement, ScanError, Scanner};
use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior, Sleep};

/// Cadence of the keep-alive tick while watching.
pub const IDLE_TICK: Duration = Duration::from_secs(1);

/// A candidate scale found during discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub address: MacAddress,
    /// Reading from the first advertisement, if it decoded
    pub measurement: Option<Measurement>,
    /// The advertisement the device was first seen with
    pub advertisement: Advertisement,
}

impl DiscoveredDevice {
    pub fn from_first_sight(advertisement: Advertisement) -> Self {
        DiscoveredDevice {
            address: advertisement.address,
            measurement: advertisement.decode().ok(),
            advertisement,
        }
    }
}

/// Devices seen during one discovery, in order of first sight.
#[derive(Debug)]
pub struct Discovery {
    prefix: Vec<u8>,
    seen: HashSet<MacAddress>,
    devices: Vec<DiscoveredDevice>,
}

impl Discovery {
    pub fn new(prefix: &[u8]) -> Self {
        Discovery {
            prefix: prefix.to_vec(),
            seen: HashSet::new(),
            devices: Vec::new(),
        }
    }

    /// Record an advertisement. Returns the device if it is a new match.
    ///
    /// Later advertisements from a known device are ignored.
    pub fn observe(&mut self, advertisement: Advertisement) -> Option<&DiscoveredDevice> {
        if !advertisement.address.has_prefix(&self.prefix)
            || !self.seen.insert(advertisement.address)
        {
            return None;
        }
        self.devices
            .push(DiscoveredDevice::from_first_sight(advertisement));
        self.devices.last()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.devices
    }
}

/// Change-only state of a watch on one address.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSession {
    target: MacAddress,
    last: Option<Measurement>,
}

impl WatchSession {
    pub fn new(target: MacAddress) -> Self {
        WatchSession { target, last: None }
    }

    pub fn target(&self) -> MacAddress {
        self.target
    }

    pub fn last(&self) -> Option<&Measurement> {
        self.last.as_ref()
    }

    pub fn is_target(&self, address: &MacAddress) -> bool {
        self.target == *address
    }

    /// Store `measurement` if its weight differs from the last emitted one.
    ///
    /// Returns `true` when the measurement should be emitted. Weights are
    /// compared exactly.
    pub fn record(&mut self, measurement: Measurement) -> bool {
        match &self.last {
            Some(last) if last.weight == measurement.weight => false,
            _ => {
                self.last = Some(measurement);
                true
            }
        }
    }
}

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// The cancellation future resolved
    Cancelled,
    /// The measurement callback asked to stop
    Stopped,
    /// The backend closed its advertisement stream
    ScanClosed,
}

/// What a discovery is waiting for.
enum DiscoveryWait {
    /// Run for the full duration, whatever is found
    WaitingForTimeout(Pin<Box<Sleep>>),
    /// Return as soon as the first device is found
    WaitingForFirstMatch,
}

/// Finds Yoda1 scales and follows their readings.
pub struct Tracker<'a> {
    scanner: &'a dyn Scanner,
    sink: &'a dyn EventSink,
    prefix: [u8; 3],
}

impl<'a> Tracker<'a> {
    pub fn new(scanner: &'a dyn Scanner, sink: &'a dyn EventSink) -> Self {
        Tracker {
            scanner,
            sink,
            prefix: YODA_ADDRESS_PREFIX,
        }
    }

    /// Use a different vendor address prefix for discovery.
    pub fn with_prefix(mut self, prefix: [u8; 3]) -> Self {
        self.prefix = prefix;
        self
    }

    /// Scan for devices whose address carries the vendor prefix.
    ///
    /// With a timeout the scan lasts exactly that long. Without one it ends on
    /// the first match, or when the scanner has nothing more to deliver.
    ///
    /// # Errors
    /// Returns `ScanError` if the scan cannot be started.
    pub async fn discover(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<DiscoveredDevice>, ScanError> {
        self.sink.event(&TrackerEvent::DiscoveryStarted { timeout });

        let mut session = self.scanner.start_scan().await?;
        let mut discovery = Discovery::new(&self.prefix);
        let mut wait = match timeout {
            Some(t) => DiscoveryWait::WaitingForTimeout(Box::pin(time::sleep(t))),
            None => DiscoveryWait::WaitingForFirstMatch,
        };
        let mut open = true;

        loop {
            match &mut wait {
                DiscoveryWait::WaitingForTimeout(deadline) => {
                    tokio::select! {
                        biased;
                        _ = deadline.as_mut() => break,
                        advertisement = session.next(), if open => match advertisement {
                            Some(advertisement) => {
                                if let Some(device) = discovery.observe(advertisement) {
                                    self.sink.event(&TrackerEvent::DeviceFound(device));
                                }
                            }
                            // Nothing more will arrive; wait out the deadline.
                            None => open = false,
                        },
                    }
                }
                DiscoveryWait::WaitingForFirstMatch => match session.next().await {
                    Some(advertisement) => {
                        if let Some(device) = discovery.observe(advertisement) {
                            self.sink.event(&TrackerEvent::DeviceFound(device));
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        session.stop();
        self.sink.event(&TrackerEvent::DiscoveryFinished {
            found: discovery.len(),
        });
        Ok(discovery.into_devices())
    }

    /// Follow the readings of one device until `cancel` resolves.
    ///
    /// `on_measurement` is called for the first reading and for every reading
    /// whose weight differs from the previous one it was called with.
    /// Advertisements without a decodable payload are skipped.
    ///
    /// # Errors
    /// Returns `ScanError` if the scan cannot be started.
    pub async fn watch<F, C>(
        &self,
        address: MacAddress,
        mut on_measurement: F,
        cancel: C,
    ) -> Result<WatchEnd, ScanError>
    where
        F: FnMut(&Measurement) -> ControlFlow<()>,
        C: Future<Output = ()>,
    {
        let mut session = self.scanner.start_scan().await?;
        self.sink.event(&TrackerEvent::ListeningStarted { address });

        let mut watch = WatchSession::new(address);
        let mut idle = time::interval(IDLE_TICK);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(cancel);

        let end = loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    self.sink.event(&TrackerEvent::WatchCancelled { address });
                    break WatchEnd::Cancelled;
                }
                advertisement = session.next() => {
                    let Some(advertisement) = advertisement else {
                        break WatchEnd::ScanClosed;
                    };
                    if self.handle(&mut watch, &advertisement, &mut on_measurement).is_break() {
                        break WatchEnd::Stopped;
                    }
                }
                _ = idle.tick() => {}
            }
        };

        session.stop();
        Ok(end)
    }

    fn handle<F>(
        &self,
        watch: &mut WatchSession,
        advertisement: &Advertisement,
        on_measurement: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(&Measurement) -> ControlFlow<()>,
    {
        let address = advertisement.address;
        if !watch.is_target(&address) {
            return ControlFlow::Continue(());
        }
        self.sink
            .event(&TrackerEvent::AdvertisementReceived { address });

        match advertisement.decode() {
            Ok(measurement) if watch.record(measurement) => {
                self.sink.event(&TrackerEvent::WeightChanged {
                    address,
                    measurement: &measurement,
                });
                on_measurement(&measurement)
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(error) => {
                self.report_decode_failure(address, &error);
                ControlFlow::Continue(())
            }
        }
    }

    fn report_decode_failure(&self, address: MacAddress, error: &DecodeError) {
        self.sink
            .event(&TrackerEvent::DecodeFailed { address, error });
    }
}
