//! BLE scanner abstraction.
//!
//! Backends deliver raw advertisements through a channel wrapped in a
//! [`ScanSession`]. The session owns the stop action of the backend and runs it
//! exactly once, either on [`ScanSession::stop`] or when the session is dropped,
//! so a scan never outlives the operation that started it.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::decode::{DecodeError, decode_manufacturer_data};
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Channel buffer size for received advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// A single BLE advertisement as seen by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub address: MacAddress,
    /// Manufacturer-specific data entries (company identifier, payload)
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Decode the scale reading carried in the first manufacturer-data entry.
    pub fn decode(&self) -> Result<Measurement, DecodeError> {
        decode_manufacturer_data(&self.manufacturer_data)
    }
}

/// An open scan: a stream of advertisements plus the means to stop it.
pub struct ScanSession {
    advertisements: mpsc::Receiver<Advertisement>,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ScanSession {
    /// Wrap a backend's advertisement channel and its stop action.
    pub fn new(
        advertisements: mpsc::Receiver<Advertisement>,
        stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        ScanSession {
            advertisements,
            stop: Some(Box::new(stop)),
        }
    }

    /// Wait for the next advertisement. Returns `None` once the backend is gone.
    pub async fn next(&mut self) -> Option<Advertisement> {
        self.advertisements.recv().await
    }

    /// Stop the scan. Calling this more than once has no further effect.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            self.advertisements.close();
            stop();
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("stopped", &self.stop.is_none())
            .finish()
    }
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ScanSession, ScanError>> + Send + '_>>;
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start scanning with the specified backend.
pub async fn start_scan(backend: Backend) -> Result<ScanSession, ScanError> {
    log::debug!("Starting {backend} scan");
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan().await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan().await,
    }
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformScanner {
    backend: Backend,
}

impl PlatformScanner {
    pub fn new(backend: Backend) -> Self {
        PlatformScanner { backend }
    }
}

impl Scanner for PlatformScanner {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ScanSession, ScanError>> + Send + '_>> {
        Box::pin(start_scan(self.backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, advertisement};
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_session(stops: &Arc<AtomicUsize>) -> (mpsc::Sender<Advertisement>, ScanSession) {
        let (tx, rx) = mpsc::channel(4);
        let stops = Arc::clone(stops);
        let session = ScanSession::new(rx, move || {
            stops.fetch_add(1, Ordering::SeqCst);
        });
        (tx, session)
    }

    #[test]
    fn test_advertisement_decode() {
        let adv = advertisement(TEST_MAC, &[0x1B, 0x58, 0x00]);
        assert_eq!(adv.decode().unwrap().weight, 70.0);

        let empty = Advertisement {
            address: TEST_MAC,
            manufacturer_data: vec![],
            rssi: None,
        };
        assert_eq!(empty.decode(), Err(DecodeError::NoManufacturerData));
    }

    #[tokio::test]
    async fn test_session_delivers_advertisements() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (tx, mut session) = counting_session(&stops);

        tx.send(advertisement(TEST_MAC, &[0x00, 0x64])).await.unwrap();
        drop(tx);

        assert_eq!(session.next().await.unwrap().address, TEST_MAC);
        assert!(session.next().await.is_none());
    }

    #[test]
    fn test_session_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (_tx, mut session) = counting_session(&stops);

        session.stop();
        session.stop();
        drop(session);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_stops_on_drop() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (tx, session) = counting_session(&stops);

        drop(session);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not powered".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter not powered");

        let err = ScanError::BackendNotAvailable("hci".to_string());
        assert_eq!(
            format!("{}", err),
            "Backend 'hci' not available (not compiled in)"
        );
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("BlueZ").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("hci").unwrap(), Backend::Hci);
        assert_eq!(Backend::from_str("raw").unwrap(), Backend::Hci);
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        assert_eq!(format!("{}", Backend::Hci), "hci");
    }
}
