use crate::events::{EventSink, TrackerEvent};
use crate::mac_address::MacAddress;
use crate::scanner::{Advertisement, ScanError, ScanSession, Scanner};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A stable Yoda1 address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0x50, 0xFB, 0x19, 0x00, 0x00, 0x01]);

/// Company identifier the test scale advertises with.
pub const TEST_COMPANY_ID: u16 = 0x00C0;

/// Build an advertisement carrying `payload` as its only manufacturer data.
pub fn advertisement(address: MacAddress, payload: &[u8]) -> Advertisement {
    Advertisement {
        address,
        manufacturer_data: vec![(TEST_COMPANY_ID, payload.to_vec())],
        rssi: Some(-60),
    }
}

/// Scale payload for a raw weight in 1/100 kg, with trailing status bytes.
pub fn weight_payload(raw: u16) -> Vec<u8> {
    let [hi, lo] = raw.to_be_bytes();
    vec![hi, lo, 0x01, 0xF4]
}

/// A scanner replaying scripted advertisements.
///
/// Counts how often a scan was started and stopped.
#[derive(Debug, Default)]
pub struct FakeScanner {
    script: Vec<(Duration, Advertisement)>,
    keep_open: bool,
    failure: Option<String>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl FakeScanner {
    /// Deliver `advertisements` immediately, then close the stream.
    pub fn new(advertisements: Vec<Advertisement>) -> Self {
        Self::scripted(
            advertisements
                .into_iter()
                .map(|adv| (Duration::ZERO, adv))
                .collect(),
        )
    }

    /// Deliver each advertisement after its delay from the previous one.
    pub fn scripted(script: Vec<(Duration, Advertisement)>) -> Self {
        FakeScanner {
            script,
            ..Default::default()
        }
    }

    /// Fail every scan start with a Bluetooth error.
    pub fn failing(message: &str) -> Self {
        FakeScanner {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Keep the stream open after the script ends, like a real radio.
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Scanner for FakeScanner {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ScanSession, ScanError>> + Send + '_>> {
        Box::pin(async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.failure {
                return Err(ScanError::Bluetooth(message.clone()));
            }

            let script = self.script.clone();
            let keep_open = self.keep_open;
            let (tx, rx) = mpsc::channel(script.len().max(1));
            let task = tokio::spawn(async move {
                for (delay, advertisement) in script {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if tx.send(advertisement).await.is_err() {
                        return;
                    }
                }
                if keep_open {
                    std::future::pending::<()>().await;
                }
            });

            let stops = Arc::clone(&self.stops);
            Ok(ScanSession::new(rx, move || {
                stops.fetch_add(1, Ordering::SeqCst);
                task.abort();
            }))
        })
    }
}

/// Sink keeping the rendered message of every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m == message)
    }
}

impl EventSink for RecordingSink {
    fn event(&self, event: &TrackerEvent<'_>) {
        self.messages.lock().unwrap().push(event.to_string());
    }
}
