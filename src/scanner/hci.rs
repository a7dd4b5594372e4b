//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, ScanError, ScanSession};
use crate::mac_address::MacAddress;
use libc::{
    AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t,
};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

/// Adapter the backend binds to (hci0).
const HCI_DEV_ID: u16 = 0;

// Packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// Events
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// LE controller commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

const LE_SCAN_PASSIVE: u8 = 0x00;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;
/// 10ms in 0.625ms units, used for both interval and window.
const SCAN_INTERVAL: u16 = 0x0010;

const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Largest HCI event: 2 byte header plus 255 bytes of parameters, plus packet type.
const HCI_MAX_EVENT_SIZE: usize = 258;

#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// Kernel-side packet filter for raw HCI sockets.
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)] // read by the kernel
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn le_meta_events() -> Self {
        let mut filter = HciFilter::default();
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

fn os_error(context: &str) -> ScanError {
    ScanError::Bluetooth(format!("{}: {}", context, io::Error::last_os_error()))
}

/// A raw, non-blocking HCI socket bound to one adapter.
struct HciSocket(OwnedFd);

impl HciSocket {
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // nix has no BTPROTO_HCI support, so go through libc directly.
        // SOCK_NONBLOCK is required for AsyncFd.
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        if fd < 0 {
            return Err(os_error("Failed to create HCI socket"));
        }
        let socket = HciSocket(unsafe { OwnedFd::from_raw_fd(fd) });

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                socket.0.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to bind HCI socket"));
        }

        Ok(socket)
    }

    fn set_filter(&self, filter: &HciFilter) -> Result<(), ScanError> {
        let ret = unsafe {
            libc::setsockopt(
                self.0.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to set HCI filter"));
        }
        Ok(())
    }

    fn send_command(&self, ogf: u16, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = command_packet(ogf, ocf, params);
        let ret = unsafe {
            libc::write(
                self.0.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to send HCI command"));
        }
        Ok(())
    }

    fn set_scan_parameters(&self) -> Result<(), ScanError> {
        let [interval_lo, interval_hi] = SCAN_INTERVAL.to_le_bytes();
        let params = [
            LE_SCAN_PASSIVE,
            interval_lo,
            interval_hi,
            interval_lo,
            interval_hi,
            LE_PUBLIC_ADDRESS,
            FILTER_POLICY_ACCEPT_ALL,
        ];
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, &params)
    }

    fn set_scan_enabled(&self, enabled: bool) -> Result<(), ScanError> {
        // Duplicate filtering stays off: the scale repeats its address with new weights.
        let params = [u8::from(enabled), 0x00];
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &params)
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

fn command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let [opcode_lo, opcode_hi] = ((ogf << 10) | ocf).to_le_bytes();
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.extend_from_slice(&[HCI_COMMAND_PKT, opcode_lo, opcode_hi, params.len() as u8]);
    packet.extend_from_slice(params);
    packet
}

/// Parse an LE advertising report event into an [`Advertisement`].
///
/// Only the first report of the event is read.
fn parse_advertising_report(packet: &[u8]) -> Option<Advertisement> {
    // packet type, event code, parameter length, subevent
    let report = packet.get(4..)?;
    let (&num_reports, report) = report.split_first()?;
    if num_reports == 0 {
        return None;
    }

    // event type(1) + address type(1) + address(6) + data length(1)
    let header = report.get(..9)?;
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&header[2..8]);
    addr.reverse(); // HCI sends the address little-endian

    let data_len = usize::from(header[8]);
    let ad_data = report.get(9..9 + data_len)?;
    let rssi = report.get(9 + data_len).map(|&b| i16::from(b as i8));

    Some(Advertisement {
        address: MacAddress(addr),
        manufacturer_data: manufacturer_entries(ad_data),
        rssi,
    })
}

/// Collect manufacturer-specific AD structures in advertised order.
fn manufacturer_entries(ad_data: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut entries = Vec::new();
    let mut rest = ad_data;

    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len);
        if len == 0 || len > tail.len() {
            break;
        }
        let (structure, next) = tail.split_at(len);
        if let [AD_TYPE_MANUFACTURER_DATA, id_lo, id_hi, payload @ ..] = structure {
            entries.push((u16::from_le_bytes([*id_lo, *id_hi]), payload.to_vec()));
        }
        rest = next;
    }

    entries
}

fn read_packet(socket: &HciSocket, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe {
        libc::read(
            socket.as_raw_fd(),
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
        )
    };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Start a passive LE scan on hci0 using raw HCI sockets.
///
/// One socket receives LE meta events, a second one carries commands. Stopping
/// the returned session disables scanning on the controller and ends the
/// reader task.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan() -> Result<ScanSession, ScanError> {
    let events = HciSocket::open(HCI_DEV_ID)?;
    events.set_filter(&HciFilter::le_meta_events())?;

    let commands = HciSocket::open(HCI_DEV_ID)?;
    commands.set_scan_parameters()?;
    commands.set_scan_enabled(true)?;

    let async_fd = AsyncFd::new(events)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {}", e)))?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    let task = tokio::spawn(async move {
        let mut buf = [0u8; HCI_MAX_EVENT_SIZE];

        'events: loop {
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(_) => break,
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| read_packet(inner.get_ref(), &mut buf)) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        log::debug!("HCI read failed: {}", e);
                        break;
                    }
                    Err(_would_block) => break,
                };

                let packet = &buf[..n];
                if packet.len() >= 4
                    && packet[0] == HCI_EVENT_PKT
                    && packet[1] == EVT_LE_META_EVENT
                    && packet[3] == EVT_LE_ADVERTISING_REPORT
                    && let Some(advertisement) = parse_advertising_report(packet)
                    && tx.send(advertisement).await.is_err()
                {
                    break 'events;
                }
            }
        }
    });

    Ok(ScanSession::new(rx, move || {
        log::debug!("Disabling HCI scan");
        task.abort();
        if let Err(e) = commands.set_scan_enabled(false) {
            log::warn!("{}", e);
        }
    }))
}
