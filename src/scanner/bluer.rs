//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! Discovery runs with duplicate data enabled so that BlueZ reports every
//! property change of a device. Each change is turned into an
//! [`Advertisement`] from the device's current manufacturer data.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, ScanError, ScanSession};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{StreamExt, pin_mut};
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start an LE discovery on the default adapter.
///
/// The discovery stream lives in a spawned task. Stopping the returned
/// session aborts that task, which drops the stream and ends the discovery.
pub async fn start_scan() -> Result<ScanSession, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let filter = DiscoveryFilter {
        transport: DiscoveryTransport::Le,
        duplicate_data: true,
        ..Default::default()
    };
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        log::warn!("Failed to set discovery filter: {}", e);
    }

    let events = adapter.discover_devices_with_changes().await?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    let task = tokio::spawn(async move {
        let _session = session;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            if let AdapterEvent::DeviceAdded(address) = event {
                match read_advertisement(&adapter, address).await {
                    Ok(advertisement) => {
                        if tx.send(advertisement).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::debug!("Failed to read device {}: {}", address, e),
                }
            }
        }
    });

    Ok(ScanSession::new(rx, move || {
        log::debug!("Stopping BlueZ discovery");
        task.abort();
    }))
}

/// Snapshot the advertised state of a device.
///
/// BlueZ exposes manufacturer data as a map, so entries are ordered by
/// company identifier.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Advertisement, ScanError> {
    let device = adapter.device(address)?;

    let mut manufacturer_data: Vec<(u16, Vec<u8>)> = device
        .manufacturer_data()
        .await?
        .unwrap_or_default()
        .into_iter()
        .collect();
    manufacturer_data.sort_by_key(|(company, _)| *company);

    Ok(Advertisement {
        address: address.into(),
        manufacturer_data,
        rssi: device.rssi().await?,
    })
}

#[cfg(test)]
mod tests {
    use crate::mac_address::MacAddress;
    use bluer::Address;

    #[test]
    fn test_address_to_mac_address() {
        let addr = Address([0x50, 0xFB, 0x19, 0xDD, 0xEE, 0xFF]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MacAddress([0x50, 0xFB, 0x19, 0xDD, 0xEE, 0xFF]));
        assert_eq!(Address::from(mac), addr);
    }
}
