//! Yoda1 advertisement payload decoding.
//!
//! The scale broadcasts its current reading in the manufacturer-specific data
//! of every advertisement. Only the first two bytes are decoded: a big-endian
//! `u16` holding the weight in hundredths of a kilogram. The bytes after it
//! look like impedance and stabilisation flags but do not decode reliably, so
//! they are ignored.

use crate::measurement::Measurement;
use thiserror::Error;

/// Raw weight is transmitted in 1/100 kg.
const WEIGHT_SCALE: f64 = 100.0;

/// Reasons an advertisement did not yield a measurement.
///
/// None of these are fatal: the scan continues with the next advertisement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is too short to hold a weight
    #[error("Malformed payload: expected at least 2 bytes, got {len}")]
    MalformedPayload { len: usize },
    /// Advertisement carried no manufacturer-specific data
    #[error("No manufacturer data in advertisement")]
    NoManufacturerData,
}

/// Decode a manufacturer-specific payload into a [`Measurement`].
///
/// # Examples
/// ```
/// use yoda_sniffer::decode::decode_scale_data;
///
/// let measurement = decode_scale_data(&[0x1B, 0x58, 0x00]).unwrap();
/// assert_eq!(measurement.weight, 70.0);
/// assert!(decode_scale_data(&[0x00]).is_err());
/// ```
pub fn decode_scale_data(data: &[u8]) -> Result<Measurement, DecodeError> {
    match data {
        [hi, lo, ..] => {
            let raw = u16::from_be_bytes([*hi, *lo]);
            Ok(Measurement::new(f64::from(raw) / WEIGHT_SCALE))
        }
        _ => Err(DecodeError::MalformedPayload { len: data.len() }),
    }
}

/// Decode the first manufacturer-data entry of an advertisement.
///
/// The company identifier is not checked.
pub fn decode_manufacturer_data(
    manufacturer_data: &[(u16, Vec<u8>)],
) -> Result<Measurement, DecodeError> {
    let (_, payload) = manufacturer_data
        .first()
        .ok_or(DecodeError::NoManufacturerData)?;
    decode_scale_data(payload)
}
