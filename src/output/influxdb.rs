//! InfluxDB line protocol output formatter.

use crate::output::{OutputFormatter, Reading};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.measurement)?;
        for (key, value) in &self.tag_set {
            write!(f, ",{}={}", key, value)?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            write!(f, "{}{}={}", separator, key, value)?;
            separator = ",";
        }

        // Points from before the epoch are written without a timestamp and
        // get the server's receive time instead.
        if let Some(nanos) = self
            .timestamp
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
        {
            write!(f, " {}", nanos)?;
        }
        Ok(())
    }
}

/// InfluxDB line protocol formatter.
///
/// Emits one point per reading, tagged with the scale address and unit:
/// `weight,mac=50:FB:19:00:00:01,unit=kg weight=70 1700000000000000000`
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn to_data_point(&self, reading: &Reading) -> DataPoint {
        let mut tag_set = BTreeMap::new();
        tag_set.insert("mac".to_string(), reading.address.to_string());
        tag_set.insert("unit".to_string(), reading.measurement.unit.to_string());

        let mut field_set = BTreeMap::new();
        field_set.insert(
            "weight".to_string(),
            FieldValue::Float(reading.measurement.weight),
        );

        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set,
            field_set,
            timestamp: Some(reading.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, reading: &Reading) -> String {
        self.to_data_point(reading).to_string()
    }
}
