//! Output formatters for weight readings.
//!
//! This module provides a trait for formatting readings and implementations
//! for the supported output formats: a plain text line and InfluxDB line
//! protocol for use with Telegraf.

pub mod influxdb;
pub mod text;

use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use std::fmt;
use std::time::SystemTime;

/// A measurement together with where and when it was received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub address: MacAddress,
    pub measurement: Measurement,
    pub timestamp: SystemTime,
}

/// Trait for formatting readings into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a reading as a single line, without the trailing newline.
    fn format(&self, reading: &Reading) -> String;
}

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// `Weight: 70.00kg`
    #[default]
    Text,
    /// InfluxDB line protocol
    Influxdb,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Influxdb => write!(f, "influxdb"),
        }
    }
}

impl OutputFormat {
    /// Build the formatter for this format.
    ///
    /// `measurement_name` is only used by the InfluxDB formatter.
    pub fn formatter(self, measurement_name: &str) -> Box<dyn OutputFormatter> {
        match self {
            OutputFormat::Text => Box::new(text::TextFormatter),
            OutputFormat::Influxdb => {
                Box::new(influxdb::InfluxDbFormatter::new(measurement_name.to_string()))
            }
        }
    }
}
