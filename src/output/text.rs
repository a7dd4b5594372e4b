//! Human-readable output.

use crate::output::{OutputFormatter, Reading};

/// Formats readings as `Weight: 70.00kg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format(&self, reading: &Reading) -> String {
        format!("Weight: {}", reading.measurement)
    }
}
