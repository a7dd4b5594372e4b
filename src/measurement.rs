//! Weight measurement data structure.

use std::fmt;

/// Unit attached to a weight reading.
///
/// The advertisement carries no unit information, so readings are always
/// tagged with the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightUnit {
    #[default]
    Kilograms,
}

impl WeightUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            WeightUnit::Kilograms => "kg",
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single decoded weight reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Weight with two decimals of precision
    pub weight: f64,
    /// Configured unit of the scale (never detected, see [`WeightUnit`])
    pub unit: WeightUnit,
}

impl Measurement {
    pub fn new(weight: f64) -> Self {
        Measurement {
            weight,
            unit: WeightUnit::default(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}{}", self.weight, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_unit_is_kilograms() {
        assert_eq!(Measurement::new(1.0).unit, WeightUnit::Kilograms);
        assert_eq!(WeightUnit::default().to_string(), "kg");
    }

    #[test]
    fn test_display_uses_two_decimals() {
        assert_eq!(Measurement::new(70.0).to_string(), "70.00kg");
        assert_eq!(Measurement::new(0.5).to_string(), "0.50kg");
        assert_eq!(Measurement::new(655.35).to_string(), "655.35kg");
    }
}
