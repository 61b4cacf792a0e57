//! Environmental sensor interface.

/// One sample from the inside sensor. Missing channels are `NaN`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

impl SensorReading {
    pub const fn unavailable() -> Self {
        Self {
            temperature_c: f32::NAN,
            humidity_pct: f32::NAN,
            pressure_hpa: f32::NAN,
        }
    }

    /// All three channels carry a finite value.
    pub fn is_complete(&self) -> bool {
        self.temperature_c.is_finite()
            && self.humidity_pct.is_finite()
            && self.pressure_hpa.is_finite()
    }

    pub fn temperature_f(&self) -> f32 {
        celsius_to_fahrenheit(self.temperature_c)
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Blocking sensor read. Implementations report bus errors as `NaN`
/// channels instead of failing, so a dead sensor never stalls the cycle.
pub trait SensorSource {
    fn read(&mut self) -> SensorReading;
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fahrenheit_conversion_keeps_nan() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert!(celsius_to_fahrenheit(f32::NAN).is_nan());
    }

    #[test]
    fn partial_reading_is_not_complete() {
        let reading = SensorReading {
            temperature_c: 21.5,
            humidity_pct: f32::NAN,
            pressure_hpa: 1012.0,
        };
        assert!(!reading.is_complete());
        assert!(!SensorReading::unavailable().is_complete());
    }
}
