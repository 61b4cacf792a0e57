//! Battery gauge normalization and runtime estimate.

use log::debug;

/// Voltage treated as empty by the linear fallback.
const EMPTY_VOLTS: f32 = 3.2;
/// Voltage treated as full by the linear fallback.
const FULL_VOLTS: f32 = 4.2;
/// Below this the cell is considered flat regardless of the curve.
const CUTOFF_VOLTS: f32 = 3.0;

/// Raw gauge output. `voltage` is `NaN` and `percent` is `None` when the
/// gauge is missing or did not answer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaugeReading {
    pub voltage: f32,
    pub percent: Option<f32>,
}

impl GaugeReading {
    pub const fn absent() -> Self {
        Self {
            voltage: f32::NAN,
            percent: None,
        }
    }

    pub const fn voltage_only(voltage: f32) -> Self {
        Self {
            voltage,
            percent: None,
        }
    }
}

pub trait BatteryGauge {
    fn read(&mut self) -> GaugeReading;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatteryConfig {
    pub capacity_mah: f32,
    /// Long-run average draw including deep sleep.
    pub average_current_ma: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_mah: 2_500.0,
            average_current_ma: 1.7,
        }
    }
}

/// Normalized battery state. `percent == -1` means no gauge; `0` is a real
/// empty reading and must not be confused with it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatteryStatus {
    pub voltage: f32,
    pub percent: i8,
    pub estimated_days: i32,
}

impl BatteryStatus {
    pub const fn unknown() -> Self {
        Self {
            voltage: f32::NAN,
            percent: -1,
            estimated_days: -1,
        }
    }

    pub const fn is_known(&self) -> bool {
        self.percent >= 0
    }

    /// Known and strictly below `threshold`.
    pub const fn is_below(&self, threshold: u8) -> bool {
        self.percent >= 0 && (self.percent as u8) < threshold
    }
}

/// Coarse linear state-of-charge from cell voltage.
///
/// This is an approximation, not a discharge-curve model: 3.2 V maps to 0%,
/// 4.2 V to 100%, anything under 3.0 V or non-finite to 0%.
pub fn estimate_battery_percent(voltage: f32) -> u8 {
    if !voltage.is_finite() || voltage < CUTOFF_VOLTS {
        return 0;
    }
    let fraction = ((voltage - EMPTY_VOLTS) / (FULL_VOLTS - EMPTY_VOLTS)).clamp(0.0, 1.0);
    (fraction * 100.0 + 0.5) as u8
}

/// Whole days left at `average_ma`, or -1 when any input is unusable.
pub fn estimate_days(capacity_mah: f32, percent: i8, average_ma: f32) -> i32 {
    if percent < 0
        || !capacity_mah.is_finite()
        || !average_ma.is_finite()
        || capacity_mah <= 0.0
        || average_ma <= 0.0
    {
        return -1;
    }
    let remaining_mah = capacity_mah * percent as f32 / 100.0;
    // Non-negative, so truncation is floor.
    (remaining_mah / average_ma / 24.0) as i32
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BatteryModel {
    config: BatteryConfig,
}

impl BatteryModel {
    pub const fn new(config: BatteryConfig) -> Self {
        Self { config }
    }

    pub fn read_status<G: BatteryGauge + ?Sized>(&self, gauge: &mut G) -> BatteryStatus {
        self.normalize(gauge.read())
    }

    pub fn normalize(&self, reading: GaugeReading) -> BatteryStatus {
        let percent = match reading.percent {
            // Truncate: 4.7 % still counts as below 5 %.
            Some(soc) if soc.is_finite() => soc.clamp(0.0, 100.0) as i8,
            _ if reading.voltage.is_finite() => estimate_battery_percent(reading.voltage) as i8,
            _ => -1,
        };
        let estimated_days = estimate_days(
            self.config.capacity_mah,
            percent,
            self.config.average_current_ma,
        );
        debug!(
            "battery: voltage={} percent={} days={}",
            reading.voltage, percent, estimated_days
        );
        BatteryStatus {
            voltage: reading.voltage,
            percent,
            estimated_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_fallback_hits_both_ends() {
        assert_eq!(estimate_battery_percent(4.2), 100);
        assert_eq!(estimate_battery_percent(3.2), 0);
        assert_eq!(estimate_battery_percent(f32::NAN), 0);
        assert_eq!(estimate_battery_percent(f32::INFINITY), 0);
        assert_eq!(estimate_battery_percent(2.9), 0);
        assert_eq!(estimate_battery_percent(3.1), 0);
        assert_eq!(estimate_battery_percent(4.5), 100);
        assert_eq!(estimate_battery_percent(3.7), 50);
    }

    #[test]
    fn voltage_fallback_is_monotonic() {
        let mut previous = 0u8;
        let mut millivolts = 3_200u32;
        while millivolts <= 4_200 {
            let percent = estimate_battery_percent(millivolts as f32 / 1_000.0);
            assert!(percent >= previous, "dropped at {}mV", millivolts);
            previous = percent;
            millivolts += 5;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn days_estimate_rejects_garbage_inputs() {
        assert_eq!(estimate_days(2_500.0, -1, 1.7), -1);
        assert_eq!(estimate_days(0.0, 50, 1.7), -1);
        assert_eq!(estimate_days(2_500.0, 50, 0.0), -1);
        assert_eq!(estimate_days(2_500.0, 50, -3.0), -1);
        assert_eq!(estimate_days(f32::NAN, 50, 1.7), -1);
    }

    #[test]
    fn days_estimate_floors() {
        // 2400 mAh * 50% / 2 mA / 24 h = 25 days exactly.
        assert_eq!(estimate_days(2_400.0, 50, 2.0), 25);
        // 1000 mAh * 10% / 1 mA / 24 h = 4.17 days.
        assert_eq!(estimate_days(1_000.0, 10, 1.0), 4);
        assert_eq!(estimate_days(1_000.0, 0, 1.0), 0);
    }

    #[test]
    fn missing_gauge_propagates_sentinel() {
        let model = BatteryModel::new(BatteryConfig::default());
        let status = model.normalize(GaugeReading::absent());

        assert_eq!(status.percent, -1);
        assert_eq!(status.estimated_days, -1);
        assert!(status.voltage.is_nan());
        assert!(!status.is_known());
        assert!(!status.is_below(5));
    }

    #[test]
    fn gauge_percent_wins_over_voltage() {
        let model = BatteryModel::new(BatteryConfig::default());
        let status = model.normalize(GaugeReading {
            voltage: 4.1,
            percent: Some(42.4),
        });
        assert_eq!(status.percent, 42);

        let voltage_only = model.normalize(GaugeReading::voltage_only(3.7));
        assert_eq!(voltage_only.percent, 50);
    }

    #[test]
    fn fractional_percent_stays_in_critical_tier() {
        let model = BatteryModel::new(BatteryConfig::default());
        let status = model.normalize(GaugeReading {
            voltage: 3.45,
            percent: Some(4.7),
        });
        assert_eq!(status.percent, 4);
        assert!(status.is_below(5));

        let just_full = model.normalize(GaugeReading {
            voltage: 4.2,
            percent: Some(99.9),
        });
        assert_eq!(just_full.percent, 99);
    }

    #[test]
    fn empty_gauge_is_zero_not_unknown() {
        let model = BatteryModel::new(BatteryConfig::default());
        let status = model.normalize(GaugeReading {
            voltage: 3.1,
            percent: Some(0.0),
        });
        assert_eq!(status.percent, 0);
        assert!(status.is_known());
        assert!(status.is_below(5));
    }
}
