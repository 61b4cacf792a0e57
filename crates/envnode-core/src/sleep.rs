//! Adaptive sleep interval policy.

use log::{debug, info};

use crate::battery::BatteryStatus;

/// Interval tiers and thresholds. Rebuilt from defaults on every evaluation;
/// only the operator override is persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SleepConfig {
    pub normal_s: u32,
    pub low_battery_s: u32,
    pub critical_battery_s: u32,
    pub rapid_change_s: u32,
    pub low_threshold_pct: u8,
    pub critical_threshold_pct: u8,
    /// Floor applied to operator overrides so the sensor does not self-heat.
    pub min_custom_s: u32,
    /// Inside-temperature swing between two samples that counts as rapid.
    pub rapid_delta_f: f32,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            normal_s: 300,
            low_battery_s: 600,
            critical_battery_s: 1_800,
            rapid_change_s: 60,
            low_threshold_pct: 20,
            critical_threshold_pct: 5,
            min_custom_s: 180,
            rapid_delta_f: 2.0,
        }
    }
}

/// Tier that decided the interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SleepPolicy {
    Custom,
    CriticalBattery,
    LowBattery,
    RapidChange,
    Normal,
}

impl SleepPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::CriticalBattery => "critical_battery",
            Self::LowBattery => "low_battery",
            Self::RapidChange => "rapid_change",
            Self::Normal => "normal",
        }
    }
}

/// Two-sample inside-temperature swing detector.
///
/// The first finite sample only primes the reference. No smoothing: a single
/// noisy sample can trigger the short interval for one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RapidChangeDetector {
    previous_f: f32,
    delta_f: f32,
}

impl RapidChangeDetector {
    pub const fn new(delta_f: f32) -> Self {
        Self {
            previous_f: f32::NAN,
            delta_f,
        }
    }

    /// Resumes from a reference persisted before sleep (`NaN` = none).
    pub const fn with_reference(mut self, previous_f: f32) -> Self {
        self.previous_f = previous_f;
        self
    }

    pub const fn reference(&self) -> f32 {
        self.previous_f
    }

    /// Feeds one sample; returns whether it moved more than the threshold.
    pub fn update(&mut self, temperature_f: f32) -> bool {
        if !temperature_f.is_finite() {
            return false;
        }
        let previous = self.previous_f;
        self.previous_f = temperature_f;
        if !previous.is_finite() {
            return false;
        }
        let delta = temperature_f - previous;
        let magnitude = if delta < 0.0 { -delta } else { delta };
        magnitude > self.delta_f
    }
}

/// Read-only view for operator snapshot requests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SleepPolicySnapshot {
    pub interval_s: u32,
    pub policy: SleepPolicy,
    pub custom_interval_s: u32,
    pub battery_percent: i8,
    pub rapid_change: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SleepScheduler {
    defaults: SleepConfig,
    custom_interval_s: u32,
    battery_percent: i8,
    rapid: RapidChangeDetector,
    rapid_change: bool,
}

impl SleepScheduler {
    pub const fn new(defaults: SleepConfig) -> Self {
        Self {
            defaults,
            custom_interval_s: 0,
            battery_percent: -1,
            rapid: RapidChangeDetector::new(defaults.rapid_delta_f),
            rapid_change: false,
        }
    }

    /// Restores the operator override exactly as persisted (0 = none).
    pub const fn with_persisted(mut self, custom_interval_s: u32, trend_reference_f: f32) -> Self {
        self.custom_interval_s = custom_interval_s;
        self.rapid = self.rapid.with_reference(trend_reference_f);
        self
    }

    /// Sets the operator override, clamped to the configured floor.
    ///
    /// Zero clamps like any other small value; use
    /// [`clear_custom_interval`](Self::clear_custom_interval) to go back to
    /// the adaptive tiers.
    pub fn set_custom_interval(&mut self, seconds: u32) -> u32 {
        let clamped = seconds.max(self.defaults.min_custom_s);
        if clamped != seconds {
            info!(
                "sleep: custom interval {}s clamped to {}s",
                seconds, clamped
            );
        }
        self.custom_interval_s = clamped;
        clamped
    }

    pub fn clear_custom_interval(&mut self) {
        self.custom_interval_s = 0;
    }

    pub const fn custom_interval(&self) -> u32 {
        self.custom_interval_s
    }

    pub fn observe_battery(&mut self, status: &BatteryStatus) {
        self.battery_percent = status.percent;
    }

    /// Feeds the latest inside temperature; `NaN` leaves the detector alone.
    pub fn observe_inside_temperature(&mut self, temperature_f: f32) -> bool {
        self.rapid_change = self.rapid.update(temperature_f);
        if self.rapid_change {
            debug!("sleep: rapid inside temperature change at {}F", temperature_f);
        }
        self.rapid_change
    }

    /// Reference sample to persist across deep sleep.
    pub const fn trend_reference(&self) -> f32 {
        self.rapid.reference()
    }

    fn config(&self) -> SleepConfig {
        self.defaults
    }

    /// First matching tier wins: custom, critical, low, rapid, normal.
    /// Battery thresholds are strictly-below.
    pub fn evaluate(&self) -> (u32, SleepPolicy) {
        let config = self.config();
        let battery = BatteryStatus {
            voltage: f32::NAN,
            percent: self.battery_percent,
            estimated_days: -1,
        };

        if self.custom_interval_s != 0 {
            (self.custom_interval_s, SleepPolicy::Custom)
        } else if battery.is_below(config.critical_threshold_pct) {
            (config.critical_battery_s, SleepPolicy::CriticalBattery)
        } else if battery.is_below(config.low_threshold_pct) {
            (config.low_battery_s, SleepPolicy::LowBattery)
        } else if self.rapid_change {
            (config.rapid_change_s, SleepPolicy::RapidChange)
        } else {
            (config.normal_s, SleepPolicy::Normal)
        }
    }

    pub fn compute_interval(&self) -> u32 {
        self.evaluate().0
    }

    pub fn snapshot(&self) -> SleepPolicySnapshot {
        let (interval_s, policy) = self.evaluate();
        SleepPolicySnapshot {
            interval_s,
            policy,
            custom_interval_s: self.custom_interval_s,
            battery_percent: self.battery_percent,
            rapid_change: self.rapid_change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(percent: i8) -> BatteryStatus {
        BatteryStatus {
            voltage: 3.8,
            percent,
            estimated_days: -1,
        }
    }

    fn scheduler_at(percent: i8) -> SleepScheduler {
        let mut scheduler = SleepScheduler::new(SleepConfig::default());
        scheduler.observe_battery(&battery(percent));
        scheduler
    }

    #[test]
    fn battery_tiers_cover_the_whole_range() {
        for percent in 0..=100i8 {
            let interval = scheduler_at(percent).compute_interval();
            let expected = match percent {
                0..=4 => 1_800,
                5..=19 => 600,
                _ => 300,
            };
            assert_eq!(interval, expected, "percent={}", percent);
        }
    }

    #[test]
    fn thresholds_are_strictly_below() {
        assert_eq!(scheduler_at(5).evaluate().1, SleepPolicy::LowBattery);
        assert_eq!(scheduler_at(20).evaluate().1, SleepPolicy::Normal);
        assert_eq!(scheduler_at(4).evaluate().1, SleepPolicy::CriticalBattery);
    }

    #[test]
    fn unknown_battery_uses_normal_tier() {
        assert_eq!(scheduler_at(-1).compute_interval(), 300);
    }

    #[test]
    fn custom_interval_beats_critical_battery() {
        let mut scheduler = SleepScheduler::new(SleepConfig::default());
        scheduler.set_custom_interval(300);
        scheduler.observe_battery(&battery(3));

        assert_eq!(scheduler.compute_interval(), 300);
        assert_eq!(scheduler.evaluate().1, SleepPolicy::Custom);
    }

    #[test]
    fn custom_interval_clamps_to_floor() {
        let mut scheduler = SleepScheduler::new(SleepConfig::default());
        assert_eq!(scheduler.set_custom_interval(10), 180);
        assert_eq!(scheduler.set_custom_interval(179), 180);
        assert_eq!(scheduler.set_custom_interval(0), 180);
        assert_eq!(scheduler.custom_interval(), 180);
        assert_eq!(scheduler.set_custom_interval(181), 181);

        scheduler.clear_custom_interval();
        assert_eq!(scheduler.custom_interval(), 0);
        assert_eq!(scheduler.compute_interval(), 300);
    }

    #[test]
    fn rapid_change_needs_a_prior_sample() {
        let mut scheduler = scheduler_at(80);

        assert!(!scheduler.observe_inside_temperature(70.0));
        assert_eq!(scheduler.compute_interval(), 300);

        assert!(scheduler.observe_inside_temperature(72.5));
        assert_eq!(scheduler.compute_interval(), 60);

        // Exactly the threshold is not rapid.
        assert!(!scheduler.observe_inside_temperature(74.5));
        assert_eq!(scheduler.compute_interval(), 300);

        assert!(scheduler.observe_inside_temperature(71.0));
    }

    #[test]
    fn rapid_change_ignores_nan_samples() {
        let mut scheduler = scheduler_at(80);
        scheduler.observe_inside_temperature(70.0);

        assert!(!scheduler.observe_inside_temperature(f32::NAN));
        assert_eq!(scheduler.trend_reference(), 70.0);
        assert!(scheduler.observe_inside_temperature(73.0));
    }

    #[test]
    fn persisted_reference_survives_sleep() {
        let mut scheduler =
            SleepScheduler::new(SleepConfig::default()).with_persisted(0, 68.0);
        scheduler.observe_battery(&battery(90));

        assert!(scheduler.observe_inside_temperature(71.0));
        assert_eq!(scheduler.compute_interval(), 60);
    }

    #[test]
    fn low_battery_beats_rapid_change() {
        let mut scheduler = scheduler_at(10).with_persisted(0, 60.0);
        assert!(scheduler.observe_inside_temperature(70.0));
        assert_eq!(scheduler.evaluate().1, SleepPolicy::LowBattery);
    }
}
