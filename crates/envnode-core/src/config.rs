//! Static policy for one wake cycle.

use crate::{battery::BatteryConfig, sleep::SleepConfig};

/// Hard wall-clock budgets per phase, in milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PhaseBudgets {
    pub sensor_ms: u32,
    pub connect_ms: u32,
    pub outside_fetch_ms: u32,
    pub display_ms: u32,
    pub publish_ms: u32,
    pub sensor_retry_delay_ms: u32,
    pub display_poll_ms: u32,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            sensor_ms: 300,
            connect_ms: 6_000,
            outside_fetch_ms: 2_000,
            display_ms: 8_000,
            publish_ms: 800,
            sensor_retry_delay_ms: 50,
            display_poll_ms: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleConfig {
    pub budgets: PhaseBudgets,
    pub sleep: SleepConfig,
    pub battery: BatteryConfig,
    /// First topic segment, e.g. `envnode`.
    pub topic_prefix: &'static str,
    /// Second topic segment identifying this node.
    pub device_id: &'static str,
    /// Partial refreshes allowed before a full refresh clears ghosting.
    pub full_refresh_every: u16,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            budgets: PhaseBudgets::default(),
            sleep: SleepConfig::default(),
            battery: BatteryConfig::default(),
            topic_prefix: "envnode",
            device_id: "node",
            full_refresh_every: 30,
        }
    }
}
