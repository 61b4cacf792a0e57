//! Wake-cycle orchestration: boot, sensor, network, display, sleep.
//!
//! The controller owns every collaborator for the duration of one cycle.
//! Phases run strictly in order, each under its own deadline, and each
//! reports a [`PhaseOutcome`]. The sleep phase always runs.

use core::fmt::Write as _;

use heapless::String;
use log::{debug, info, warn};

use crate::{
    battery::{BatteryGauge, BatteryModel, BatteryStatus},
    command::{RemoteCommand, ReportKind},
    config::CycleConfig,
    crash::{BootInfo, CrashRecorder},
    deadline::{Clock, Deadline},
    display::{DisplayDriver, DisplayRegion},
    network::{InboundMessage, NetworkTransport},
    persist::{LoadOrigin, PersistentState},
    publish::{JsonObject, PAYLOAD_BYTES, Topics, leaf},
    refresh::{ChangeDetector, canonical_value, fnv1a},
    sensor::{SensorReading, SensorSource},
    sleep::{SleepPolicy, SleepScheduler},
    store::PersistentStore,
    wake::WakeTimer,
};

const REGION_TEXT_BYTES: usize = 32;

/// Why a phase did less than asked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Degradation {
    /// Some sensor channels stayed `NaN`.
    PartialReading,
    /// No sensor channel produced a value.
    NoReading,
    /// Not every outside value arrived before the fetch budget ran out.
    OutsideDataIncomplete,
    /// The outbound batch overflowed; count of dropped messages.
    PublishDropped(u32),
    /// The batch could not be sent.
    FlushFailed,
    /// The panel reported an error; affected regions stay dirty.
    DisplayDriver,
    /// The panel did not settle before the display budget ran out.
    DisplayTimeout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    CriticalBattery,
    NotConnected,
    NoChanges,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhaseOutcome {
    Completed,
    Degraded(Degradation),
    Skipped(SkipReason),
}

impl PhaseOutcome {
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn is_skipped(self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// What one cycle did, for logs and tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    pub sensor: PhaseOutcome,
    pub network: PhaseOutcome,
    pub display: PhaseOutcome,
    pub critical_short_circuit: bool,
    pub sleep_seconds: u32,
    pub sleep_policy: SleepPolicy,
    pub wake_count: u32,
    pub published: usize,
    pub publish_drops: u32,
    pub full_redraw: bool,
    pub partial_redraws: u8,
    pub restart_requested: bool,
    pub elapsed_ms: u64,
}

impl CycleReport {
    const fn pending() -> Self {
        Self {
            sensor: PhaseOutcome::Skipped(SkipReason::CriticalBattery),
            network: PhaseOutcome::Skipped(SkipReason::CriticalBattery),
            display: PhaseOutcome::Skipped(SkipReason::CriticalBattery),
            critical_short_circuit: false,
            sleep_seconds: 0,
            sleep_policy: SleepPolicy::Normal,
            wake_count: 0,
            published: 0,
            publish_drops: 0,
            full_redraw: false,
            partial_redraws: 0,
            restart_requested: false,
            elapsed_ms: 0,
        }
    }
}

/// Everything the controller drives. Handed back by
/// [`WakeCycleController::into_parts`].
pub struct Collaborators<SE, BG, NT, DD, CK, ST> {
    pub sensor: SE,
    pub gauge: BG,
    pub network: NT,
    pub display: DD,
    pub clock: CK,
    pub store: ST,
}

/// Outside values from the home server, `NaN`/-1 when unknown.
#[derive(Clone, Copy, Debug, PartialEq)]
struct OutsideConditions {
    temperature_f: f32,
    humidity_pct: f32,
    icon_id: i32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct PendingReports {
    crash: bool,
    memory: bool,
    sleep: bool,
}

pub struct WakeCycleController<SE, BG, NT, DD, CK, ST>
where
    SE: SensorSource,
    BG: BatteryGauge,
    NT: NetworkTransport,
    DD: DisplayDriver,
    CK: Clock,
    ST: PersistentStore,
{
    sensor: SE,
    gauge: BG,
    network: NT,
    display: DD,
    clock: CK,
    store: ST,
    config: CycleConfig,
    topics: Topics,
    boot: BootInfo,
    state: PersistentState,
    crash: CrashRecorder,
    scheduler: SleepScheduler,
    detector: ChangeDetector,
    battery: BatteryStatus,
    inside: SensorReading,
    outside: OutsideConditions,
    network_online: bool,
    reports: PendingReports,
    restart_requested: bool,
    queued_this_cycle: usize,
    cycle_drops: u32,
    started_at_ms: u64,
}

include!("boot.rs");
include!("sensor_phase.rs");
include!("network_phase.rs");
include!("display_phase.rs");
include!("sleep_phase.rs");
