//! Boot-time facts the crash recorder needs.

use envnode_core::crash::{BootInfo, HeapStats, ResetReason};
use esp_hal::{
    rtc_cntl::{SocResetReason, reset_reason},
    system::Cpu,
    time::Instant,
};
use log::info;

use crate::storage::rtc_store;

/// Maps the SoC reset cause onto the crash taxonomy. A software reset that
/// follows a recorded panic is reported as a panic.
pub fn classify(reason: Option<SocResetReason>, panic_marker: bool) -> ResetReason {
    let Some(reason) = reason else {
        return ResetReason::Unknown;
    };
    match reason {
        SocResetReason::ChipPowerOn => ResetReason::PowerOn,
        SocResetReason::CoreSw | SocResetReason::Cpu0Sw if panic_marker => ResetReason::Panic,
        SocResetReason::CoreSw | SocResetReason::Cpu0Sw => ResetReason::Software,
        SocResetReason::CoreDeepSleep => ResetReason::DeepSleepWake,
        SocResetReason::CoreMwdt0 | SocResetReason::Cpu0Mwdt0 => ResetReason::TaskWatchdog,
        SocResetReason::CoreMwdt1 | SocResetReason::Cpu0Mwdt1 => ResetReason::InterruptWatchdog,
        SocResetReason::CoreRtcWdt
        | SocResetReason::Cpu0RtcWdt
        | SocResetReason::SysRtcWdt
        | SocResetReason::SysSuperWdt => ResetReason::GenericWatchdog,
        SocResetReason::SysBrownOut => ResetReason::Brownout,
        SocResetReason::CoreUsbUart | SocResetReason::CoreUsbJtag => ResetReason::External,
        _ => ResetReason::Unknown,
    }
}

/// Samples reset cause, heap headroom and uptime. Call once, after the heap
/// is initialized.
pub fn boot_info() -> BootInfo {
    let raw = reset_reason(Cpu::ProCpu);
    let panic_marker = rtc_store::take_panic_marker();
    let reset_reason = classify(raw, panic_marker);
    let free_bytes = esp_alloc::HEAP.free().min(u32::MAX as usize) as u32;
    info!(
        "boot: reset_reason={:?} mapped={} panic_marker={} free_heap={}",
        raw,
        reset_reason.as_str(),
        panic_marker,
        free_bytes
    );

    BootInfo {
        reset_reason,
        heap: HeapStats { free_bytes },
        uptime_ms: Instant::now()
            .duration_since_epoch()
            .as_millis()
            .min(u32::MAX as u64) as u32,
    }
}
