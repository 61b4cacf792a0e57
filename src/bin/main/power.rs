use envnode_core::wake::WakeTimer;
use esp_hal::{
    peripherals::LPWR,
    rtc_cntl::{Rtc, sleep::TimerWakeupSource},
};
use log::{info, warn};

/// Used when sleep is entered without a scheduled wake.
const FALLBACK_WAKE_SECS: u32 = 300;

/// Deep sleep with the RTC timer as the only wake source.
pub(super) struct DeepSleepTimer {
    wake_after_secs: Option<u32>,
}

impl DeepSleepTimer {
    pub(super) const fn new() -> Self {
        Self {
            wake_after_secs: None,
        }
    }
}

impl WakeTimer for DeepSleepTimer {
    fn schedule_wake(&mut self, seconds: u32) {
        self.wake_after_secs = Some(seconds);
    }

    fn enter_low_power_sleep(&mut self) -> ! {
        let seconds = self.wake_after_secs.unwrap_or_else(|| {
            warn!("sleep: no wake scheduled, using {}s", FALLBACK_WAKE_SECS);
            FALLBACK_WAKE_SECS
        });
        info!("sleep: deep sleep for {}s", seconds);

        let mut rtc = Rtc::new(unsafe { LPWR::steal() });
        let wake_source = TimerWakeupSource::new(core::time::Duration::from_secs(seconds as u64));
        rtc.sleep_deep(&[&wake_source]);
    }

    fn restart(&mut self) -> ! {
        esp_hal::system::software_reset()
    }
}
