use embassy_time::{Instant, Timer};
use envnode_core::deadline::Clock;

/// Monotonic time from the embassy time driver started by `esp_rtos`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after_millis(ms as u64).await;
    }
}
