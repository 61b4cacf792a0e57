//! Timed deep sleep.

pub trait WakeTimer {
    /// Arms the wake source for `seconds` from now.
    fn schedule_wake(&mut self, seconds: u32);

    /// Powers down. The device comes back through a reset.
    fn enter_low_power_sleep(&mut self) -> !;

    /// Software reset without sleeping.
    fn restart(&mut self) -> !;
}
