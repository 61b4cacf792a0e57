//! Monotonic time source and phase budgets.

/// Millisecond clock plus a cooperative delay.
///
/// Every bounded loop in the wake cycle re-checks a [`Deadline`] built on
/// this clock on each iteration; nothing waits without one.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now_ms(&self) -> u64;

    async fn delay_ms(&mut self, ms: u32);
}

/// Absolute expiry point on a [`Clock`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deadline {
    started_at_ms: u64,
    expires_at_ms: u64,
}

impl Deadline {
    pub fn after<C: Clock + ?Sized>(clock: &C, budget_ms: u32) -> Self {
        let now = clock.now_ms();
        Self {
            started_at_ms: now,
            expires_at_ms: now.saturating_add(budget_ms as u64),
        }
    }

    pub fn expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now_ms() >= self.expires_at_ms
    }

    pub fn remaining_ms<C: Clock + ?Sized>(&self, clock: &C) -> u32 {
        self.expires_at_ms
            .saturating_sub(clock.now_ms())
            .min(u32::MAX as u64) as u32
    }

    pub fn elapsed_ms<C: Clock + ?Sized>(&self, clock: &C) -> u64 {
        clock.now_ms().saturating_sub(self.started_at_ms)
    }
}
