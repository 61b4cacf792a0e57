impl<SE, BG, NT, DD, CK, ST> WakeCycleController<SE, BG, NT, DD, CK, ST>
where
    SE: SensorSource,
    BG: BatteryGauge,
    NT: NetworkTransport,
    DD: DisplayDriver,
    CK: Clock,
    ST: PersistentStore,
{
    /// Reads until every channel is present or the budget is spent, keeping
    /// the last attempt either way.
    async fn sensor_phase(&mut self) -> PhaseOutcome {
        self.record_breadcrumb("sensor_phase");
        let budgets = self.config.budgets;
        let deadline = Deadline::after(&self.clock, budgets.sensor_ms);
        let mut attempts = 0u16;

        let reading = loop {
            let reading = self.sensor.read();
            attempts = attempts.saturating_add(1);
            if reading.is_complete() || deadline.expired(&self.clock) {
                break reading;
            }
            let wait = budgets
                .sensor_retry_delay_ms
                .min(deadline.remaining_ms(&self.clock));
            self.clock.delay_ms(wait).await;
        };

        self.inside = reading;
        self.scheduler
            .observe_inside_temperature(reading.temperature_f());

        let outcome = if reading.is_complete() {
            PhaseOutcome::Completed
        } else if reading.temperature_c.is_finite()
            || reading.humidity_pct.is_finite()
            || reading.pressure_hpa.is_finite()
        {
            PhaseOutcome::Degraded(Degradation::PartialReading)
        } else {
            PhaseOutcome::Degraded(Degradation::NoReading)
        };

        let elapsed = deadline.elapsed_ms(&self.clock);
        if outcome.is_completed() {
            info!(
                "sensor: t={}C rh={}% p={}hPa attempts={} elapsed_ms={}",
                reading.temperature_c, reading.humidity_pct, reading.pressure_hpa, attempts, elapsed
            );
        } else {
            warn!(
                "sensor: {:?} after {} attempts elapsed_ms={}",
                outcome, attempts, elapsed
            );
        }
        outcome
    }
}
