impl<SE, BG, NT, DD, CK, ST> WakeCycleController<SE, BG, NT, DD, CK, ST>
where
    SE: SensorSource,
    BG: BatteryGauge,
    NT: NetworkTransport,
    DD: DisplayDriver,
    CK: Clock,
    ST: PersistentStore,
{
    /// Has no failure path: a failed save is logged and sleep still happens.
    fn sleep_phase<W: WakeTimer>(&mut self, timer: &mut W, report: &mut CycleReport) {
        self.record_breadcrumb("sleep_phase");

        let (seconds, policy) = self.scheduler.evaluate();
        {
            let record = self.state.record_mut();
            record.custom_sleep_interval_s = self.scheduler.custom_interval();
            record.trend_reference_f = self.scheduler.trend_reference();
            record.publish_drops = record.publish_drops.saturating_add(self.cycle_drops);
        }
        let wake_count = self.state.increment_wake_count();

        if let Err(err) = self.state.save(&mut self.store) {
            warn!("sleep: persisting state failed: {:?}; sleeping anyway", err);
        }

        timer.schedule_wake(seconds);

        let elapsed_ms = self.clock.now_ms().saturating_sub(self.started_at_ms);
        report.sleep_seconds = seconds;
        report.sleep_policy = policy;
        report.wake_count = wake_count;
        report.publish_drops = self.cycle_drops;
        report.restart_requested = self.restart_requested;
        report.elapsed_ms = elapsed_ms;

        info!(
            "sleep: wake #{} done in {}ms, next in {}s policy={}",
            wake_count,
            elapsed_ms,
            seconds,
            policy.as_str()
        );
    }
}
