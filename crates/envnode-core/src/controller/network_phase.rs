/// Which outside values arrived this cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct OutsideSeen {
    temperature: bool,
    humidity: bool,
    icon: bool,
}

impl OutsideSeen {
    const fn all(self) -> bool {
        self.temperature && self.humidity && self.icon
    }
}

impl<SE, BG, NT, DD, CK, ST> WakeCycleController<SE, BG, NT, DD, CK, ST>
where
    SE: SensorSource,
    BG: BatteryGauge,
    NT: NetworkTransport,
    DD: DisplayDriver,
    CK: Clock,
    ST: PersistentStore,
{
    /// One connection attempt; a down link skips the phase rather than
    /// stretching the cycle.
    async fn network_phase(&mut self, report: &mut CycleReport) -> PhaseOutcome {
        self.record_breadcrumb("network_phase");
        let budgets = self.config.budgets;
        let started = self.clock.now_ms();

        if !self.network.is_connected() {
            if let Err(err) = self.network.connect(budgets.connect_ms).await {
                warn!("net: connect failed: {:?}; skipping network phase", err);
                // A half-joined radio or socket is torn down here, not by sleep.
                self.network.disconnect().await;
                return PhaseOutcome::Skipped(SkipReason::NotConnected);
            }
        }
        if !self.network.is_connected() {
            warn!("net: link not up; skipping network phase");
            self.network.disconnect().await;
            return PhaseOutcome::Skipped(SkipReason::NotConnected);
        }
        self.network_online = true;

        let filters = [
            self.topics.outside_filter(),
            self.topics.device(leaf::COMMAND),
        ];
        for filter in filters.iter() {
            if let Err(err) = self.network.subscribe(filter.as_str()).await {
                warn!("net: subscribe {} failed: {:?}", filter.as_str(), err);
            }
        }

        let seen = self.fetch_inbound().await;
        let crash_slot = self.queue_cycle_messages();
        let queued = self.queued_this_cycle;

        let flush = self.network.flush(budgets.publish_ms).await;
        self.network.disconnect().await;

        let outcome = match flush {
            Ok(sent) => {
                report.published = sent;
                if let Some(slot) = crash_slot {
                    if sent > slot {
                        self.crash.mark_reported(&mut self.store);
                    }
                }
                if sent < queued {
                    warn!("net: only {} of {} messages sent", sent, queued);
                    PhaseOutcome::Degraded(Degradation::FlushFailed)
                } else if self.cycle_drops > 0 {
                    PhaseOutcome::Degraded(Degradation::PublishDropped(self.cycle_drops))
                } else if !seen.all() {
                    PhaseOutcome::Degraded(Degradation::OutsideDataIncomplete)
                } else {
                    PhaseOutcome::Completed
                }
            }
            Err(err) => {
                warn!("net: flush failed: {:?}", err);
                PhaseOutcome::Degraded(Degradation::FlushFailed)
            }
        };

        info!(
            "net: {:?} queued={} dropped={} elapsed_ms={}",
            outcome,
            queued,
            self.cycle_drops,
            self.clock.now_ms().saturating_sub(started)
        );
        outcome
    }

    /// Drains retained outside values and operator commands until every
    /// outside value is in or the fetch budget is spent.
    async fn fetch_inbound(&mut self) -> OutsideSeen {
        let deadline = Deadline::after(&self.clock, self.config.budgets.outside_fetch_ms);
        let mut seen = OutsideSeen::default();

        while !seen.all() && !deadline.expired(&self.clock) {
            let wait = deadline.remaining_ms(&self.clock);
            match self.network.poll_inbound(wait).await {
                Ok(Some(message)) => self.handle_inbound(&message, &mut seen),
                Ok(None) => break,
                Err(err) => {
                    warn!("net: inbound poll failed: {:?}", err);
                    break;
                }
            }
        }

        if !seen.all() {
            debug!(
                "net: outside data incomplete temp={} rh={} icon={}",
                seen.temperature, seen.humidity, seen.icon
            );
        }
        seen
    }

    fn handle_inbound(&mut self, message: &InboundMessage, seen: &mut OutsideSeen) {
        let topic = message.topic.as_str();
        let payload = message.payload.as_str().trim();

        if self.topics.is_command(topic) {
            match RemoteCommand::parse(payload) {
                Some(command) => self.apply_command(command),
                None => warn!("cmd: unrecognized payload {:?}", payload),
            }
            return;
        }

        let Some(name) = self.topics.match_outside(topic) else {
            debug!("net: ignoring message on {}", topic);
            return;
        };
        match name {
            crate::publish::outside::TEMPERATURE => match payload.parse::<f32>() {
                Ok(value) => {
                    self.outside.temperature_f = value;
                    seen.temperature = true;
                }
                Err(_) => warn!("net: bad outside temperature {:?}", payload),
            },
            crate::publish::outside::HUMIDITY => match payload.parse::<f32>() {
                Ok(value) => {
                    self.outside.humidity_pct = value;
                    seen.humidity = true;
                }
                Err(_) => warn!("net: bad outside humidity {:?}", payload),
            },
            crate::publish::outside::ICON => match payload.parse::<i32>() {
                Ok(value) => {
                    self.outside.icon_id = value;
                    seen.icon = true;
                }
                Err(_) => warn!("net: bad weather icon {:?}", payload),
            },
            other => debug!("net: unknown outside value {}", other),
        }
    }

    fn apply_command(&mut self, command: RemoteCommand) {
        info!("cmd: {:?}", command);
        match command {
            RemoteCommand::SetDiagnostic(on) => self.state.record_mut().diagnostic_mode = on,
            RemoteCommand::SetFullOnly(on) => self.state.record_mut().full_only_mode = on,
            RemoteCommand::SetSleepInterval(seconds) => {
                let applied = self.scheduler.set_custom_interval(seconds);
                self.state.record_mut().custom_sleep_interval_s = applied;
            }
            RemoteCommand::AdaptiveSleep => {
                self.scheduler.clear_custom_interval();
                self.state.record_mut().custom_sleep_interval_s = 0;
            }
            RemoteCommand::Restart => self.restart_requested = true,
            RemoteCommand::Report(ReportKind::Crash) => self.reports.crash = true,
            RemoteCommand::Report(ReportKind::Memory) => self.reports.memory = true,
            RemoteCommand::Report(ReportKind::Sleep) => self.reports.sleep = true,
            RemoteCommand::ResetWakeCount => self.state.reset_wake_count(),
        }
    }

    /// Queues this cycle's messages. Returns the batch position of the crash
    /// report, if one was queued.
    fn queue_cycle_messages(&mut self) -> Option<usize> {
        let mut crash_slot = None;

        if self.crash.has_crash_info() {
            let payload = self.crash_payload();
            let topic = self.topics.device(leaf::CRASH);
            let slot = self.queued_this_cycle;
            if self.publish(topic.as_str(), payload.as_str(), false) {
                crash_slot = Some(slot);
            }
        }

        let inside = self.inside;
        let state = JsonObject::new()
            .float("temp_f", inside.temperature_f(), 1)
            .float("rh", inside.humidity_pct, 1)
            .float("pressure_hpa", inside.pressure_hpa, 1)
            .float("outside_temp_f", self.outside.temperature_f, 1)
            .float("outside_rh", self.outside.humidity_pct, 0)
            .finish();
        let topic = self.topics.device(leaf::STATE);
        self.publish(topic.as_str(), state.as_str(), true);

        let battery = JsonObject::new()
            .float("voltage", self.battery.voltage, 2)
            .int("percent", self.battery.percent as i64)
            .int("days", self.battery.estimated_days as i64)
            .finish();
        let topic = self.topics.device(leaf::BATTERY);
        self.publish(topic.as_str(), battery.as_str(), true);

        if self.state.record().diagnostic_mode {
            let payload = self.diagnostics_payload();
            let topic = self.topics.device(leaf::DIAGNOSTICS);
            self.publish(topic.as_str(), payload.as_str(), false);
        }

        if self.reports.crash && crash_slot.is_none() {
            let payload = self.crash_payload();
            let topic = self.topics.device(leaf::CRASH);
            self.publish(topic.as_str(), payload.as_str(), false);
        }
        if self.reports.memory {
            let payload = self.memory_payload();
            let topic = self.topics.device(leaf::MEMORY);
            self.publish(topic.as_str(), payload.as_str(), false);
        }
        if self.reports.sleep {
            let payload = self.sleep_payload();
            let topic = self.topics.device(leaf::SLEEP);
            self.publish(topic.as_str(), payload.as_str(), false);
        }
        self.reports = PendingReports::default();

        crash_slot
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> bool {
        if self.network.queue_publish(topic, payload, retain) {
            self.queued_this_cycle += 1;
            true
        } else {
            self.cycle_drops = self.cycle_drops.saturating_add(1);
            warn!("net: batch full, dropped {}", topic);
            false
        }
    }

    fn crash_payload(&self) -> String<PAYLOAD_BYTES> {
        let crash = self.crash.report().unwrap_or_else(|| self.crash.snapshot());
        JsonObject::new()
            .text("reason", crash.reset_reason.as_str())
            .int("boots", crash.boot_count as i64)
            .int("crashes", crash.crash_count as i64)
            .int("at_ms", crash.last_crash_timestamp_ms as i64)
            .text("function", crash.last_function())
            .int("heap_at_crash", crash.free_heap_at_crash as i64)
            .int("heap_min", crash.min_free_heap as i64)
            .finish()
    }

    fn memory_payload(&self) -> String<PAYLOAD_BYTES> {
        let crash = self.crash.snapshot();
        JsonObject::new()
            .int("heap_free", self.boot.heap.free_bytes as i64)
            .int("heap_min", crash.min_free_heap as i64)
            .int("heap_at_crash", crash.free_heap_at_crash as i64)
            .finish()
    }

    fn sleep_payload(&self) -> String<PAYLOAD_BYTES> {
        let snapshot = self.scheduler.snapshot();
        JsonObject::new()
            .int("interval_s", snapshot.interval_s as i64)
            .text("policy", snapshot.policy.as_str())
            .int("custom_s", snapshot.custom_interval_s as i64)
            .int("battery_pct", snapshot.battery_percent as i64)
            .boolean("rapid", snapshot.rapid_change)
            .finish()
    }

    fn diagnostics_payload(&self) -> String<PAYLOAD_BYTES> {
        let record = self.state.record();
        let crash = self.crash.snapshot();
        let refresh = self.detector.stats();
        JsonObject::new()
            .int("wakes", record.wake_count as i64)
            .int("boots", crash.boot_count as i64)
            .int("crashes", crash.crash_count as i64)
            .int("heap_free", self.boot.heap.free_bytes as i64)
            .int("heap_min", crash.min_free_heap as i64)
            .int("drops", record.publish_drops.saturating_add(self.cycle_drops) as i64)
            .int("corruptions", record.corruption_count as i64)
            .int("partials", record.partials_since_full as i64)
            .int("refresh_checks", refresh.total_checks as i64)
            .int("refresh_skipped", refresh.skipped_updates as i64)
            .int("sleep_s", self.scheduler.compute_interval() as i64)
            .finish()
    }
}
