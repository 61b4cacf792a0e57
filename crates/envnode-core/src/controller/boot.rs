impl<SE, BG, NT, DD, CK, ST> WakeCycleController<SE, BG, NT, DD, CK, ST>
where
    SE: SensorSource,
    BG: BatteryGauge,
    NT: NetworkTransport,
    DD: DisplayDriver,
    CK: Clock,
    ST: PersistentStore,
{
    /// Boot phase: restores persistent state, validates the crash record,
    /// samples the battery and seeds the change detector.
    pub fn boot(
        config: CycleConfig,
        parts: Collaborators<SE, BG, NT, DD, CK, ST>,
        boot: BootInfo,
    ) -> Self {
        let Collaborators {
            sensor,
            mut gauge,
            network,
            display,
            clock,
            mut store,
        } = parts;
        let started_at_ms = clock.now_ms();

        let mut state = PersistentState::load(&mut store);
        let mut crash = CrashRecorder::new();
        let crash_boot = crash.begin(&mut store, boot);
        if crash_boot.corrupted {
            state.note_corruption();
        }
        if crash_boot.crash_detected {
            warn!("boot: previous cycle ended in {}", boot.reset_reason.as_str());
        }

        let battery = BatteryModel::new(config.battery).read_status(&mut gauge);
        let record = *state.record();
        let mut scheduler = SleepScheduler::new(config.sleep)
            .with_persisted(record.custom_sleep_interval_s, record.trend_reference_f);
        scheduler.observe_battery(&battery);

        let outside = OutsideConditions {
            temperature_f: record.last_outside_temp_f,
            humidity_pct: record.last_outside_rh,
            icon_id: record.last_icon_id,
        };

        let mut controller = Self {
            sensor,
            gauge,
            network,
            display,
            clock,
            store,
            config,
            topics: Topics::new(config.topic_prefix, config.device_id),
            boot,
            state,
            crash,
            scheduler,
            detector: ChangeDetector::new(),
            battery,
            inside: SensorReading::unavailable(),
            outside,
            network_online: false,
            reports: PendingReports::default(),
            restart_requested: false,
            queued_this_cycle: 0,
            cycle_drops: 0,
            started_at_ms,
        };
        controller.seed_regions();
        controller.record_breadcrumb("boot");

        info!(
            "boot: reset={} wakes={} battery={}% origin={:?}",
            boot.reset_reason.as_str(),
            record.wake_count,
            battery.percent,
            controller.state.origin()
        );
        controller
    }

    /// Runs the remaining phases and arms the wake timer.
    pub async fn run<W: WakeTimer>(&mut self, timer: &mut W) -> CycleReport {
        let mut report = CycleReport::pending();

        if self.battery.is_below(self.config.sleep.critical_threshold_pct) {
            warn!(
                "cycle: battery critical at {}%, skipping straight to sleep",
                self.battery.percent
            );
            report.critical_short_circuit = true;
        } else {
            report.sensor = self.sensor_phase().await;
            report.network = self.network_phase(&mut report).await;
            report.display = self.display_phase(&mut report).await;
        }

        self.sleep_phase(timer, &mut report);
        report
    }

    /// Ends the cycle after [`run`](Self::run): restarts when an operator
    /// asked for it, otherwise enters the sleep armed by the sleep phase.
    pub fn finish<W: WakeTimer>(self, report: &CycleReport, timer: &mut W) -> ! {
        if report.restart_requested {
            info!("cycle: restart requested by operator");
            timer.restart()
        }
        timer.enter_low_power_sleep()
    }

    pub fn into_parts(self) -> Collaborators<SE, BG, NT, DD, CK, ST> {
        Collaborators {
            sensor: self.sensor,
            gauge: self.gauge,
            network: self.network,
            display: self.display,
            clock: self.clock,
            store: self.store,
        }
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn crash_recorder(&self) -> &CrashRecorder {
        &self.crash
    }

    pub fn scheduler(&self) -> &SleepScheduler {
        &self.scheduler
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn battery(&self) -> BatteryStatus {
        self.battery
    }

    fn record_breadcrumb(&mut self, name: &str) {
        self.crash.record_function(&mut self.store, name);
    }

    /// Registers every region and, after a clean resume, restores the
    /// fingerprint of what is already on the panel.
    fn seed_regions(&mut self) {
        for region in DisplayRegion::ALL {
            self.detector.register_region(region.id());
        }
        if self.state.origin() != LoadOrigin::Resumed {
            return;
        }

        let record = *self.state.record();
        let values = [
            (DisplayRegion::InsideTemperature, record.last_inside_temp_f),
            (DisplayRegion::InsideHumidity, record.last_inside_rh),
            (DisplayRegion::OutsideTemperature, record.last_outside_temp_f),
            (DisplayRegion::OutsideHumidity, record.last_outside_rh),
            (DisplayRegion::Pressure, record.last_pressure_hpa),
        ];
        for (region, value) in values {
            let text = canonical_value(value, region_precision(region));
            self.detector
                .restore_region(region.id(), fnv1a(text.as_bytes()));
        }
        if record.last_weather_crc != 0 {
            self.detector
                .restore_region(DisplayRegion::Weather.id(), record.last_weather_crc);
        }
        if record.last_status_crc != 0 {
            self.detector
                .restore_region(DisplayRegion::Status.id(), record.last_status_crc);
        }
    }
}

/// Decimal places shown for a numeric region.
const fn region_precision(region: DisplayRegion) -> u8 {
    match region {
        DisplayRegion::InsideTemperature | DisplayRegion::OutsideTemperature => 1,
        _ => 0,
    }
}
