#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PanelFault {
    Driver,
    Timeout,
}

impl PanelFault {
    const fn degradation(self) -> Degradation {
        match self {
            Self::Driver => Degradation::DisplayDriver,
            Self::Timeout => Degradation::DisplayTimeout,
        }
    }
}

/// Canonical text for one region and its fingerprint.
struct RegionFrame {
    region: DisplayRegion,
    text: String<REGION_TEXT_BYTES>,
    hash: u32,
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
    /// Redraws what changed, or the whole panel when a full refresh is due.
    async fn display_phase(&mut self, report: &mut CycleReport) -> PhaseOutcome {
        self.record_breadcrumb("display_phase");
        let deadline = Deadline::after(&self.clock, self.config.budgets.display_ms);
        let frames = self.region_frames();

        let mut changed = [false; DisplayRegion::COUNT];
        for (slot, frame) in frames.iter().enumerate() {
            changed[slot] = self
                .detector
                .has_hash_changed(frame.region.id(), frame.hash);
        }

        let record = *self.state.record();
        let full = record.needs_full_refresh_on_boot
            || record.full_only_mode
            || record.partials_since_full >= self.config.full_refresh_every;

        let outcome = if full {
            info!(
                "display: full refresh (boot={} full_only={} partials={})",
                record.needs_full_refresh_on_boot, record.full_only_mode, record.partials_since_full
            );
            report.full_redraw = true;
            match self.full_refresh(&frames, &deadline).await {
                Ok(()) => {
                    for frame in frames.iter() {
                        self.detector.mark_clean(frame.region.id());
                        self.remember_region(frame);
                    }
                    let record = self.state.record_mut();
                    record.needs_full_refresh_on_boot = false;
                    record.partials_since_full = 0;
                    PhaseOutcome::Completed
                }
                Err(fault) => {
                    self.detector.mark_all_dirty();
                    PhaseOutcome::Degraded(fault.degradation())
                }
            }
        } else if !changed.iter().any(|changed| *changed) {
            debug!("display: no region changed");
            return PhaseOutcome::Skipped(SkipReason::NoChanges);
        } else {
            let mut outcome = PhaseOutcome::Completed;
            for (slot, frame) in frames.iter().enumerate() {
                if !changed[slot] {
                    continue;
                }
                if deadline.expired(&self.clock) {
                    warn!("display: budget spent before {}", frame.region.label());
                    outcome = PhaseOutcome::Degraded(Degradation::DisplayTimeout);
                    break;
                }
                match self.partial_refresh(frame, &deadline).await {
                    Ok(()) => {
                        self.detector.mark_clean(frame.region.id());
                        self.remember_region(frame);
                        let record = self.state.record_mut();
                        record.partials_since_full = record.partials_since_full.saturating_add(1);
                        report.partial_redraws = report.partial_redraws.saturating_add(1);
                    }
                    Err(fault) => {
                        outcome = PhaseOutcome::Degraded(fault.degradation());
                        if fault == PanelFault::Timeout {
                            break;
                        }
                    }
                }
            }
            outcome
        };

        if let Err(err) = self.display.power_down() {
            warn!("display: power down failed: {:?}", err);
        }
        info!(
            "display: {:?} partials={} dirty_mask={:#x} elapsed_ms={}",
            outcome,
            report.partial_redraws,
            self.detector.dirty_mask(),
            deadline.elapsed_ms(&self.clock)
        );
        outcome
    }

    async fn full_refresh(
        &mut self,
        frames: &[RegionFrame],
        deadline: &Deadline,
    ) -> Result<(), PanelFault> {
        if let Err(err) = self.draw_full(frames) {
            warn!("display: full redraw failed: {:?}", err);
            return Err(PanelFault::Driver);
        }
        self.wait_for_panel(deadline).await
    }

    async fn partial_refresh(
        &mut self,
        frame: &RegionFrame,
        deadline: &Deadline,
    ) -> Result<(), PanelFault> {
        if let Err(err) = self.draw_partial(frame) {
            warn!("display: {} redraw failed: {:?}", frame.region.label(), err);
            return Err(PanelFault::Driver);
        }
        self.wait_for_panel(deadline).await
    }

    fn draw_full(&mut self, frames: &[RegionFrame]) -> Result<(), DD::Error> {
        self.display.begin_full_redraw()?;
        for frame in frames {
            self.draw_frame(frame)?;
        }
        self.display.commit()
    }

    fn draw_partial(&mut self, frame: &RegionFrame) -> Result<(), DD::Error> {
        self.display.begin_partial_redraw(frame.region)?;
        self.draw_frame(frame)?;
        self.display.commit()
    }

    fn draw_frame(&mut self, frame: &RegionFrame) -> Result<(), DD::Error> {
        match frame.region {
            DisplayRegion::Weather => self.display.draw_icon(frame.region, self.outside.icon_id),
            region => self.display.draw_text(region, frame.text.as_str()),
        }
    }

    async fn wait_for_panel(&mut self, deadline: &Deadline) -> Result<(), PanelFault> {
        let poll_ms = self.config.budgets.display_poll_ms;
        loop {
            match self.display.is_busy() {
                Ok(false) => return Ok(()),
                Ok(true) => {}
                Err(err) => {
                    warn!("display: busy poll failed: {:?}", err);
                    return Err(PanelFault::Driver);
                }
            }
            if deadline.expired(&self.clock) {
                warn!("display: panel still busy at deadline");
                return Err(PanelFault::Timeout);
            }
            let wait = poll_ms.min(deadline.remaining_ms(&self.clock));
            self.clock.delay_ms(wait).await;
        }
    }

    fn region_frames(&self) -> [RegionFrame; DisplayRegion::COUNT] {
        DisplayRegion::ALL.map(|region| {
            let mut text = String::new();
            match region {
                DisplayRegion::Weather => {
                    let _ = write!(text, "icon:{}", self.outside.icon_id);
                }
                DisplayRegion::Status => {
                    if self.battery.is_known() {
                        let _ = write!(text, "{}%", self.battery.percent);
                    } else {
                        let _ = text.push_str("--%");
                    }
                    if self.battery.estimated_days >= 0 {
                        let _ = write!(text, " {}d", self.battery.estimated_days);
                    }
                    let _ = text.push_str(if self.network_online {
                        " online"
                    } else {
                        " offline"
                    });
                }
                region => {
                    let value = self.region_value(region);
                    let _ = text.push_str(canonical_value(value, region_precision(region)).as_str());
                }
            }
            let hash = fnv1a(text.as_bytes());
            RegionFrame { region, text, hash }
        })
    }

    fn region_value(&self, region: DisplayRegion) -> f32 {
        match region {
            DisplayRegion::InsideTemperature => self.inside.temperature_f(),
            DisplayRegion::InsideHumidity => self.inside.humidity_pct,
            DisplayRegion::OutsideTemperature => self.outside.temperature_f,
            DisplayRegion::OutsideHumidity => self.outside.humidity_pct,
            DisplayRegion::Pressure => self.inside.pressure_hpa,
            DisplayRegion::Weather | DisplayRegion::Status => f32::NAN,
        }
    }

    /// Records what is now on the panel so the next cycle can compare.
    fn remember_region(&mut self, frame: &RegionFrame) {
        let value = self.region_value(frame.region);
        let icon_id = self.outside.icon_id;
        let record = self.state.record_mut();
        match frame.region {
            DisplayRegion::InsideTemperature => record.last_inside_temp_f = value,
            DisplayRegion::InsideHumidity => record.last_inside_rh = value,
            DisplayRegion::OutsideTemperature => record.last_outside_temp_f = value,
            DisplayRegion::OutsideHumidity => record.last_outside_rh = value,
            DisplayRegion::Pressure => record.last_pressure_hpa = value,
            DisplayRegion::Weather => {
                record.last_icon_id = icon_id;
                record.last_weather_crc = frame.hash;
            }
            DisplayRegion::Status => record.last_status_crc = frame.hash,
        }
    }
}
