use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use envnode_core::display::{DisplayDriver, DisplayRegion};
use log::{debug, warn};
use ssd1680::{FrameBuffer, Ssd1680, UpdateMode, Window};

use super::layout;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PanelError {
    Bus,
    Pin,
    Timeout,
    /// Drawing or committing without `begin_*_redraw` first.
    NoRedrawOpen,
}

fn panel_error<S, D, R, B>(err: ssd1680::Error<S, D, R, B>) -> PanelError {
    match err {
        ssd1680::Error::Spi(_) => PanelError::Bus,
        ssd1680::Error::Dc(_) | ssd1680::Error::Rst(_) | ssd1680::Error::Busy(_) => PanelError::Pin,
        ssd1680::Error::Timeout => PanelError::Timeout,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Redraw {
    Full,
    Partial(Window),
}

/// Region-oriented adapter over the SSD1680 driver.
///
/// The controller is initialized lazily on the first redraw of a boot and
/// put back into deep sleep by `power_down`.
pub struct EpdPanel<SPI, DC, RST, BUSY, D> {
    driver: Ssd1680<SPI, DC, RST, BUSY>,
    delay: D,
    frame: FrameBuffer,
    awake: bool,
    open: Option<Redraw>,
    /// Window refreshed by the last partial update whose image still has to
    /// be copied into the previous-image bank.
    unsynced: Option<Window>,
}

impl<SPI, DC, RST, BUSY, D> EpdPanel<SPI, DC, RST, BUSY, D>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    pub fn new(driver: Ssd1680<SPI, DC, RST, BUSY>, delay: D) -> Self {
        Self {
            driver,
            delay,
            frame: FrameBuffer::new(),
            awake: false,
            open: None,
            unsynced: None,
        }
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        if self.awake {
            return Ok(());
        }
        self.driver.initialize(&mut self.delay).map_err(panel_error)?;
        self.awake = true;
        debug!("panel: initialized");
        Ok(())
    }

    fn sync_previous(&mut self) -> Result<(), PanelError> {
        if let Some(window) = self.unsynced.take() {
            self.driver
                .write_previous_window(&self.frame, &window)
                .map_err(panel_error)?;
        }
        Ok(())
    }
}

impl<SPI, DC, RST, BUSY, D> DisplayDriver for EpdPanel<SPI, DC, RST, BUSY, D>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    type Error = PanelError;

    fn begin_full_redraw(&mut self) -> Result<(), PanelError> {
        self.wake()?;
        self.unsynced = None;
        self.frame.clear(false);
        self.open = Some(Redraw::Full);
        Ok(())
    }

    fn begin_partial_redraw(&mut self, region: DisplayRegion) -> Result<(), PanelError> {
        self.wake()?;
        self.sync_previous()?;
        let window = layout::layout(region).window;
        self.frame.clear_window(&window);
        self.open = Some(Redraw::Partial(window));
        Ok(())
    }

    fn draw_text(&mut self, region: DisplayRegion, text: &str) -> Result<(), PanelError> {
        if self.open.is_none() {
            return Err(PanelError::NoRedrawOpen);
        }
        layout::render_text(&mut self.frame, region, text);
        Ok(())
    }

    fn draw_icon(&mut self, region: DisplayRegion, icon_id: i32) -> Result<(), PanelError> {
        if self.open.is_none() {
            return Err(PanelError::NoRedrawOpen);
        }
        layout::render_icon(&mut self.frame, region, icon_id);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PanelError> {
        match self.open.take() {
            Some(Redraw::Full) => {
                self.driver.write_frame(&self.frame).map_err(panel_error)?;
                self.driver
                    .start_update(UpdateMode::Full)
                    .map_err(panel_error)?;
            }
            Some(Redraw::Partial(window)) => {
                self.driver
                    .write_window(&self.frame, &window)
                    .map_err(panel_error)?;
                self.driver
                    .start_update(UpdateMode::Partial)
                    .map_err(panel_error)?;
                self.unsynced = Some(window);
            }
            None => return Err(PanelError::NoRedrawOpen),
        }
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, PanelError> {
        if !self.awake {
            return Ok(false);
        }
        self.driver.is_busy().map_err(panel_error)
    }

    fn power_down(&mut self) -> Result<(), PanelError> {
        if !self.awake {
            return Ok(());
        }
        if self.is_busy()? {
            // The controller ignores commands mid-waveform; the next boot
            // resets it anyway.
            warn!("panel: still refreshing at power down");
            self.unsynced = None;
        } else {
            self.sync_previous()?;
            self.driver.deep_sleep().map_err(panel_error)?;
        }
        self.awake = false;
        self.open = None;
        Ok(())
    }
}
