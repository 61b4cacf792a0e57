#![cfg_attr(not(test), no_std)]

//! SSD1680 (2.9" 128x296 black/white e-paper) driver primitives.
//!
//! Refreshes are split into "write RAM" and "start update" so callers can
//! poll `BUSY` on their own schedule instead of blocking inside the driver.

mod framebuffer;
pub mod protocol;

#[cfg(feature = "embedded-graphics")]
mod graphics;

pub use framebuffer::FrameBuffer;
#[cfg(feature = "embedded-graphics")]
pub use graphics::Canvas;
pub use protocol::{UpdateMode, Window};

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Expected SPI clock in Hz (documented for board glue).
    pub spi_hz: u32,
    /// Width of the hardware reset pulse.
    pub reset_pulse_ms: u32,
    /// Interval between `BUSY` samples while initializing.
    pub busy_poll_ms: u32,
    /// Upper bound on the blocking waits performed during `initialize`.
    pub init_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spi_hz: 4_000_000,
            reset_pulse_ms: 10,
            busy_poll_ms: 5,
            init_timeout_ms: 2_000,
        }
    }
}

/// Driver errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<SpiErr, DcErr, RstErr, BusyErr> {
    /// SPI transaction failed.
    Spi(SpiErr),
    /// Data/command pin operation failed.
    Dc(DcErr),
    /// Reset pin operation failed.
    Rst(RstErr),
    /// Busy pin could not be read.
    Busy(BusyErr),
    /// `BUSY` stayed high past the configured bound.
    Timeout,
}

pub type DriverResult<T, SpiErr, DcErr, RstErr, BusyErr> =
    Result<T, Error<SpiErr, DcErr, RstErr, BusyErr>>;

/// SSD1680 driver over a 4-wire SPI interface.
#[derive(Debug)]
pub struct Ssd1680<SPI, DC, RST, BUSY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    config: Config,
}

impl<SPI, DC, RST, BUSY> Ssd1680<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, config: Config) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Releases owned bus and pins.
    pub fn release(self) -> (SPI, DC, RST, BUSY) {
        (self.spi, self.dc, self.rst, self.busy)
    }

    /// Hardware reset, software reset and panel setup. Blocks for at most
    /// `init_timeout_ms` per busy wait.
    pub fn initialize<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.rst.set_low().map_err(Error::Rst)?;
        delay.delay_ms(self.config.reset_pulse_ms);
        self.rst.set_high().map_err(Error::Rst)?;
        delay.delay_ms(self.config.reset_pulse_ms);

        self.command(protocol::SW_RESET, &[])?;
        self.wait_idle(delay)?;

        self.command(
            protocol::DRIVER_OUTPUT_CONTROL,
            &protocol::driver_output_payload(),
        )?;
        self.command(protocol::DATA_ENTRY_MODE, &[protocol::DATA_ENTRY_XINC_YINC])?;
        self.command(protocol::BORDER_WAVEFORM, &[protocol::BORDER_FOLLOW_LUT])?;
        self.command(
            protocol::TEMPERATURE_SENSOR,
            &[protocol::INTERNAL_TEMPERATURE_SENSOR],
        )?;
        self.set_window(&Window::FULL)?;
        self.wait_idle(delay)
    }

    pub fn is_busy(&mut self) -> DriverResult<bool, SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.busy.is_high().map_err(Error::Busy)
    }

    /// Loads a whole frame into both RAM banks so the next partial update
    /// diffs against it.
    pub fn write_frame(
        &mut self,
        frame: &FrameBuffer,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.write_window(frame, &Window::FULL)?;
        self.write_previous_window(frame, &Window::FULL)
    }

    /// Loads the `window` part of `frame` into the new-image RAM bank.
    pub fn write_window(
        &mut self,
        frame: &FrameBuffer,
        window: &Window,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.stream_window(protocol::WRITE_RAM_BW, frame, window)
    }

    /// Loads the `window` part of `frame` into the previous-image RAM bank.
    /// Call after a partial update has settled so the next diff is correct.
    pub fn write_previous_window(
        &mut self,
        frame: &FrameBuffer,
        window: &Window,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.stream_window(protocol::WRITE_RAM_PREVIOUS, frame, window)
    }

    /// Starts the refresh and returns immediately; `BUSY` stays high until
    /// the waveform completes.
    pub fn start_update(
        &mut self,
        mode: UpdateMode,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.command(protocol::DISPLAY_UPDATE_CONTROL_2, &[mode.control_byte()])?;
        self.command(protocol::MASTER_ACTIVATION, &[])
    }

    /// Deep sleep keeping RAM. Only a hardware reset wakes the controller.
    pub fn deep_sleep(&mut self) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.command(protocol::DEEP_SLEEP_MODE, &[protocol::DEEP_SLEEP_RETAIN_RAM])
    }

    fn stream_window(
        &mut self,
        ram: u8,
        frame: &FrameBuffer,
        window: &Window,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.set_window(window)?;
        self.command(ram, &[])?;
        self.dc.set_high().map_err(Error::Dc)?;

        let mut row = [0u8; protocol::LINE_BYTES];
        for y in window.y..=window.last_row() {
            let Some(src) = frame.window_row(window, y) else {
                continue;
            };
            let out = &mut row[..src.len()];
            for (dst, byte) in out.iter_mut().zip(src) {
                // RAM bit 1 is white.
                *dst = !*byte;
            }
            self.spi.write(out).map_err(Error::Spi)?;
        }
        Ok(())
    }

    fn set_window(
        &mut self,
        window: &Window,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.command(protocol::SET_RAM_X_RANGE, &protocol::ram_x_range(window))?;
        self.command(protocol::SET_RAM_Y_RANGE, &protocol::ram_y_range(window))?;
        self.command(protocol::SET_RAM_X_COUNTER, &protocol::ram_x_counter(window))?;
        self.command(protocol::SET_RAM_Y_COUNTER, &protocol::ram_y_counter(window))
    }

    fn command(
        &mut self,
        command: u8,
        data: &[u8],
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        self.dc.set_low().map_err(Error::Dc)?;
        self.spi.write(&[command]).map_err(Error::Spi)?;
        if data.is_empty() {
            return Ok(());
        }
        self.dc.set_high().map_err(Error::Dc)?;
        self.spi.write(data).map_err(Error::Spi)
    }

    fn wait_idle<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> DriverResult<(), SPI::Error, DC::Error, RST::Error, BUSY::Error> {
        let poll_ms = self.config.busy_poll_ms.max(1);
        let mut waited_ms = 0u32;
        while self.is_busy()? {
            if waited_ms >= self.config.init_timeout_ms {
                return Err(Error::Timeout);
            }
            delay.delay_ms(poll_ms);
            waited_ms = waited_ms.saturating_add(poll_ms);
        }
        Ok(())
    }
}
