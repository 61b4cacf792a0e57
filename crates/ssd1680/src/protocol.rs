//! Command set and RAM addressing for the SSD1680 e-paper controller.

/// Panel width in pixels (source lines).
pub const WIDTH: usize = 128;
/// Panel height in pixels (gate lines).
pub const HEIGHT: usize = 296;
/// Number of bytes in one gate line.
pub const LINE_BYTES: usize = WIDTH / 8;
/// Total framebuffer size in bytes.
pub const BUFFER_SIZE: usize = LINE_BYTES * HEIGHT;

pub const DRIVER_OUTPUT_CONTROL: u8 = 0x01;
pub const DEEP_SLEEP_MODE: u8 = 0x10;
pub const DATA_ENTRY_MODE: u8 = 0x11;
pub const SW_RESET: u8 = 0x12;
pub const TEMPERATURE_SENSOR: u8 = 0x18;
pub const MASTER_ACTIVATION: u8 = 0x20;
pub const DISPLAY_UPDATE_CONTROL_2: u8 = 0x22;
pub const WRITE_RAM_BW: u8 = 0x24;
/// Second RAM bank. In black/white mode it holds the previous image that
/// partial waveforms diff against.
pub const WRITE_RAM_PREVIOUS: u8 = 0x26;
pub const BORDER_WAVEFORM: u8 = 0x3C;
pub const SET_RAM_X_RANGE: u8 = 0x44;
pub const SET_RAM_Y_RANGE: u8 = 0x45;
pub const SET_RAM_X_COUNTER: u8 = 0x4E;
pub const SET_RAM_Y_COUNTER: u8 = 0x4F;

/// X increments, then Y increments.
pub const DATA_ENTRY_XINC_YINC: u8 = 0x03;
pub const BORDER_FOLLOW_LUT: u8 = 0x05;
pub const INTERNAL_TEMPERATURE_SENSOR: u8 = 0x80;
pub const DEEP_SLEEP_RETAIN_RAM: u8 = 0x01;

/// Waveform selection for `DISPLAY_UPDATE_CONTROL_2`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// Clock on, load temperature and LUT, full waveform, clock off.
    Full,
    /// Differential waveform against the previous RAM bank.
    Partial,
}

impl UpdateMode {
    pub const fn control_byte(self) -> u8 {
        match self {
            Self::Full => 0xF7,
            Self::Partial => 0xFF,
        }
    }
}

/// Byte-aligned rectangle in panel coordinates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Window {
    pub const FULL: Window = Window {
        x: 0,
        y: 0,
        width: WIDTH as u16,
        height: HEIGHT as u16,
    };

    /// Returns `None` unless the window is non-empty, inside the panel and
    /// its horizontal edges fall on byte boundaries.
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Option<Self> {
        if width == 0 || height == 0 || x % 8 != 0 || width % 8 != 0 {
            return None;
        }
        if x as usize + width as usize > WIDTH || y as usize + height as usize > HEIGHT {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub const fn first_byte(&self) -> usize {
        self.x as usize / 8
    }

    pub const fn row_bytes(&self) -> usize {
        self.width as usize / 8
    }

    pub const fn last_row(&self) -> u16 {
        self.y + self.height - 1
    }
}

/// Gate count minus one, little-endian, default scan direction.
pub const fn driver_output_payload() -> [u8; 3] {
    let gates = (HEIGHT - 1) as u16;
    [(gates & 0xFF) as u8, (gates >> 8) as u8, 0x00]
}

/// Start and end X address, in bytes.
pub const fn ram_x_range(window: &Window) -> [u8; 2] {
    [
        window.first_byte() as u8,
        (window.first_byte() + window.row_bytes() - 1) as u8,
    ]
}

/// Start and end Y address, little-endian.
pub const fn ram_y_range(window: &Window) -> [u8; 4] {
    let end = window.last_row();
    [
        (window.y & 0xFF) as u8,
        (window.y >> 8) as u8,
        (end & 0xFF) as u8,
        (end >> 8) as u8,
    ]
}

pub const fn ram_x_counter(window: &Window) -> [u8; 1] {
    [window.first_byte() as u8]
}

pub const fn ram_y_counter(window: &Window) -> [u8; 2] {
    [(window.y & 0xFF) as u8, (window.y >> 8) as u8]
}
