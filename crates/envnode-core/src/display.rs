//! Panel-facing side of the display phase.

/// Logical screen areas. Pixel bounds belong to the panel driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DisplayRegion {
    InsideTemperature = 0,
    InsideHumidity = 1,
    OutsideTemperature = 2,
    OutsideHumidity = 3,
    Pressure = 4,
    Weather = 5,
    Status = 6,
}

impl DisplayRegion {
    pub const COUNT: usize = 7;

    pub const ALL: [DisplayRegion; Self::COUNT] = [
        Self::InsideTemperature,
        Self::InsideHumidity,
        Self::OutsideTemperature,
        Self::OutsideHumidity,
        Self::Pressure,
        Self::Weather,
        Self::Status,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|region| region.id() == id)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::InsideTemperature => "inside_temp",
            Self::InsideHumidity => "inside_rh",
            Self::OutsideTemperature => "outside_temp",
            Self::OutsideHumidity => "outside_rh",
            Self::Pressure => "pressure",
            Self::Weather => "weather",
            Self::Status => "status",
        }
    }
}

/// E-ink style panel: every redraw is opened, drawn into, then committed.
/// `commit` only starts the refresh; callers poll `is_busy` until it settles.
pub trait DisplayDriver {
    type Error: core::fmt::Debug;

    fn begin_full_redraw(&mut self) -> Result<(), Self::Error>;

    fn begin_partial_redraw(&mut self, region: DisplayRegion) -> Result<(), Self::Error>;

    fn draw_text(&mut self, region: DisplayRegion, text: &str) -> Result<(), Self::Error>;

    /// `icon_id < 0` draws the "unknown" glyph.
    fn draw_icon(&mut self, region: DisplayRegion, icon_id: i32) -> Result<(), Self::Error>;

    fn commit(&mut self) -> Result<(), Self::Error>;

    fn is_busy(&mut self) -> Result<bool, Self::Error>;

    fn power_down(&mut self) -> Result<(), Self::Error>;
}
