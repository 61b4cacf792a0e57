//! Portrait layout of the 128x296 panel and the drawing for each region.

use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        ascii::{FONT_6X10, FONT_10X20},
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use envnode_core::display::DisplayRegion;
use ssd1680::{Canvas, FrameBuffer, Window, protocol::WIDTH};

const MARGIN: i32 = 4;
const LABEL_HEIGHT: i32 = 12;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionLayout {
    pub window: Window,
    pub label: &'static str,
    pub unit: &'static str,
    pub large: bool,
}

const fn band(y: u16, height: u16) -> Window {
    Window {
        x: 0,
        y,
        width: WIDTH as u16,
        height,
    }
}

/// Bands stacked top to bottom; every band spans the full, byte-aligned
/// panel width so partial windows never split a byte.
pub const fn layout(region: DisplayRegion) -> RegionLayout {
    match region {
        DisplayRegion::InsideTemperature => RegionLayout {
            window: band(0, 56),
            label: "INSIDE",
            unit: "F",
            large: true,
        },
        DisplayRegion::InsideHumidity => RegionLayout {
            window: band(56, 32),
            label: "IN RH",
            unit: "%",
            large: false,
        },
        DisplayRegion::OutsideTemperature => RegionLayout {
            window: band(88, 56),
            label: "OUTSIDE",
            unit: "F",
            large: true,
        },
        DisplayRegion::OutsideHumidity => RegionLayout {
            window: band(144, 32),
            label: "OUT RH",
            unit: "%",
            large: false,
        },
        DisplayRegion::Pressure => RegionLayout {
            window: band(176, 32),
            label: "PRESSURE",
            unit: "hPa",
            large: false,
        },
        DisplayRegion::Weather => RegionLayout {
            window: band(208, 56),
            label: "WEATHER",
            unit: "",
            large: false,
        },
        DisplayRegion::Status => RegionLayout {
            window: band(264, 32),
            label: "",
            unit: "",
            large: false,
        },
    }
}

fn draw_label(canvas: &mut Canvas<'_>, layout: &RegionLayout) {
    if layout.label.is_empty() {
        return;
    }
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let _ = Text::with_baseline(layout.label, Point::new(MARGIN, 2), style, Baseline::Top)
        .draw(canvas);
}

/// Rule along the bottom row of the region.
fn draw_separator(canvas: &mut Canvas<'_>) {
    let y = canvas.window().height as i32 - 1;
    let _ = Line::new(Point::new(MARGIN, y), Point::new(WIDTH as i32 - 1 - MARGIN, y))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(canvas);
}

/// Label, value and unit for a numeric region; status text for the footer.
pub fn render_text(frame: &mut FrameBuffer, region: DisplayRegion, text: &str) {
    let layout = layout(region);
    let canvas = &mut frame.canvas(layout.window);
    draw_label(canvas, &layout);

    let small = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let value_at = if layout.label.is_empty() {
        Point::new(MARGIN, 10)
    } else {
        Point::new(MARGIN, LABEL_HEIGHT + 2)
    };

    let next = if layout.large {
        let large = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
        Text::with_baseline(text, value_at, large, Baseline::Top).draw(canvas)
    } else {
        Text::with_baseline(text, value_at, small, Baseline::Top).draw(canvas)
    };

    if let Ok(end) = next
        && !layout.unit.is_empty()
        && text != "--"
    {
        let _ = Text::with_baseline(layout.unit, end + Point::new(2, 0), small, Baseline::Top)
            .draw(canvas);
    }

    if region != DisplayRegion::Status {
        draw_separator(canvas);
    }
}

/// Icon codes pushed by the home server on `<prefix>/outside/icon`.
pub const fn icon_name(icon_id: i32) -> &'static str {
    match icon_id {
        0 => "clear",
        1 => "partly cloudy",
        2 => "cloudy",
        3 => "rain",
        4 => "snow",
        5 => "storm",
        6 => "fog",
        _ => "unknown",
    }
}

pub fn render_icon(frame: &mut FrameBuffer, region: DisplayRegion, icon_id: i32) {
    let layout = layout(region);
    let canvas = &mut frame.canvas(layout.window);
    draw_label(canvas, &layout);

    let base = Point::new(MARGIN, LABEL_HEIGHT + 2);
    let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 2);
    let fill = PrimitiveStyle::with_fill(BinaryColor::On);

    match icon_id {
        0 => draw_sun(canvas, base + Point::new(18, 18), stroke),
        1 => {
            draw_sun(canvas, base + Point::new(24, 12), stroke);
            draw_cloud(canvas, base + Point::new(2, 16), fill);
        }
        2 => draw_cloud(canvas, base + Point::new(2, 10), fill),
        3 | 4 | 5 => {
            draw_cloud(canvas, base, fill);
            for step in 0..3 {
                let top = base + Point::new(8 + step * 10, 26);
                match icon_id {
                    3 => {
                        let _ = Line::new(top, top + Point::new(-4, 10))
                            .into_styled(stroke)
                            .draw(canvas);
                    }
                    4 => {
                        let _ = Circle::new(top + Point::new(-2, 4), 5)
                            .into_styled(fill)
                            .draw(canvas);
                    }
                    _ => {
                        let mid = top + Point::new(-4, 5);
                        let _ = Line::new(top, mid).into_styled(stroke).draw(canvas);
                        let _ = Line::new(mid, mid + Point::new(4, 5))
                            .into_styled(stroke)
                            .draw(canvas);
                    }
                }
            }
        }
        6 => {
            for row in 0..4 {
                let y = 6 + row * 8;
                let _ = Line::new(base + Point::new(0, y), base + Point::new(36, y))
                    .into_styled(stroke)
                    .draw(canvas);
            }
        }
        _ => {
            let large = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
            let _ = Text::with_baseline("?", base + Point::new(12, 8), large, Baseline::Top)
                .draw(canvas);
        }
    }

    let small = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let _ = Text::with_baseline(icon_name(icon_id), base + Point::new(48, 14), small, Baseline::Top)
        .draw(canvas);
    draw_separator(canvas);
}

fn draw_sun(canvas: &mut Canvas<'_>, center: Point, stroke: PrimitiveStyle<BinaryColor>) {
    let _ = Circle::with_center(center, 18).into_styled(stroke).draw(canvas);
    for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
        let from = center + Point::new(dx * 12, dy * 12);
        let to = center + Point::new(dx * 16, dy * 16);
        let _ = Line::new(from, to).into_styled(stroke).draw(canvas);
    }
}

fn draw_cloud(canvas: &mut Canvas<'_>, top_left: Point, fill: PrimitiveStyle<BinaryColor>) {
    let _ = Circle::new(top_left + Point::new(4, 4), 16).into_styled(fill).draw(canvas);
    let _ = Circle::new(top_left + Point::new(14, 0), 20).into_styled(fill).draw(canvas);
    let _ = Rectangle::new(top_left + Point::new(4, 12), Size::new(34, 10))
        .into_styled(fill)
        .draw(canvas);
}
