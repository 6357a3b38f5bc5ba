use itertools::Itertools;
use log::warn;
use plotters::prelude::*;

use crate::error::FrameplotError;
use crate::probe::FrameRecord;

/// Fixed output path, overwritten on every run.
pub const CHART_PATH: &str = "frames.png";

// 16x8 figure units at 300 dpi.
const CHART_SIZE: (u32, u32) = (4800, 2400);
const BAR_HALF_WIDTH: f64 = 2.0;
const POINT_RADIUS: i32 = 2;

/// The closed set of picture types with a defined rendering. Anything else
/// coming out of ffprobe fails the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictType {
    I,
    P,
    B,
}

impl PictType {
    pub fn from_code(code: &str) -> Result<Self, FrameplotError> {
        match code {
            "I" => Ok(Self::I),
            "P" => Ok(Self::P),
            "B" => Ok(Self::B),
            other => Err(FrameplotError::UnknownPictType(other.to_string())),
        }
    }

    fn color(self) -> RGBColor {
        match self {
            Self::I => RED,
            Self::P => GREEN,
            Self::B => BLUE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::I => "I",
            Self::P => "P",
            Self::B => "B",
        }
    }
}

/// Instantaneous packet bitrate in kbps, rounded to two decimals. `None`
/// when the packet duration is zero and the bitrate is undefined.
pub fn bitrate_kbps(pkt_size: u64, pkt_duration_time: f64) -> Option<f64> {
    if pkt_duration_time == 0.0 {
        return None;
    }
    Some(round2(pkt_size as f64 * 8.0 / pkt_duration_time / 1000.0))
}

// Half-away-from-zero at two decimals.
fn round2(kbps: f64) -> f64 {
    (kbps * 100.0).round() / 100.0
}

/// Distinct picture types in first-appearance order; one legend entry each.
fn observed_types(kinds: &[PictType]) -> Vec<PictType> {
    kinds.iter().copied().unique().collect()
}

pub fn render(frames: &[FrameRecord]) -> Result<(), FrameplotError> {
    render_to(frames, CHART_PATH)
}

fn render_to(frames: &[FrameRecord], path: &str) -> Result<(), FrameplotError> {
    // Resolve every type up front so an unrecognized code fails before the
    // output file is touched.
    let kinds = frames
        .iter()
        .map(|f| PictType::from_code(&f.pict_type))
        .collect::<Result<Vec<_>, _>>()?;

    let samples = frames
        .iter()
        .enumerate()
        .map(|(i, f)| match bitrate_kbps(f.pkt_size, f.pkt_duration_time) {
            Some(kbps) => kbps,
            None => {
                warn!("frame {} has zero packet duration, plotting it at 0 kbps", i);
                0.0
            }
        })
        .collect::<Vec<f64>>();

    let y_max = samples.iter().copied().fold(0.0_f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };
    let x_max = frames.len().max(1) as f64;

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(FrameplotError::chart)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(30)
        .x_label_area_size(90)
        .y_label_area_size(120)
        .build_cartesian_2d(-0.5..x_max - 0.5, 0.0..y_max)
        .map_err(FrameplotError::chart)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .bold_line_style(RGBColor(128, 128, 128).mix(0.5))
        .light_line_style(TRANSPARENT)
        .label_style(("sans-serif", 32))
        .axis_desc_style(("sans-serif", 40))
        .x_desc("Frame")
        .y_desc("Packet Bitrate (kbps)")
        .draw()
        .map_err(FrameplotError::chart)?;

    for kind in observed_types(&kinds) {
        let points = kinds
            .iter()
            .zip(samples.iter())
            .enumerate()
            .filter(|(_, (k, _))| **k == kind)
            .map(|(i, (_, y))| (i as f64, *y))
            .collect::<Vec<(f64, f64)>>();

        let color = kind.color();
        // Keyframes get a wide bar so their spikes stand out against the
        // scatter of inter frames.
        let series = if kind == PictType::I {
            chart
                .draw_series(points.iter().map(|&(x, y)| {
                    Rectangle::new(
                        [(x - BAR_HALF_WIDTH, 0.0), (x + BAR_HALF_WIDTH, y)],
                        color.filled(),
                    )
                }))
                .map_err(FrameplotError::chart)?
        } else {
            chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y)| Circle::new((x, y), POINT_RADIUS, color.filled())),
                )
                .map_err(FrameplotError::chart)?
        };
        series
            .label(kind.label())
            .legend(move |(x, y)| Circle::new((x + 10, y), 8, color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 36))
        .draw()
        .map_err(FrameplotError::chart)?;

    root.present().map_err(FrameplotError::chart)?;

    Ok(())
}
