// Bar charts rasterised in memory for embedding in reports

use plotters::prelude::*;

use super::pdf::{RasterImage, Rgb};
use crate::types::{WorkerError, WorkerResult};

pub const CHART_WIDTH: u32 = 900;
pub const CHART_HEIGHT: u32 = 360;

/// Colour of the `index`-th bar, for matching legends.
pub fn series_color(index: usize) -> Rgb {
    let (r, g, b) = Palette99::pick(index).rgb();
    Rgb(r, g, b)
}

/// Draw one bar per value. Labels are left to the caller, which prints them as a legend
/// using [`series_color`].
///
/// Returns `None` when there is nothing to plot (no values, or all of them zero or
/// negative).
pub fn bar_chart(values: &[f64], width: u32, height: u32) -> WorkerResult<Option<RasterImage>> {
    let max = values.iter().copied().filter(|v| v.is_finite()).fold(0.0, f64::max);
    if values.is_empty() || max <= 0.0 || width == 0 || height == 0 {
        return Ok(None);
    }

    let mut rgb = vec![255u8; (width as usize) * (height as usize) * 3];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let slots = values.len() as f64;
        let top = max * 1.1;
        let mut chart = ChartBuilder::on(&root)
            .margin(16)
            .build_cartesian_2d(0f64..slots, 0f64..top)
            .map_err(render_err)?;

        let grid = RGBColor(229, 231, 235);
        chart
            .draw_series((1..=4).map(|step| {
                let y = top * step as f64 / 4.0;
                PathElement::new(vec![(0.0, y), (slots, y)], grid.stroke_width(1))
            }))
            .map_err(render_err)?;

        chart
            .draw_series(values.iter().enumerate().map(|(i, value)| {
                let x = i as f64;
                let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
                Rectangle::new([(x + 0.15, 0.0), (x + 0.85, value)], Palette99::pick(i).filled())
            }))
            .map_err(render_err)?;

        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0.0, 0.0), (slots, 0.0)],
                BLACK.stroke_width(1),
            )))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    Ok(Some(RasterImage { width, height, rgb }))
}

fn render_err<E: std::fmt::Display>(e: E) -> WorkerError {
    WorkerError::Render(format!("chart drawing failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_zero_series_have_no_chart() {
        assert!(bar_chart(&[], 100, 50).unwrap().is_none());
        assert!(bar_chart(&[0.0, 0.0], 100, 50).unwrap().is_none());
    }

    #[test]
    fn test_bars_are_drawn() {
        let image = bar_chart(&[3.0, 1.0, 2.0], 120, 60).unwrap().unwrap();
        assert_eq!(image.rgb.len(), 120 * 60 * 3);
        // Something other than the white background was painted
        assert!(image.rgb.chunks(3).any(|px| px != [255, 255, 255]));
    }

    #[test]
    fn test_series_colors_differ() {
        assert_ne!(series_color(0), series_color(1));
    }
}
