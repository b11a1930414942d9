use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::analysis::OrderSample;
use crate::output::{OutputArtifacts, ScanArtifacts};
use crate::scan::CouplingScanPoint;

const CANVAS_SIZE: (u32, u32) = (680, 540);
const STACKED_CANVAS: (u32, u32) = (680, 820);

pub fn render_order_parameter(artifacts: &OutputArtifacts, trace: &[OrderSample]) -> Result<()> {
    if trace.is_empty() {
        return Err(anyhow!("No order parameter samples available for plotting"));
    }

    if artifacts.toggles.png {
        ensure_parent(&artifacts.order_png)?;
        let backend = BitMapBackend::new(&artifacts.order_png, STACKED_CANVAS);
        draw_order_chart(backend.into_drawing_area(), trace)?;
    }

    if artifacts.toggles.svg {
        ensure_parent(&artifacts.order_svg)?;
        let backend = SVGBackend::new(&artifacts.order_svg, STACKED_CANVAS);
        draw_order_chart(backend.into_drawing_area(), trace)?;
    }

    Ok(())
}

pub fn render_coupling_scan(artifacts: &ScanArtifacts, points: &[CouplingScanPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(anyhow!("No samples available for coherence versus coupling plot"));
    }

    let series: Vec<(f64, f64)> = points.iter().map(|p| (p.coupling, p.r_mean)).collect();

    if artifacts.toggles.png {
        ensure_parent(&artifacts.plot_png)?;
        let backend = BitMapBackend::new(&artifacts.plot_png, CANVAS_SIZE);
        draw_scan_chart(backend.into_drawing_area(), &series)?;
    }

    if artifacts.toggles.svg {
        ensure_parent(&artifacts.plot_svg)?;
        let backend = SVGBackend::new(&artifacts.plot_svg, CANVAS_SIZE);
        draw_scan_chart(backend.into_drawing_area(), &series)?;
    }

    Ok(())
}

fn draw_order_chart<DB>(root: DrawingArea<DB, Shift>, trace: &[OrderSample]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically((STACKED_CANVAS.1 / 2) as i32);

    let coherence: Vec<(f64, f64)> = trace.iter().map(|s| (s.time, s.r)).collect();
    let mean_phase: Vec<(f64, f64)> = trace.iter().map(|s| (s.time, s.psi)).collect();

    draw_series_panel(&upper, "Coherence r versus time", "r", &coherence, 0.0..1.05)?;
    draw_series_panel(&lower, "Mean phase ψ versus time", "ψ (radians)", &mean_phase, -PI..PI)?;

    root.present()
        .map_err(|e| anyhow!("Failed to render order parameter chart: {:?}", e))?;
    Ok(())
}

fn draw_series_panel<DB>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    y_label: &str,
    series: &[(f64, f64)],
    y_range: std::ops::Range<f64>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let time_start = series.first().map(|p| p.0).unwrap_or(0.0);
    let mut time_end = series.last().map(|p| p.0).unwrap_or(time_start + 1.0);
    if time_end - time_start < 1e-12 {
        time_end = time_start + 1.0;
    }

    let (title_area, chart_area) = area.split_vertically(36);
    draw_title(&title_area, title)?;

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(20)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(time_start..time_end, y_range)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("time")
        .y_desc(y_label)
        .y_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart.draw_series(LineSeries::new(series.iter().copied(), &BLACK))?;
    Ok(())
}

fn draw_scan_chart<DB>(root: DrawingArea<DB, Shift>, series: &[(f64, f64)]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (title_area, chart_area) = root.split_vertically(36);
    draw_title(&title_area, "Time-averaged coherence versus coupling")?;

    let (k_min, k_max) = min_max(series.iter().map(|p| p.0));

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(40)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(k_min..k_max, 0.0..1.05)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("coupling K")
        .y_desc("⟨r⟩")
        .x_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart.draw_series(LineSeries::new(series.iter().copied(), &BLACK))?;
    chart.draw_series(
        series
            .iter()
            .map(|&(k, r)| Circle::new((k, r), 4, BLACK.filled())),
    )?;

    root.present()
        .map_err(|e| anyhow!("Failed to render coupling scan chart: {:?}", e))?;
    Ok(())
}

fn draw_title<DB>(area: &DrawingArea<DB, Shift>, title: &str) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let style = ("sans-serif", 26)
        .into_text_style(area)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let dims = area.dim_in_pixel();
    area.draw_text(title, &style, (dims.0 as i32 / 2, dims.1 as i32 / 2))?;
    Ok(())
}

fn min_max<I>(values: I) -> (f64, f64)
where
    I: Iterator<Item = f64>,
{
    let mut iter = values.peekable();
    if iter.peek().is_none() {
        return (0.0, 1.0);
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for val in iter {
        if val < min {
            min = val;
        }
        if val > max {
            max = val;
        }
    }

    if (max - min).abs() < f64::EPSILON {
        let epsilon = if min.abs() < 1.0 {
            1.0
        } else {
            min.abs() * 0.05
        };
        (min - epsilon, max + epsilon)
    } else {
        (min, max)
    }
}

fn format_decimal_tick(value: f64) -> String {
    if value.abs() >= 1e4 || (value != 0.0 && value.abs() < 1e-3) {
        format!("{:.1e}", value)
    } else {
        format!("{:.6}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create plot directory {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_drop_trailing_zeros() {
        assert_eq!(format_decimal_tick(0.5), "0.5");
        assert_eq!(format_decimal_tick(2.0), "2");
        assert_eq!(format_decimal_tick(0.0), "0");
        assert_eq!(format_decimal_tick(25000.0), "2.5e4");
    }

    #[test]
    fn degenerate_range_is_widened() {
        assert_eq!(min_max([0.5, 0.5].into_iter()), (-0.5, 1.5));
        assert_eq!(min_max([0.5, -1.0, 3.0].into_iter()), (-1.0, 3.0));
    }
}
