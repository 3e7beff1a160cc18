//! Daily-attempts charts, one PNG per segment.
//!
//! Layout: `{plot_dir}/segment_{id}_plot.png`, 1200x600, line with markers,
//! dashed grid, y-axis anchored at zero, a heading naming the segment and
//! captions on both axes. The series always starts with a
//! synthetic zero point one day before the first observation so a single
//! observation still draws a line.

mod canvas;
mod glyphs;

use crate::ledger::{LogRow, SegmentLog};
use crate::strava::SegmentId;
use canvas::Canvas;
use chrono::{Duration, NaiveDate};
use image::{ImageFormat, Rgb};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const WIDTH: u32 = 1200;
pub const HEIGHT: u32 = 600;

const MARGIN_LEFT: i64 = 90;
const MARGIN_RIGHT: i64 = 40;
const MARGIN_TOP: i64 = 80;
const MARGIN_BOTTOM: i64 = 70;
const Y_INTERVALS: u64 = 5;
const MAX_X_TICKS: usize = 8;
const LABEL_SCALE: i64 = 2;
const TITLE_SCALE: i64 = 3;
const TITLE_TOP: i64 = 16;

const Y_CAPTION: &str = "Daily Attempts";
const X_CAPTION: &str = "Date";

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([200, 200, 200]);
const SERIES: Rgb<u8> = Rgb([31, 119, 180]);

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("plot I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Output path for a segment's chart.
pub fn plot_path(dir: &Path, id: SegmentId) -> PathBuf {
    dir.join(format!("segment_{id}_plot.png"))
}

/// Points to draw: a zero point the day before the first row, then one per row.
///
/// `rows` must already be ordered by date.
pub fn build_series(rows: &[&LogRow]) -> Vec<(NaiveDate, u64)> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let mut series = Vec::with_capacity(rows.len() + 1);
    series.push((first.date - Duration::days(1), 0));
    series.extend(rows.iter().map(|r| (r.date, r.daily_attempts)));
    series
}

/// Tick spacing that gives `intervals` round steps covering `max`.
pub fn nice_step(max: u64, intervals: u64) -> u64 {
    let intervals = intervals.max(1);
    let raw = max.max(1).div_ceil(intervals);
    let mut magnitude = 1u64;
    while magnitude.saturating_mul(10) <= raw {
        magnitude *= 10;
    }
    [1, 2, 5, 10]
        .into_iter()
        .map(|m| m * magnitude)
        .find(|&step| step >= raw)
        .unwrap_or(10 * magnitude)
}

/// Chart heading, with the name shortened when the full heading would not fit
/// across the image.
pub fn plot_title(name: &str, id: SegmentId) -> String {
    let full = format!("Daily Attempts on Segment: {name} ({id})");
    let capacity = ((WIDTH as i64 - 2 * MARGIN_RIGHT) / glyphs::advance(TITLE_SCALE)) as usize;
    let len = full.chars().count();
    if len <= capacity {
        return full;
    }
    let keep = name.chars().count().saturating_sub(len - capacity + 2);
    let short: String = name.chars().take(keep).collect();
    format!("Daily Attempts on Segment: {}.. ({id})", short.trim_end())
}

/// Render the daily-attempts chart for one segment.
///
/// Returns `Ok(None)` when the segment has no rows.
pub fn render_segment_plot(
    rows: &[&LogRow],
    id: SegmentId,
    dir: &Path,
) -> Result<Option<PathBuf>, PlotError> {
    let series = build_series(rows);
    if series.is_empty() {
        tracing::info!(segment = %id, "no rows for segment, plot skipped");
        return Ok(None);
    }

    fs::create_dir_all(dir).map_err(|source| PlotError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = plot_path(dir, id);
    let tmp = path.with_extension("png.tmp");

    // Latest name wins if the segment was renamed on Strava.
    let name = rows.last().map_or("", |r| r.segment_name.as_str());
    draw_chart(&series, &plot_title(name, id))
        .into_image()
        .save_with_format(&tmp, ImageFormat::Png)?;

    fs::rename(&tmp, &path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        PlotError::Io {
            path: path.clone(),
            source,
        }
    })?;

    tracing::info!(segment = %id, path = %path.display(), "plot saved");
    Ok(Some(path))
}

/// Render every segment in `segments` from the log. Failures are logged and skipped.
pub fn render_all(log: &SegmentLog, segments: &[SegmentId], dir: &Path) -> Vec<PathBuf> {
    segments
        .iter()
        .filter_map(|&id| match render_segment_plot(&log.rows_for(id), id, dir) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(segment = %id, error = %e, "plot generation failed");
                None
            }
        })
        .collect()
}

struct Frame {
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
    first_day: NaiveDate,
    day_span: i64,
    y_max: u64,
}

impl Frame {
    fn x(&self, date: NaiveDate) -> i64 {
        let offset = (date - self.first_day).num_days();
        self.left + offset * (self.right - self.left) / self.day_span
    }

    fn y(&self, value: u64) -> i64 {
        let h = (self.bottom - self.top) as f64;
        self.bottom - (value as f64 / self.y_max as f64 * h).round() as i64
    }
}

/// `series` must be non-empty.
fn draw_chart(series: &[(NaiveDate, u64)], title: &str) -> Canvas {
    let mut canvas = Canvas::new(WIDTH, HEIGHT, BACKGROUND);

    let (first_day, last_day) = series
        .iter()
        .fold((series[0].0, series[0].0), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)));
    let max_value = series.iter().map(|p| p.1).max().unwrap_or(0);
    let step = nice_step(max_value, Y_INTERVALS);

    let frame = Frame {
        left: MARGIN_LEFT,
        right: canvas.width() - MARGIN_RIGHT,
        top: MARGIN_TOP,
        bottom: canvas.height() - MARGIN_BOTTOM,
        first_day,
        day_span: (last_day - first_day).num_days().max(1),
        y_max: step * Y_INTERVALS,
    };

    // Horizontal grid + y labels
    for i in 0..=Y_INTERVALS {
        let value = step * i;
        let y = frame.y(value);
        if i > 0 {
            canvas.dashed_hline(y, frame.left, frame.right, 6, 4, GRID);
        }
        let label = value.to_string();
        let w = Canvas::text_width(&label, LABEL_SCALE);
        canvas.text(frame.left - 12 - w, y - 5, &label, LABEL_SCALE, AXIS);
    }

    // Vertical grid + date labels
    for date in x_ticks(first_day, last_day) {
        let x = frame.x(date);
        if x > frame.left {
            canvas.dashed_vline(x, frame.top, frame.bottom, 6, 4, GRID);
        }
        let label = date.format("%Y-%m-%d").to_string();
        let w = Canvas::text_width(&label, LABEL_SCALE);
        canvas.text(x - w / 2, frame.bottom + 14, &label, LABEL_SCALE, AXIS);
    }

    let title_width = Canvas::text_width(title, TITLE_SCALE);
    canvas.text(
        (canvas.width() - title_width) / 2,
        TITLE_TOP,
        title,
        TITLE_SCALE,
        AXIS,
    );
    canvas.text(12, frame.top - 26, Y_CAPTION, LABEL_SCALE, AXIS);
    let caption_width = Canvas::text_width(X_CAPTION, LABEL_SCALE);
    canvas.text(
        (frame.left + frame.right - caption_width) / 2,
        frame.bottom + 40,
        X_CAPTION,
        LABEL_SCALE,
        AXIS,
    );

    canvas.line((frame.left, frame.top), (frame.left, frame.bottom), AXIS, 2);
    canvas.line((frame.left, frame.bottom), (frame.right, frame.bottom), AXIS, 2);

    let points: Vec<(i64, i64)> = series
        .iter()
        .map(|&(d, v)| (frame.x(d), frame.y(v)))
        .collect();
    for pair in points.windows(2) {
        canvas.line(pair[0], pair[1], SERIES, 2);
    }
    for &(x, y) in &points {
        canvas.filled_circle(x, y, 4, SERIES);
    }

    canvas
}

/// Evenly spaced dates from `first` to `last`, both included.
fn x_ticks(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let span = (last - first).num_days().max(0);
    let intervals = MAX_X_TICKS as i64 - 1;
    let step = ((span + intervals - 1) / intervals).max(1);
    let mut ticks: Vec<NaiveDate> = (0..=span)
        .step_by(step as usize)
        .map(|d| first + Duration::days(d))
        .collect();
    if let Some(&prev) = ticks.last() {
        if prev != last {
            // Keep the final label from crowding its neighbour.
            if ticks.len() > 1 && (last - prev).num_days() * 2 < step {
                ticks.pop();
            }
            ticks.push(last);
        }
    }
    ticks
}
