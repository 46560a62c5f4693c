//! Whole-script metrics: point count, dominant-axis step count, bounding box,
//! and the derived run time / physical size shown before a run.

use std::time::Duration;

use serde::Serialize;

use super::{Decoded, Interpreter, MotionScript, Point, ScriptError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Estimate {
    pub point_count: usize,
    pub total_steps: u64,
    pub width: u32,
    pub height: u32,
    /// Multiplier the script was replayed with.
    pub multiplier: u32,
}

impl Estimate {
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Engraved area in millimetres.
    ///
    /// Every point covers a multiplier-wide cell, so a span of `n` script units
    /// measures `n * multiplier` steps rather than the scaled bounding box.
    pub fn physical_size(&self, mm_per_step: f64) -> (f64, f64) {
        if self.is_empty() {
            return (0.0, 0.0);
        }
        let multiplier = self.multiplier.max(1) as u64;
        let extent =
            |scaled: u32| ((scaled as u64).saturating_sub(1) + multiplier) as f64 * mm_per_step;
        (extent(self.width), extent(self.height))
    }
}

/// Replay `script` through a fresh interpreter. Stops at the first blank or
/// comment line. Any parse or range error aborts the whole estimate.
pub fn estimate(script: &MotionScript, multiplier: u32) -> Result<Estimate, ScriptError> {
    let mut interp = Interpreter::new(multiplier);
    let mut previous = Point::ORIGIN;
    let mut bounds: Option<(Point, Point)> = None;
    let mut result = Estimate {
        multiplier,
        ..Estimate::default()
    };

    for (index, line) in script.lines().iter().enumerate() {
        let point = match interp.decode_line(line, index + 1)? {
            Decoded::Point(p) => p,
            Decoded::EndOfScript => break,
        };

        result.total_steps += previous.steps_to(point);
        result.point_count += 1;
        previous = point;

        bounds = Some(match bounds {
            None => (point, point),
            Some((min, max)) => (
                Point::new(min.x.min(point.x), min.y.min(point.y)),
                Point::new(max.x.max(point.x), max.y.max(point.y)),
            ),
        });
    }

    if let Some((min, max)) = bounds {
        result.width = (max.x - min.x) as u32 + 1;
        result.height = (max.y - min.y) as u32 + 1;
    }

    tracing::debug!(
        "Estimated {} points, {} steps, {}x{}",
        result.point_count,
        result.total_steps,
        result.width,
        result.height
    );
    Ok(result)
}

/// Per-point and per-step timing of the engraver firmware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingModel {
    /// Laser dwell per point.
    pub lase_time: Duration,
    /// Serial round trip and bookkeeping per point.
    pub point_overhead: Duration,
    pub step_time: Duration,
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            lase_time: Duration::from_millis(100),
            point_overhead: Duration::from_millis(12),
            step_time: Duration::from_millis(1),
        }
    }
}

impl TimingModel {
    pub fn duration(&self, estimate: &Estimate) -> Duration {
        let per_point = self.lase_time + self.point_overhead;
        let points = per_point.saturating_mul(estimate.point_count.min(u32::MAX as usize) as u32);
        let steps = Duration::from_nanos(
            (self.step_time.as_nanos() as u64).saturating_mul(estimate.total_steps),
        );
        points.saturating_add(steps)
    }
}

/// Render as `HH:MM:SS`, truncating sub-second precision.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, rest) = (total / 3600, total % 3600);
    format!("{:02}:{:02}:{:02}", hours, rest / 60, rest % 60)
}
