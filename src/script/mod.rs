//! Motion scripts: line-oriented text describing absolute (x, y) targets.
//!
//! A script line is either a command such as `x12 Y40`, or a terminator
//! (blank line or `#` comment). Interpretation lives in [`interpreter`],
//! whole-script metrics in [`estimator`].

pub mod estimator;
pub mod interpreter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use estimator::{estimate, format_hms, Estimate, TimingModel};
pub use interpreter::{Axis, Decoded, Interpreter, MotionState};

/// Lowest device-addressable axis value.
pub const AXIS_MIN: i32 = 0;
/// Highest device-addressable axis value (inclusive).
pub const AXIS_MAX: i32 = 3328;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("parse error on line {line}: invalid token '{token}'")]
    Parse { line: usize, token: String },
    #[error("invalid range on line {line}: {value} is outside {AXIS_MIN}..={AXIS_MAX}")]
    Range { line: usize, value: i64 },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Parse { line, .. } | ScriptError::Range { line, .. } => *line,
        }
    }
}

/// Absolute position in device units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Divide a scaled point back into script units.
    pub fn unscaled(self, multiplier: u32) -> Point {
        let m = multiplier.max(1) as i32;
        Point { x: self.x / m, y: self.y / m }
    }

    /// Dominant-axis distance between two points.
    pub fn steps_to(self, other: Point) -> u64 {
        let dx = (other.x as i64 - self.x as i64).unsigned_abs();
        let dy = (other.y as i64 - self.y as i64).unsigned_abs();
        dx.max(dy)
    }
}

/// Ordered lines of a motion script. Line order is device execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionScript {
    lines: Vec<String>,
}

impl MotionScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split text into lines, verbatim. A final newline does not produce a
    /// trailing blank line.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Point>,
    {
        Self {
            lines: points.into_iter().map(|p| format!("x{} y{}", p.x, p.y)).collect(),
        }
    }

    /// Drop blank and comment lines so that they no longer end the script early.
    pub fn without_comments(&self) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .cloned()
                .collect(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// One line per entry, each terminated by `\n`.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

impl From<Vec<String>> for MotionScript {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl From<&[&str]> for MotionScript {
    fn from(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl<const N: usize> From<[&str; N]> for MotionScript {
    fn from(lines: [&str; N]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}
