// src/script/interpreter.rs - line-by-line motion script decoding
use std::num::{IntErrorKind, ParseIntError};

use super::{Point, ScriptError, AXIS_MAX, AXIS_MIN};

/// Axis selected by the first character of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn from_letter(letter: char) -> Option<Axis> {
        match letter {
            'x' | 'X' => Some(Axis::X),
            'y' | 'Y' => Some(Axis::Y),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
        }
    }
}

/// Last commanded table position. Axes missing from a line are held here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    pub x: i32,
    pub y: i32,
    pub tool_on: bool,
}

impl MotionState {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn set(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
    }
}

/// Result of decoding one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Point(Point),
    /// Blank or comment line: stop consuming the script here.
    EndOfScript,
}

/// Decodes script lines into absolute points, scaling every axis value by
/// `multiplier`. Each pass over a script should use its own instance.
#[derive(Debug, Clone)]
pub struct Interpreter {
    multiplier: u32,
    state: MotionState,
}

impl Interpreter {
    pub fn new(multiplier: u32) -> Self {
        Self {
            multiplier,
            state: MotionState::default(),
        }
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    /// Decode `line`; `line_number` is 1-based and only used in errors.
    pub fn decode_line(&mut self, line: &str, line_number: usize) -> Result<Decoded, ScriptError> {
        if line.is_empty() || line.starts_with('#') {
            return Ok(Decoded::EndOfScript);
        }

        // Commit only once every token on the line is valid.
        let mut next = self.state;
        for token in line.split_whitespace() {
            let (axis, value) = self.decode_token(token, line_number)?;
            next.set(axis, value);
        }
        self.state = next;

        Ok(Decoded::Point(self.state.position()))
    }

    fn decode_token(&self, token: &str, line_number: usize) -> Result<(Axis, i32), ScriptError> {
        let parse_error = || ScriptError::Parse {
            line: line_number,
            token: token.to_string(),
        };

        let mut chars = token.chars();
        let axis = chars.next().and_then(Axis::from_letter).ok_or_else(parse_error)?;
        // A well-formed integer too wide for i64 is still out of range, not malformed.
        let raw: i64 = chars.as_str().parse().map_err(|e: ParseIntError| match e.kind() {
            IntErrorKind::PosOverflow => ScriptError::Range { line: line_number, value: i64::MAX },
            IntErrorKind::NegOverflow => ScriptError::Range { line: line_number, value: i64::MIN },
            _ => parse_error(),
        })?;

        let value = raw
            .checked_mul(self.multiplier as i64)
            .ok_or(ScriptError::Range { line: line_number, value: raw })?;
        if !(AXIS_MIN as i64..=AXIS_MAX as i64).contains(&value) {
            return Err(ScriptError::Range { line: line_number, value });
        }

        Ok((axis, value as i32))
    }
}
