// src/raster/mod.rs - bitmap to motion script conversion
pub mod image_input;

use crate::script::{MotionScript, Point};

/// Luminance below this value is foreground (burned).
pub const DEFAULT_THRESHOLD: u8 = 10;

/// Row-major 8-bit luminance grid, row 0 at the top of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Returns `None` when `pixels` does not hold exactly `width * height` values.
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    /// Build from rows of `true` = foreground, convenient for small fixtures.
    pub fn from_rows<R: AsRef<[bool]>>(rows: &[R]) -> Option<Self> {
        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0) as u32;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in rows {
            let row = row.as_ref();
            if row.len() != width as usize {
                return None;
            }
            pixels.extend(row.iter().map(|&on| if on { 0 } else { 255 }));
        }
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self, column: u32, row: u32) -> u8 {
        self.pixels[row as usize * self.width as usize + column as usize]
    }
}

/// Serpentine raster scan.
#[derive(Debug, Clone, Copy)]
pub struct RasterConverter {
    threshold: u8,
}

impl Default for RasterConverter {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl RasterConverter {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Foreground pixels in travel order, normalized so the smallest x and y are 0.
    ///
    /// Rows are scanned bottom-up so that device y grows upwards. Even output
    /// rows run left to right, odd rows right to left.
    pub fn scan(&self, bitmap: &Bitmap) -> Vec<Point> {
        let (width, height) = (bitmap.width(), bitmap.height());
        let mut points = Vec::new();

        for y in 0..height {
            let row = height - y - 1;
            let is_foreground = |x: u32| bitmap.luma(x, row) < self.threshold;
            let to_point = |x: u32| Point::new(x as i32, y as i32);
            if y % 2 == 0 {
                points.extend((0..width).filter(|&x| is_foreground(x)).map(to_point));
            } else {
                points.extend((0..width).rev().filter(|&x| is_foreground(x)).map(to_point));
            }
        }

        let min_x = points.iter().map(|p| p.x).min().unwrap_or(0);
        let min_y = points.iter().map(|p| p.y).min().unwrap_or(0);
        for p in &mut points {
            p.x -= min_x;
            p.y -= min_y;
        }

        tracing::debug!("Scanned {}x{} bitmap into {} points", width, height, points.len());
        points
    }

    /// Scan and serialize as `x<X> y<Y>` lines.
    pub fn convert(&self, bitmap: &Bitmap) -> MotionScript {
        MotionScript::from_points(self.scan(bitmap))
    }
}
