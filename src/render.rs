// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Raster backend for [`DrawCommand`] lists, plus font lookup.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut,
};

use crate::annotate::{Color, DrawCommand, LineStyle};
use crate::error::{GoniometryError, Result};
use crate::pose::Point;

/// Assets URL for downloading fonts
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Default label font.
pub const DEFAULT_FONT: &str = "Arial.ttf";

/// Give up on a font download after this long.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// [`DEFAULT_FONT`] via [`check_font`], looked up once per process.
pub fn default_font() -> Option<&'static Path> {
    static FONT: OnceLock<Option<PathBuf>> = OnceLock::new();
    FONT.get_or_init(|| check_font(DEFAULT_FONT)).as_deref()
}

/// Check if font exists locally or download it.
///
/// Fonts are cached in `<config dir>/Ultralytics/`. Returns `None` when the
/// font is not cached and cannot be downloaded.
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(font_name.as_ref());

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        crate::warn!("Failed to create config directory: {e}");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    crate::info!("Downloading {url} to {}", font_path.display());

    let request = ureq::get(&url)
        .config()
        .timeout_global(Some(DOWNLOAD_TIMEOUT))
        .build();
    match request.call() {
        Ok(response) => {
            let partial = font_path.with_extension("part");
            let mut file = match File::create(&partial) {
                Ok(f) => f,
                Err(e) => {
                    crate::warn!("Failed to create font file: {e}");
                    return None;
                }
            };

            let mut reader = response.into_body().into_reader();
            if let Err(e) = io::copy(&mut reader, &mut file) {
                crate::warn!("Failed to download font: {e}");
                let _ = fs::remove_file(&partial);
                return None;
            }
            if let Err(e) = fs::rename(&partial, &font_path) {
                crate::warn!("Failed to save font: {e}");
                let _ = fs::remove_file(&partial);
                return None;
            }

            Some(font_path)
        }
        Err(e) => {
            crate::warn!("Failed to download font from {url}: {e}");
            None
        }
    }
}

/// Load a TrueType/OpenType font from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid font.
pub fn load_font(path: &Path) -> Result<FontVec> {
    let data = fs::read(path).map_err(|e| {
        GoniometryError::IoError(format!("Failed to read font {}: {e}", path.display()))
    })?;
    FontVec::try_from_vec(data).map_err(|e| {
        GoniometryError::ImageError(format!("Invalid font {}: {e}", path.display()))
    })
}

const fn rgb(color: Color) -> Rgb<u8> {
    Rgb(color.channels())
}

#[allow(clippy::cast_possible_truncation)]
fn pixel(point: Point) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

/// Draw `commands` onto a copy of `image`.
///
/// Text commands are skipped when `font` is `None`. Commands are executed in
/// order, so later commands paint over earlier ones.
#[must_use]
pub fn render(image: &DynamicImage, commands: &[DrawCommand], font: Option<&FontVec>) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for command in commands {
        match command {
            DrawCommand::Circle {
                center,
                radius,
                color,
                filled,
            } => {
                #[allow(clippy::cast_possible_wrap)]
                let radius = *radius as i32;
                if *filled {
                    draw_filled_circle_mut(&mut canvas, pixel(*center), radius, rgb(*color));
                } else {
                    draw_hollow_circle_mut(&mut canvas, pixel(*center), radius, rgb(*color));
                }
            }
            DrawCommand::Line {
                from,
                to,
                color,
                thickness,
                style,
            } => match style {
                LineStyle::Solid => draw_thick_line(&mut canvas, *from, *to, *thickness, *color),
                LineStyle::Dashed { dash, gap } => {
                    for (start, end) in dashes(*from, *to, *dash, *gap) {
                        draw_thick_line(&mut canvas, start, end, *thickness, *color);
                    }
                }
            },
            DrawCommand::Text {
                origin,
                text,
                color,
                size,
            } => {
                if let Some(font) = font {
                    let (x, y) = pixel(*origin);
                    draw_text_mut(&mut canvas, rgb(*color), x, y, PxScale::from(*size), font, text);
                }
            }
        }
    }
    canvas
}

/// Draw a line `thickness` pixels wide as parallel one-pixel strokes.
fn draw_thick_line(canvas: &mut RgbImage, from: Point, to: Point, thickness: u32, color: Color) {
    let length = from.distance(&to);
    if length < f32::EPSILON {
        return;
    }
    // Unit normal to the segment
    let nx = -(to.y - from.y) / length;
    let ny = (to.x - from.x) / length;
    #[allow(clippy::cast_precision_loss)]
    let half = (thickness.max(1) - 1) as f32 / 2.0;
    let steps = thickness.max(1);
    for i in 0..steps {
        #[allow(clippy::cast_precision_loss)]
        let offset = i as f32 - half;
        draw_line_segment_mut(
            canvas,
            (from.x + nx * offset, from.y + ny * offset),
            (to.x + nx * offset, to.y + ny * offset),
            rgb(color),
        );
    }
}

/// Split `from → to` into dash segments.
fn dashes(from: Point, to: Point, dash: u32, gap: u32) -> Vec<(Point, Point)> {
    let length = from.distance(&to);
    #[allow(clippy::cast_precision_loss)]
    let (dash, gap) = (dash.max(1) as f32, gap as f32);
    if length < f32::EPSILON {
        return Vec::new();
    }
    let (ux, uy) = ((to.x - from.x) / length, (to.y - from.y) / length);
    let at = |d: f32| Point::new(from.x + ux * d, from.y + uy * d);

    let mut segments = Vec::new();
    let mut start = 0.0;
    while start < length {
        let end = (start + dash).min(length);
        segments.push((at(start), at(end)));
        start = end + gap;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_draws_pixels() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let commands = vec![
            DrawCommand::Circle {
                center: Point::new(10.0, 10.0),
                radius: 3,
                color: Color::RED,
                filled: true,
            },
            DrawCommand::Line {
                from: Point::new(0.0, 40.0),
                to: Point::new(63.0, 40.0),
                color: Color::BLUE,
                thickness: 1,
                style: LineStyle::Solid,
            },
        ];
        let out = render(&image, &commands, None);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(10, 10), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(30, 40), &Rgb([0, 0, 255]));
        assert_eq!(out.get_pixel(50, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_text_skipped_without_font() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(32, 32));
        let commands = vec![DrawCommand::Text {
            origin: Point::new(1.0, 1.0),
            text: "Knee".to_string(),
            color: Color::WHITE,
            size: 12.0,
        }];
        let out = render(&image, &commands, None);
        assert!(out.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_input_not_mutated() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let commands = vec![DrawCommand::Circle {
            center: Point::new(8.0, 8.0),
            radius: 4,
            color: Color::GREEN,
            filled: true,
        }];
        let _ = render(&image, &commands, None);
        assert!(image.to_rgb8().pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_dashes_have_gaps() {
        let segments = dashes(Point::new(0.0, 0.0), Point::new(0.0, 100.0), 10, 5);
        assert_eq!(segments.len(), 7);
        assert_eq!(segments[0], (Point::new(0.0, 0.0), Point::new(0.0, 10.0)));
        assert_eq!(segments[1].0, Point::new(0.0, 15.0));
        assert!(dashes(Point::new(1.0, 1.0), Point::new(1.0, 1.0), 10, 5).is_empty());
    }

    #[test]
    fn test_load_font_missing_file() {
        assert!(load_font(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
