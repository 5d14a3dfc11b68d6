//! Sticker rendering
//!
//! A sticker is a white bitmap with its label centered in red, written to the
//! scratch directory as PNG so the stamper can pick it up by path.

use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::error::StampError;
use crate::font::{Coverage, LabelFont};
use crate::layout::StickerKind;

pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub const INK: Rgb<u8> = Rgb([255, 0, 0]);

/// A rendered sticker on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Sticker {
    pub kind: StickerKind,
    pub label: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Sticker {
    /// Delete the PNG. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<(), StampError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Draw `label` centered on a `width`-pixel sticker of `kind`'s aspect ratio.
pub fn draw_sticker(kind: StickerKind, label: &str, width: u32, font: &LabelFont) -> RgbImage {
    let width = width.max(1);
    let height = ((width as f64 * kind.aspect_ratio()).round() as u32).max(1);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    let text = fit_text(font, label, kind.font_px(width), width);
    if text.is_empty() {
        return img;
    }

    // Signed so oversized text clips evenly on both sides
    let origin_x = (width as i64 - text.width as i64) / 2;
    let origin_y = (height as i64 - text.height as i64) / 2;

    for ty in 0..text.height {
        for tx in 0..text.width {
            let coverage = text.get(tx, ty);
            if coverage <= 0.0 {
                continue;
            }
            let x = origin_x + tx as i64;
            let y = origin_y + ty as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                continue;
            }
            img.put_pixel(x as u32, y as u32, blend(coverage));
        }
    }

    img
}

/// Rasterize at `px`, shrinking the size until the ink fits `width`.
/// Below 1px the text is left as is and clipped by the caller.
fn fit_text(font: &LabelFont, label: &str, px: u32, width: u32) -> Coverage {
    let mut px = px.max(1);
    let mut text = font.rasterize(label, px);
    while text.width > width && px > 1 {
        let proportional = (px as u64 * width as u64 / text.width as u64) as u32;
        px = proportional.clamp(1, px - 1);
        text = font.rasterize(label, px);
    }
    text
}

fn blend(coverage: f32) -> Rgb<u8> {
    let mix = |bg: u8, fg: u8| -> u8 {
        let c = coverage.clamp(0.0, 1.0);
        (bg as f32 * (1.0 - c) + fg as f32 * c).round() as u8
    };
    Rgb([
        mix(BACKGROUND[0], INK[0]),
        mix(BACKGROUND[1], INK[1]),
        mix(BACKGROUND[2], INK[2]),
    ])
}

/// Render a sticker and persist it as `dir/file_name`.
pub fn render_sticker(
    kind: StickerKind,
    label: &str,
    width: u32,
    font: &LabelFont,
    dir: &Path,
    file_name: &str,
) -> Result<Sticker, StampError> {
    let img = draw_sticker(kind, label, width, font);
    let path = dir.join(file_name);
    img.save_with_format(&path, ImageFormat::Png)?;

    debug!(
        "Rendered sticker '{}' ({}x{}) to {}",
        label,
        img.width(),
        img.height(),
        path.display()
    );

    Ok(Sticker {
        kind,
        label: label.to_string(),
        path,
        width: img.width(),
        height: img.height(),
    })
}
