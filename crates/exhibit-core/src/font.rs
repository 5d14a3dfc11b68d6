//! Label fonts
//!
//! A TrueType face is looked up best-effort; anything that goes wrong falls
//! back to a built-in 5x7 bitmap face without raising an error.

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use tracing::debug;

/// Default face name, resolved against the working directory and the
/// system font directories.
pub const DEFAULT_FONT: &str = "arial.ttf";

const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/msttcorefonts",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype",
    "/usr/share/fonts/TTF",
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts/Supplemental",
    "C:\\Windows\\Fonts",
];

/// Faces commonly installed on CI hosts and desktops
#[cfg(test)]
pub(crate) const TEST_FONTS: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "arial.ttf",
    "FreeSans.ttf",
    "NotoSans-Regular.ttf",
];

/// Text ink rasterized to a coverage mask, row-major, values in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<f32>,
}

impl Coverage {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            alpha: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.alpha[(y * self.width + x) as usize]
    }
}

pub enum LabelFont {
    TrueType { name: String, face: FontVec },
    Bitmap,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelFont::TrueType { name, .. } => f.debug_tuple("TrueType").field(name).finish(),
            LabelFont::Bitmap => f.write_str("Bitmap"),
        }
    }
}

impl LabelFont {
    /// Resolve `name` (a path or a bare file name) to a TrueType face, or
    /// the bitmap face when it cannot be found or parsed.
    pub fn lookup(name: &str) -> Self {
        let Some(path) = resolve_font_path(name) else {
            debug!("Font {} not found, using bitmap font", name);
            return LabelFont::Bitmap;
        };
        match Self::load(&path) {
            Some(font) => font,
            None => {
                debug!("Font {} unusable, using bitmap font", path.display());
                LabelFont::Bitmap
            }
        }
    }

    fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        let face = FontVec::try_from_vec(bytes).ok()?;
        Some(LabelFont::TrueType {
            name: path.display().to_string(),
            face,
        })
    }

    pub fn is_truetype(&self) -> bool {
        matches!(self, LabelFont::TrueType { .. })
    }

    /// Rasterize `text` at roughly `px` pixels tall, cropped to its ink box.
    pub fn rasterize(&self, text: &str, px: u32) -> Coverage {
        match self {
            LabelFont::TrueType { face, .. } => rasterize_truetype(face, text, px.max(1) as f32),
            LabelFont::Bitmap => bitmap::rasterize(text, px),
        }
    }
}

impl Default for LabelFont {
    fn default() -> Self {
        Self::lookup(DEFAULT_FONT)
    }
}

fn resolve_font_path(name: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Some(direct);
    }
    // Only bare names are searched for in the font directories
    if direct.components().count() != 1 {
        return None;
    }

    let mut dirs: Vec<PathBuf> = FONT_DIRS.iter().map(PathBuf::from).collect();
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(&home).join(".fonts"));
        dirs.push(PathBuf::from(&home).join(".local/share/fonts"));
    }

    let lower = name.to_lowercase();
    dirs.into_iter().find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        // Font packages disagree on case (Arial.ttf vs arial.ttf)
        std::fs::read_dir(&dir).ok()?.flatten().find_map(|entry| {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| f.to_lowercase() == lower);
            (matches && path.is_file()).then_some(path)
        })
    })
}

fn rasterize_truetype(face: &FontVec, text: &str, px: f32) -> Coverage {
    let scale = PxScale::from(px);
    let scaled = face.as_scaled(scale);

    let mut glyphs: Vec<Glyph> = Vec::new();
    let mut caret = 0.0f32;
    let mut previous = None;
    for c in text.chars() {
        let id = face.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, scaled.ascent())));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| face.outline_glyph(g))
        .collect();
    if outlined.is_empty() {
        return Coverage::empty();
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for glyph in &outlined {
        let b = glyph.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let width = (max_x - min_x).ceil().max(0.0) as u32;
    let height = (max_y - min_y).ceil().max(0.0) as u32;
    let mut alpha = vec![0.0f32; (width * height) as usize];

    for glyph in &outlined {
        let b = glyph.px_bounds();
        let off_x = (b.min.x - min_x) as u32;
        let off_y = (b.min.y - min_y) as u32;
        glyph.draw(|x, y, c| {
            let (px, py) = (x + off_x, y + off_y);
            if px < width && py < height {
                let cell = &mut alpha[(py * width + px) as usize];
                *cell = (*cell + c).min(1.0);
            }
        });
    }

    Coverage {
        width,
        height,
        alpha,
    }
}

mod bitmap {
    //! 5x7 face drawn on a 6x8 cell

    use super::Coverage;

    const GLYPH_W: u32 = 5;
    const GLYPH_H: u32 = 7;
    const ADVANCE: u32 = 6;
    const CELL_H: u32 = 8;

    const UNKNOWN: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

    fn glyph(c: char) -> [u8; 7] {
        match c {
            ' ' => [0; 7],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
            'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
            'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
            'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
            'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
            'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
            'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
            'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
            'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
            'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
            'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
            'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
            'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
            'b' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x1E],
            'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
            'd' => [0x01, 0x01, 0x0D, 0x13, 0x11, 0x11, 0x0F],
            'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
            'f' => [0x06, 0x09, 0x08, 0x1C, 0x08, 0x08, 0x08],
            'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
            'h' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11],
            'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
            'j' => [0x02, 0x00, 0x06, 0x02, 0x02, 0x12, 0x0C],
            'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
            'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
            'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
            'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
            'p' => [0x00, 0x00, 0x1E, 0x11, 0x1E, 0x10, 0x10],
            'q' => [0x00, 0x00, 0x0D, 0x13, 0x0F, 0x01, 0x01],
            'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
            's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
            't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
            'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
            'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
            'w' => [0x00, 0x00, 0x11, 0x11, 0x15, 0x15, 0x0A],
            'x' => [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11],
            'y' => [0x00, 0x00, 0x11, 0x11, 0x0F, 0x01, 0x0E],
            'z' => [0x00, 0x00, 0x1F, 0x02, 0x04, 0x08, 0x1F],
            _ => UNKNOWN,
        }
    }

    /// Integer scale so the 8px cell approximates `px`
    pub(super) fn scale_for(px: u32) -> u32 {
        (px / CELL_H).max(1)
    }

    pub(super) fn rasterize(text: &str, px: u32) -> Coverage {
        let count = text.chars().count() as u32;
        if count == 0 {
            return Coverage::empty();
        }
        let scale = scale_for(px);
        let width = (count * ADVANCE - (ADVANCE - GLYPH_W)) * scale;
        let height = GLYPH_H * scale;
        let mut alpha = vec![0.0f32; (width * height) as usize];

        for (i, c) in text.chars().enumerate() {
            let rows = glyph(c);
            let origin_x = i as u32 * ADVANCE * scale;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let x = origin_x + col * scale + dx;
                            let y = row as u32 * scale + dy;
                            alpha[(y * width + x) as usize] = 1.0;
                        }
                    }
                }
            }
        }

        Coverage {
            width,
            height,
            alpha,
        }
    }
}
