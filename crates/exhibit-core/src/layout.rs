//! Sticker geometry
//!
//! All coordinates are PDF user-space points with the origin at the
//! bottom-left of the page. Every page of a document is laid out against
//! page one's box; mixed-size documents get page one's placement on every page.

use serde::{Deserialize, Serialize};

/// Gap between the top page edge and the top of the exhibit sticker.
pub const TOP_MARGIN: f64 = 50.0;

/// Gap between the bottom page edge and the bottom of the page-number sticker.
pub const BOTTOM_MARGIN: f64 = 40.0;

/// US Letter, used when a page carries no readable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StickerKind {
    /// "Exhibit {N}" at the top of page one
    Exhibit,
    /// "{N}-{page}" in the footer of every page
    PageNumber,
}

impl StickerKind {
    /// Share of the page width the sticker occupies
    pub fn width_fraction(self) -> f64 {
        match self {
            StickerKind::Exhibit => 0.3,
            StickerKind::PageNumber => 0.2,
        }
    }

    /// Height over width
    pub fn aspect_ratio(self) -> f64 {
        match self {
            StickerKind::Exhibit => 70.0 / 250.0,
            StickerKind::PageNumber => 50.0 / 250.0,
        }
    }

    /// Font pixel size as a share of the sticker width
    pub fn font_fraction(self) -> f64 {
        match self {
            StickerKind::Exhibit => 0.16,
            StickerKind::PageNumber => 0.12,
        }
    }

    /// Font size in pixels for a sticker `width` pixels wide (truncated).
    pub fn font_px(self, width: u32) -> u32 {
        (width as f64 * self.font_fraction()) as u32
    }

    /// Text printed on the sticker. `page` is 1-based and ignored for
    /// [`StickerKind::Exhibit`].
    pub fn label(self, exhibit: u32, page: u32) -> String {
        match self {
            StickerKind::Exhibit => format!("Exhibit {}", exhibit),
            StickerKind::PageNumber => format!("{}-{}", exhibit, page),
        }
    }

    /// Scratch file name for the rendered PNG
    pub fn file_name(self, exhibit: u32, page: u32) -> String {
        match self {
            StickerKind::Exhibit => format!("exhibit_{}.png", exhibit),
            StickerKind::PageNumber => format!("page_{}_{}.png", exhibit, page),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Page one's MediaBox
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            width,
            height,
        }
    }

    /// Build from MediaBox corners, normalising inverted boxes.
    pub fn from_corners(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self {
            x0: llx.min(urx),
            y0: lly.min(ury),
            width: (urx - llx).abs(),
            height: (ury - lly).abs(),
        }
    }

    fn centered_x(&self, sticker_width: f64) -> f64 {
        self.x0 + (self.width - sticker_width) / 2.0
    }
}

impl Default for PageBox {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE.0, DEFAULT_PAGE_SIZE.1)
    }
}

/// Pixel size of a sticker for a page `page_width` points wide.
///
/// Width is `round(fraction * page_width)`, height follows the kind's aspect
/// ratio. Both are clamped to at least one pixel.
pub fn sticker_size(kind: StickerKind, page_width: f64) -> (u32, u32) {
    let width = (kind.width_fraction() * page_width).round().max(1.0);
    let height = (width * kind.aspect_ratio()).round().max(1.0);
    (width as u32, height as u32)
}

/// Exhibit sticker placement: centered, top edge `TOP_MARGIN` below the page top.
pub fn exhibit_rect(page: &PageBox, size: (u32, u32)) -> PdfRect {
    let (w, h) = (size.0 as f64, size.1 as f64);
    PdfRect {
        x: page.centered_x(w),
        y: page.y0 + page.height - TOP_MARGIN - h,
        width: w,
        height: h,
    }
}

/// Page-number sticker placement: centered, bottom edge `BOTTOM_MARGIN` above the page bottom.
pub fn page_number_rect(page: &PageBox, size: (u32, u32)) -> PdfRect {
    let (w, h) = (size.0 as f64, size.1 as f64);
    PdfRect {
        x: page.centered_x(w),
        y: page.y0 + BOTTOM_MARGIN,
        width: w,
        height: h,
    }
}

/// Placement for `kind` on `page`
pub fn sticker_rect(kind: StickerKind, page: &PageBox, size: (u32, u32)) -> PdfRect {
    match kind {
        StickerKind::Exhibit => exhibit_rect(page, size),
        StickerKind::PageNumber => page_number_rect(page, size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_letter_sticker_sizes() {
        assert_eq!(sticker_size(StickerKind::Exhibit, 612.0), (184, 52));
        assert_eq!(sticker_size(StickerKind::PageNumber, 612.0), (122, 24));
    }

    #[test]
    fn test_tiny_page_clamps_to_one_pixel() {
        assert_eq!(sticker_size(StickerKind::PageNumber, 1.0), (1, 1));
    }

    #[test]
    fn test_labels() {
        assert_eq!(StickerKind::Exhibit.label(7, 3), "Exhibit 7");
        assert_eq!(StickerKind::PageNumber.label(7, 3), "7-3");
        assert_eq!(StickerKind::PageNumber.file_name(7, 3), "page_7_3.png");
        assert_eq!(StickerKind::Exhibit.file_name(7, 1), "exhibit_7.png");
    }

    #[test]
    fn test_font_px_truncates() {
        // 184 * 0.16 = 29.44
        assert_eq!(StickerKind::Exhibit.font_px(184), 29);
        // 122 * 0.12 = 14.64
        assert_eq!(StickerKind::PageNumber.font_px(122), 14);
    }

    #[test]
    fn test_exhibit_rect_on_letter() {
        let page = PageBox::default();
        let rect = exhibit_rect(&page, (184, 52));
        assert_eq!(rect.x, 214.0);
        assert_eq!(rect.y, 792.0 - 50.0 - 52.0);
        assert_eq!(rect.width, 184.0);
    }

    #[test]
    fn test_page_number_rect_on_letter() {
        let page = PageBox::default();
        let rect = page_number_rect(&page, (122, 24));
        assert_eq!(rect.x, 245.0);
        assert_eq!(rect.y, 40.0);
        assert_eq!(rect.height, 24.0);
    }

    #[test]
    fn test_offset_mediabox_shifts_placement() {
        let page = PageBox::from_corners(100.0, 200.0, 712.0, 992.0);
        let rect = page_number_rect(&page, (122, 24));
        assert_eq!(rect.x, 345.0);
        assert_eq!(rect.y, 240.0);
    }

    #[test]
    fn test_inverted_corners_normalise() {
        let page = PageBox::from_corners(612.0, 792.0, 0.0, 0.0);
        assert_eq!(page, PageBox::default());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn kind_strategy() -> impl Strategy<Value = StickerKind> {
            prop_oneof![Just(StickerKind::Exhibit), Just(StickerKind::PageNumber)]
        }

        proptest! {
            /// Property: sticker width tracks the page width fraction
            #[test]
            fn width_is_rounded_fraction(width in 10.0f64..5000.0) {
                let (w, _) = sticker_size(StickerKind::Exhibit, width);
                prop_assert_eq!(w as f64, (0.3 * width).round());
            }

            /// Property: stickers are horizontally centered
            #[test]
            fn stickers_are_centered(
                kind in kind_strategy(),
                width in 50.0f64..5000.0,
                height in 200.0f64..5000.0,
                x0 in -500.0f64..500.0,
            ) {
                let page = PageBox { x0, y0: 0.0, width, height };
                let size = sticker_size(kind, width);
                let rect = sticker_rect(kind, &page, size);
                let left = rect.x - page.x0;
                let right = (page.x0 + page.width) - (rect.x + rect.width);
                prop_assert!((left - right).abs() < 1e-6);
            }

            /// Property: stickers sit in their margin bands
            #[test]
            fn stickers_respect_margins(width in 50.0f64..5000.0, height in 200.0f64..5000.0) {
                let page = PageBox::new(width, height);
                let top = exhibit_rect(&page, sticker_size(StickerKind::Exhibit, width));
                prop_assert!((page.height - (top.y + top.height) - TOP_MARGIN).abs() < 1e-6);
                let bottom = page_number_rect(&page, sticker_size(StickerKind::PageNumber, width));
                prop_assert_eq!(bottom.y, BOTTOM_MARGIN);
            }
        }
    }
}
