//! Exhibit stickers for PDF documents
//!
//! Stamps an "Exhibit {N}" label at the top of a document's first page and a
//! "{N}-{page}" label in the footer of every page, using lopdf for the PDF
//! side and `image` for the sticker bitmaps.
//!
//! - `stamp_pdf` / `stamp_document`: one document, in memory or to the scratch directory
//! - `process_batch`: many documents numbered sequentially in order-table order

pub mod batch;
pub mod command;
pub mod error;
pub mod font;
pub mod layout;
pub mod stamp;
pub mod sticker;

pub use batch::{
    assign_exhibits, default_order, discard, order_uploads, process_batch, process_batch_in,
    OrderRow, UploadedFile,
};
pub use command::{processed_filename, Placement, ProcessMetrics, ProcessedExhibit};
pub use error::StampError;
pub use font::{LabelFont, DEFAULT_FONT};
pub use layout::{sticker_size, PageBox, PdfRect, StickerKind};
pub use stamp::{stamp_document, stamp_pdf, StampContext, StampOutput, StampRun};
pub use sticker::{render_sticker, Sticker};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, StampError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| StampError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        let pdf = stamp::test_support::create_test_pdf(3);
        assert_eq!(get_page_count(&pdf).unwrap(), 3);
    }

    #[test]
    fn test_page_count_rejects_garbage() {
        assert!(matches!(
            get_page_count(b"hello"),
            Err(StampError::ParseError(_))
        ));
    }

    #[test]
    fn test_processed_filename() {
        assert_eq!(processed_filename(12), "Processed_Exhibit_12.pdf");
    }

    #[test]
    fn test_placement_serializes() {
        let placement = Placement {
            page: 2,
            kind: StickerKind::PageNumber,
            label: "3-2".to_string(),
            rect: PdfRect {
                x: 245.0,
                y: 40.0,
                width: 122.0,
                height: 24.0,
            },
        };
        let json = serde_json::to_value(&placement).unwrap();
        assert_eq!(json["kind"], "PageNumber");
        assert_eq!(json["label"], "3-2");
    }
}
