use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layout::{PdfRect, StickerKind};

/// Download name offered for exhibit `n`
pub fn processed_filename(exhibit: u32) -> String {
    format!("Processed_Exhibit_{}.pdf", exhibit)
}

/// Scratch file name the stamped PDF is written to
pub fn scratch_filename(exhibit: u32) -> String {
    format!("processed_exhibit_{}.pdf", exhibit)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedExhibit {
    pub exhibit: u32,
    /// Name of the uploaded file this exhibit came from
    pub source_name: String,
    pub path: PathBuf,
    pub download_name: String,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}

/// Where a sticker landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub page: u32,
    pub kind: StickerKind,
    pub label: String,
    pub rect: PdfRect,
}
