//! Batch ordering and sequential processing
//!
//! Files are stamped one at a time in the order table's order. The first
//! failure aborts the whole batch.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::ProcessedExhibit;
use crate::error::StampError;
use crate::stamp::{stamp_document_in, StampContext, StampRun};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// One row of the user-editable order table. Row `i` describes upload `i`
/// and carries its filename; `position` is a sort key, not a file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub filename: String,
    pub position: i64,
}

/// Order table as first shown: upload order, positions from 1
pub fn default_order(files: &[UploadedFile]) -> Vec<OrderRow> {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| OrderRow {
            filename: f.filename.clone(),
            position: i as i64 + 1,
        })
        .collect()
}

/// Sort uploads by their row's position. Equal positions keep upload order.
pub fn order_uploads<'a>(
    files: &'a [UploadedFile],
    rows: &[OrderRow],
) -> Result<Vec<&'a UploadedFile>, StampError> {
    if rows.len() != files.len() {
        return Err(StampError::InvalidOrder(format!(
            "{} rows for {} files",
            rows.len(),
            files.len()
        )));
    }

    if let Some((i, row)) = rows
        .iter()
        .enumerate()
        .find(|(i, row)| row.filename != files[*i].filename)
    {
        return Err(StampError::InvalidOrder(format!(
            "row {} names '{}' but upload {} is '{}'",
            i + 1,
            row.filename,
            i + 1,
            files[i].filename
        )));
    }

    let mut indexed: Vec<(i64, usize)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.position, i))
        .collect();
    indexed.sort_by_key(|(position, _)| *position);

    Ok(indexed.into_iter().map(|(_, i)| &files[i]).collect())
}

/// Exhibit numbers for `count` files starting at `start`
pub fn assign_exhibits(start: u32, count: usize) -> Result<Vec<u32>, StampError> {
    if start == 0 {
        return Err(StampError::InvalidStart(start));
    }
    (0..count)
        .map(|i| {
            u32::try_from(i)
                .ok()
                .and_then(|i| start.checked_add(i))
                .ok_or(StampError::InvalidStart(start))
        })
        .collect()
}

/// Stamp every upload into the context's scratch directory.
pub fn process_batch(
    files: &[UploadedFile],
    rows: &[OrderRow],
    start: u32,
    ctx: &StampContext,
) -> Result<Vec<ProcessedExhibit>, StampError> {
    process_batch_in(files, rows, start, ctx.in_dir(&ctx.scratch_dir))
}

pub fn process_batch_in(
    files: &[UploadedFile],
    rows: &[OrderRow],
    start: u32,
    run: StampRun<'_>,
) -> Result<Vec<ProcessedExhibit>, StampError> {
    let ordered = order_uploads(files, rows)?;
    let exhibits = assign_exhibits(start, ordered.len())?;
    info!(
        "Processing {} files as exhibits starting at {}",
        ordered.len(),
        start
    );

    let mut processed: Vec<ProcessedExhibit> = Vec::with_capacity(ordered.len());
    for (file, exhibit) in ordered.into_iter().zip(exhibits) {
        match stamp_document_in(&file.bytes, &file.filename, exhibit, run) {
            Ok(done) => processed.push(done),
            Err(e) => {
                warn!(
                    "Exhibit {} ({}) failed, aborting batch: {}",
                    exhibit, file.filename, e
                );
                discard(&processed);
                return Err(e);
            }
        }
    }

    Ok(processed)
}

/// Delete the outputs of a batch
pub fn discard(processed: &[ProcessedExhibit]) {
    for done in processed {
        if let Err(e) = std::fs::remove_file(&done.path) {
            warn!("Could not remove {}: {}", done.path.display(), e);
        }
    }
}
