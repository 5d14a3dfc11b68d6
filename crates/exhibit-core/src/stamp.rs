//! Composite stickers onto PDF pages

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

use crate::command::{scratch_filename, Placement, ProcessMetrics, ProcessedExhibit};
use crate::error::StampError;
use crate::font::LabelFont;
use crate::layout::{sticker_rect, sticker_size, PageBox, PdfRect, StickerKind};
use crate::sticker::{render_sticker, Sticker};

/// Everything a stamping run needs besides the document itself
#[derive(Debug)]
pub struct StampContext {
    pub font: LabelFont,
    /// Write-then-delete area for stickers and stamped PDFs
    pub scratch_dir: PathBuf,
    /// Sticker bitmaps are rendered this many times larger than their
    /// placed size in points
    pub oversample: u32,
}

impl StampContext {
    pub fn new(font: LabelFont, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            font,
            scratch_dir: scratch_dir.into(),
            oversample: 1,
        }
    }

    pub fn with_oversample(mut self, oversample: u32) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// Same font and oversampling, different scratch directory
    pub fn in_dir<'a>(&'a self, scratch_dir: &'a Path) -> StampRun<'a> {
        StampRun {
            font: &self.font,
            scratch_dir,
            oversample: self.oversample,
        }
    }

    fn run(&self) -> StampRun<'_> {
        self.in_dir(&self.scratch_dir)
    }
}

/// Borrowed view of a [`StampContext`] bound to one scratch directory
#[derive(Debug, Clone, Copy)]
pub struct StampRun<'a> {
    pub font: &'a LabelFont,
    pub scratch_dir: &'a Path,
    pub oversample: u32,
}

/// Result of stamping in memory
#[derive(Debug, Clone)]
pub struct StampOutput {
    pub pdf: Vec<u8>,
    pub page_count: u32,
    pub placements: Vec<Placement>,
}

/// Stamp `bytes` as exhibit `exhibit` and return the new PDF bytes.
///
/// Sticker PNGs pass through the scratch directory and are gone again when
/// this returns, whether it succeeds or not.
pub fn stamp_pdf(bytes: &[u8], exhibit: u32, ctx: &StampContext) -> Result<StampOutput, StampError> {
    stamp_pdf_in(bytes, exhibit, ctx.run())
}

pub fn stamp_pdf_in(bytes: &[u8], exhibit: u32, run: StampRun<'_>) -> Result<StampOutput, StampError> {
    let mut doc =
        Document::load_mem(bytes).map_err(|e| StampError::ParseError(e.to_string()))?;

    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    let first_page = pages.first().map(|(_, id)| *id).ok_or(StampError::EmptyDocument)?;
    let page_box = page_box(&doc, first_page);
    debug!(
        "Exhibit {}: {} pages, page one {}x{}",
        exhibit,
        pages.len(),
        page_box.width,
        page_box.height
    );

    // The exhibit PNG stays on disk until the stamped document is saved
    let exhibit_sticker = render(run, StickerKind::Exhibit, exhibit, 1, &page_box)?;
    let stamped = stamp_pages(&mut doc, &pages, exhibit, &page_box, &exhibit_sticker, run)
        .and_then(|placements| save(&mut doc).map(|pdf| (placements, pdf)));
    let (placements, pdf) = stamping_error_first(stamped, exhibit_sticker.remove())?;

    Ok(StampOutput {
        pdf,
        page_count: pages.len() as u32,
        placements,
    })
}

/// Stamp `bytes` and write the result to `processed_exhibit_{N}.pdf` in the
/// scratch directory.
pub fn stamp_document(
    bytes: &[u8],
    source_name: &str,
    exhibit: u32,
    ctx: &StampContext,
) -> Result<ProcessedExhibit, StampError> {
    stamp_document_in(bytes, source_name, exhibit, ctx.run())
}

pub fn stamp_document_in(
    bytes: &[u8],
    source_name: &str,
    exhibit: u32,
    run: StampRun<'_>,
) -> Result<ProcessedExhibit, StampError> {
    let started = Instant::now();
    let output = stamp_pdf_in(bytes, exhibit, run)?;

    let path = run.scratch_dir.join(scratch_filename(exhibit));
    std::fs::write(&path, &output.pdf)?;

    let metrics = ProcessMetrics {
        input_size_bytes: bytes.len(),
        output_size_bytes: output.pdf.len(),
        page_count: output.page_count,
        processing_time_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Exhibit {} stamped from {} ({} pages, {}ms)",
        exhibit, source_name, metrics.page_count, metrics.processing_time_ms
    );

    Ok(ProcessedExhibit {
        exhibit,
        source_name: source_name.to_string(),
        path,
        download_name: crate::command::processed_filename(exhibit),
        metrics,
    })
}

/// A stamping failure outranks a failure to clean up after it
fn stamping_error_first<T>(
    stamped: Result<T, StampError>,
    cleanup: Result<(), StampError>,
) -> Result<T, StampError> {
    let value = stamped?;
    cleanup?;
    Ok(value)
}

fn save(doc: &mut Document) -> Result<Vec<u8>, StampError> {
    doc.compress();
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf)
        .map_err(|e| StampError::OperationError(format!("Save failed: {}", e)))?;
    Ok(pdf)
}

fn render(
    run: StampRun<'_>,
    kind: StickerKind,
    exhibit: u32,
    page: u32,
    page_box: &PageBox,
) -> Result<Sticker, StampError> {
    let (width, _) = sticker_size(kind, page_box.width);
    render_sticker(
        kind,
        &kind.label(exhibit, page),
        width * run.oversample,
        run.font,
        run.scratch_dir,
        &kind.file_name(exhibit, page),
    )
}

fn stamp_pages(
    doc: &mut Document,
    pages: &[(u32, ObjectId)],
    exhibit: u32,
    page_box: &PageBox,
    exhibit_sticker: &Sticker,
    run: StampRun<'_>,
) -> Result<Vec<Placement>, StampError> {
    let mut placements = Vec::with_capacity(pages.len() + 1);

    for (index, (page_num, page_id)) in pages.iter().enumerate() {
        let mut operations = Vec::new();

        if index == 0 {
            let placement = place(doc, *page_id, *page_num, exhibit_sticker, page_box, &mut operations)?;
            placements.push(placement);
        }

        let page_sticker = render(run, StickerKind::PageNumber, exhibit, *page_num, page_box)?;
        let placed = place(doc, *page_id, *page_num, &page_sticker, page_box, &mut operations);
        page_sticker.remove()?;
        placements.push(placed?);

        let content = Content { operations }
            .encode()
            .map_err(|e| StampError::OperationError(e.to_string()))?;
        append_isolated_content(doc, *page_id, content)?;
    }

    Ok(placements)
}

fn place(
    doc: &mut Document,
    page_id: ObjectId,
    page_num: u32,
    sticker: &Sticker,
    page_box: &PageBox,
    operations: &mut Vec<Operation>,
) -> Result<Placement, StampError> {
    let size = sticker_size(sticker.kind, page_box.width);
    let rect = sticker_rect(sticker.kind, page_box, size);

    let image_id = embed_image(doc, &sticker.path)?;
    let name = format!("Stk{}", image_id.0);
    register_xobject(doc, page_id, &name, image_id)?;
    operations.extend(draw_image_ops(&name, &rect));

    Ok(Placement {
        page: page_num,
        kind: sticker.kind,
        label: sticker.label.clone(),
        rect,
    })
}

fn draw_image_ops(name: &str, rect: &PdfRect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(rect.width as f32),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(rect.height as f32),
                Object::Real(rect.x as f32),
                Object::Real(rect.y as f32),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Read a sticker PNG back and add it as a Flate-compressed RGB image XObject
fn embed_image(doc: &mut Document, path: &Path) -> Result<ObjectId, StampError> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(img.as_raw())?;
    let data = encoder.finish()?;

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        data,
    )
    .with_compression(false);

    Ok(doc.add_object(stream))
}

/// Add `name -> image_id` to the page's XObject resources.
///
/// Inherited or referenced resource dictionaries are copied onto the page
/// first so sibling pages are left untouched.
fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    image_id: ObjectId,
) -> Result<(), StampError> {
    let mut resources = inherited_resources(doc, page_id);

    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(|dict| dict.clone())
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Wrap the page's existing content in `q … Q` and append `content` after it.
fn append_isolated_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), StampError> {
    let existing: Vec<Object> = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| StampError::OperationError(e.to_string()))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    let content = if existing.is_empty() {
        content
    } else {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        [b"\nQ\n".as_slice(), content.as_slice()].concat()
    };
    let stamp_id = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.push(Object::Reference(stamp_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, StampError> {
    doc.get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| StampError::OperationError(e.to_string()))
}

/// Walk from the page up the page tree looking for `key`
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return match value {
                Object::Reference(target) => doc.get_object(*target).ok(),
                other => Some(other),
            };
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// MediaBox of a page, falling back to US Letter when unreadable
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let corners = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            let values: Option<Vec<f64>> = arr.iter().map(|o| number(doc, o)).collect();
            values
        });

    match corners.as_deref() {
        Some([llx, lly, urx, ury]) if urx != llx && ury != lly => {
            PageBox::from_corners(*llx, *lly, *urx, *ury)
        }
        _ => PageBox::default(),
    }
}

fn number(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| number(doc, o)),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(dir: &Path) -> StampContext {
        StampContext::new(LabelFont::Bitmap, dir)
    }

    fn scratch_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_single_page_gets_both_stickers() {
        let dir = tempfile::tempdir().unwrap();
        let out = stamp_pdf(&create_test_pdf(1), 1, &context(dir.path())).unwrap();

        assert_eq!(out.page_count, 1);
        let labels: Vec<&str> = out.placements.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Exhibit 1", "1-1"]);

        let doc = Document::load_mem(&out.pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let transforms = image_transforms(&doc, page_id);
        assert_eq!(transforms.len(), 2);

        // exhibit sticker: 184 wide, centered, top edge 50pt below the top
        let [w, _, _, h, x, y] = transforms[0];
        assert_eq!(w, 184.0);
        assert_eq!(x, 214.0);
        assert_eq!(x, 612.0 - (x + w));
        assert_eq!(y + h, 792.0 - 50.0);

        // page number sticker: 122 wide, bottom edge 40pt above the bottom
        let [w, _, _, _, x, y] = transforms[1];
        assert_eq!(w, 122.0);
        assert_eq!(x, 245.0);
        assert_eq!(y, 40.0);
    }

    #[test]
    fn test_every_page_is_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let out = stamp_pdf(&create_test_pdf(3), 5, &context(dir.path())).unwrap();

        let page_labels: Vec<(u32, &str)> = out
            .placements
            .iter()
            .filter(|p| p.kind == StickerKind::PageNumber)
            .map(|p| (p.page, p.label.as_str()))
            .collect();
        assert_eq!(page_labels, vec![(1, "5-1"), (2, "5-2"), (3, "5-3")]);

        let exhibit_pages: Vec<u32> = out
            .placements
            .iter()
            .filter(|p| p.kind == StickerKind::Exhibit)
            .map(|p| p.page)
            .collect();
        assert_eq!(exhibit_pages, vec![1]);

        let doc = Document::load_mem(&out.pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(image_transforms(&doc, pages[&1]).len(), 2);
        assert_eq!(image_transforms(&doc, pages[&2]).len(), 1);
        assert_eq!(image_transforms(&doc, pages[&3]).len(), 1);
    }

    #[test]
    fn test_embedded_images_match_sticker_bitmaps() {
        let dir = tempfile::tempdir().unwrap();
        let out = stamp_pdf(&create_test_pdf(1), 2, &context(dir.path())).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let mut sizes: Vec<(i64, i64)> = xobjects
            .iter()
            .map(|(_, obj)| {
                let stream = doc
                    .get_object(obj.as_reference().unwrap())
                    .unwrap()
                    .as_stream()
                    .unwrap();
                (
                    stream.dict.get(b"Width").unwrap().as_i64().unwrap(),
                    stream.dict.get(b"Height").unwrap().as_i64().unwrap(),
                )
            })
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![(122, 24), (184, 52)]);
    }

    #[test]
    fn test_oversampling_keeps_placement() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).with_oversample(3);
        let out = stamp_pdf(&create_test_pdf(1), 1, &ctx).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        assert_eq!(image_transforms(&doc, page_id)[0][0], 184.0);
    }

    #[test]
    fn test_original_content_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let out = stamp_pdf(&create_test_pdf(1), 1, &context(dir.path())).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let ops: Vec<&str> = content.operations.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(ops.first(), Some(&"q"));
        let et = ops.iter().position(|o| *o == "ET").unwrap();
        assert_eq!(ops[et + 1], "Q");
    }

    #[test]
    fn test_mixed_page_sizes_reuse_page_one_box() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_sized_pdf(&[(612, 792), (1224, 792)]);
        let out = stamp_pdf(&pdf, 1, &context(dir.path())).unwrap();
        let first = &out.placements[1].rect;
        let second = &out.placements[2].rect;
        assert_eq!(first, second);
    }

    #[test]
    fn test_restamping_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = create_test_pdf(2);
        let a = stamp_pdf(&pdf, 9, &context(dir.path())).unwrap();
        let b = stamp_pdf(&pdf, 9, &context(dir.path())).unwrap();
        assert_eq!(a.placements, b.placements);
    }

    #[test]
    fn test_stickers_do_not_linger_in_scratch() {
        let dir = tempfile::tempdir().unwrap();
        stamp_pdf(&create_test_pdf(4), 3, &context(dir.path())).unwrap();
        assert!(scratch_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_stamp_document_writes_only_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let processed =
            stamp_document(&create_test_pdf(2), "brief.pdf", 4, &context(dir.path())).unwrap();

        assert_eq!(processed.exhibit, 4);
        assert_eq!(processed.download_name, "Processed_Exhibit_4.pdf");
        assert_eq!(processed.source_name, "brief.pdf");
        assert_eq!(processed.metrics.page_count, 2);
        assert_eq!(scratch_entries(dir.path()), vec!["processed_exhibit_4.pdf"]);

        let written = std::fs::read(&processed.path).unwrap();
        assert_eq!(written.len(), processed.metrics.output_size_bytes);
        assert!(written.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_in_dir_redirects_scratch_output() {
        let home = tempfile::tempdir().unwrap();
        let batch = tempfile::tempdir().unwrap();
        let ctx = context(home.path());

        let processed =
            stamp_document_in(&create_test_pdf(1), "memo.pdf", 8, ctx.in_dir(batch.path())).unwrap();

        assert_eq!(processed.path, batch.path().join("processed_exhibit_8.pdf"));
        assert_eq!(scratch_entries(batch.path()), vec!["processed_exhibit_8.pdf"]);
        assert!(scratch_entries(home.path()).is_empty());
    }

    #[test]
    fn test_stamping_error_outranks_cleanup_error() {
        let cleanup = Err(StampError::Io(std::io::Error::other("cleanup")));
        let err = stamping_error_first::<()>(Err(StampError::EmptyDocument), cleanup).unwrap_err();
        assert!(matches!(err, StampError::EmptyDocument));

        let cleanup = Err(StampError::Io(std::io::Error::other("cleanup")));
        assert!(matches!(
            stamping_error_first(Ok(1), cleanup),
            Err(StampError::Io(_))
        ));
        assert_eq!(stamping_error_first(Ok(2), Ok(())).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_pdf_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = stamp_pdf(b"not a pdf", 1, &context(dir.path())).unwrap_err();
        assert!(matches!(err, StampError::ParseError(_)));
        assert!(scratch_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_zero_page_pdf_is_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let err = stamp_pdf(&create_sized_pdf(&[]), 1, &context(dir.path())).unwrap_err();
        assert!(matches!(err, StampError::EmptyDocument));
    }

    #[test]
    fn test_inherited_mediabox_and_resources() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = stamp_pdf(&bytes, 1, &context(dir.path())).unwrap();
        assert_eq!(out.placements[0].rect.width, (0.3f64 * 595.0).round());
        assert_eq!(out.placements[0].rect.y + out.placements[0].rect.height, 842.0 - 50.0);

        let stamped = Document::load_mem(&out.pdf).unwrap();
        let page_id = *stamped.get_pages().get(&1).unwrap();
        let page = stamped.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"Font").is_ok());
        assert_eq!(resources.get(b"XObject").unwrap().as_dict().unwrap().len(), 2);
    }
}
