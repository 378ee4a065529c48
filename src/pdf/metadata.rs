//! Document metadata

use std::path::Path;
use crate::context::{load_context, Context};
use crate::error::{Error, Result};
use crate::object::{integer, text_string};
use crate::watermark::detect_watermarks;

/// Page count as recorded in the page tree root's Count
fn count_pages_from_tree(ctx: &Context) -> Result<usize> {
    let root = ctx.pages_root()?;
    let pages = ctx.table.dereference_dict(ctx.table.resolve(root)?)?;

    let count = pages
        .get(b"Count")
        .map_err(|_| Error::General("No Count in Pages".to_string()))?;

    match ctx.table.dereference(count).ok().and_then(integer) {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(Error::General("Count is not a non-negative integer".to_string())),
    }
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Header version, e.g. "1.7"
    pub version: String,
    /// Whether the document carries watermark or stamp blocks
    pub watermarked: bool,
}

/// Metadata of an already loaded document
pub fn metadata_of(ctx: &Context) -> Result<PdfMetadata> {
    let page_count = count_pages_from_tree(ctx)?;

    let info_string = |key: &[u8]| {
        ctx.info_dict()
            .and_then(|info| info.get(key).ok())
            .and_then(|obj| ctx.table.dereference(obj).ok())
            .and_then(text_string)
    };

    Ok(PdfMetadata {
        page_count,
        title: info_string(b"Title"),
        author: info_string(b"Author"),
        version: ctx.version.clone(),
        watermarked: detect_watermarks(ctx)?,
    })
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    let ctx = load_context(path)?;
    let metadata = metadata_of(&ctx)?;

    if metadata.page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(metadata)
}

/// Count the number of pages in a PDF file
///
/// Reads the Count field of the page tree root rather than walking the tree.
pub fn count_pages(path: &Path) -> Result<usize> {
    let ctx = load_context(path)?;
    let page_count = count_pages_from_tree(&ctx)?;

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}
