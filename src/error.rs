//! Error types for the pdf-splice library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pdf-splice library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error raised by lopdf while loading or saving
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A reference points at a free or absent table entry
    #[error("dangling reference: {0} {1} R")]
    DanglingReference(u32, u16),

    /// The page tree root of a document cannot be resolved
    #[error("missing page tree")]
    MissingPageTree,

    /// A stream uses a filter we cannot decode or encode
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// LZW/Flate decode parameters ask for a predictor other than 1
    #[error("unsupported predictor: {0}")]
    UnsupportedPredictor(i64),

    /// The codec failed on the stream bytes
    #[error("filter error: {0}")]
    Filter(String),

    /// A page has no content to patch or to import
    #[error("page {0} has no content")]
    NoContent(usize),

    /// Remove was invoked but there was nothing to remove
    #[error("no watermarks found - nothing removed")]
    NoWatermarkFound,

    /// A parameter prefix matches more than one recognized key
    #[error("ambiguous parameter prefix \"{0}\"")]
    AmbiguousParameterPrefix(String),

    /// A parameter prefix matches no recognized key
    #[error("unknown parameter prefix \"{0}\"")]
    UnknownParameterPrefix(String),

    /// A parameter value could not be parsed or is out of range
    #[error("invalid parameter value: {0}")]
    InvalidParameterValue(String),

    /// Page number outside of the document
    #[error("invalid page number: {0}")]
    InvalidPageNumber(usize),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// General error
    #[error("{0}")]
    General(String),
}
