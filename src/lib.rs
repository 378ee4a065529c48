//! PDF Splice Library
//!
//! Structural surgery on the object graph of PDF documents.
//! This library provides functionality to:
//! - Merge the complete object space of several documents
//! - Migrate objects (with everything they reference) between documents
//! - Apply text, image or PDF-page watermarks and stamps
//! - Detect and remove previously applied watermarks
//! - Import JPEG images as new pages
//!
//! # Example
//!
//! ```no_run
//! use pdf_splice::params::parse_text_watermark_details;
//! use pdf_splice::watermark::add_watermarks_to_file;
//! use std::path::Path;
//!
//! let mut wm = parse_text_watermark_details("Draft", "rot:45, op:0.5", false)
//!     .expect("invalid description");
//! add_watermarks_to_file(Path::new("in.pdf"), Path::new("out.pdf"), &[], &mut wm)
//!     .expect("Failed to watermark");
//! ```

pub mod context;
pub mod error;
pub mod filter;
pub mod layout;
pub mod object;
pub mod params;
pub mod pdf;
pub mod watermark;
pub mod xref;

// Re-export commonly used items
pub use context::{load_context, save_context, Context};
pub use error::{Error, Result};
pub use watermark::Watermark;
