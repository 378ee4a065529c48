//! Document-level operations: merging, object migration, image import and metadata

pub mod import;
pub mod merge;
pub mod metadata;
pub mod migrate;

// Re-export commonly used items
pub use import::{import_images, import_images_to_file, jpeg_image, read_image, ImageSource, Import};
pub use merge::{merge, merge_pdfs, MergeOptions};
pub use metadata::{count_pages, extract_metadata, metadata_of, PdfMetadata};
pub use migrate::migrate;
