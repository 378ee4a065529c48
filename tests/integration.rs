//! Integration tests for the PDF splice library

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdf_splice::context::load_context;
use pdf_splice::params::{parse_import_details, parse_text_watermark_details};
use pdf_splice::pdf::{count_pages, extract_metadata, import_images_to_file, merge_pdfs, MergeOptions};
use pdf_splice::watermark::{add_watermarks_to_file, has_watermarks, remove_watermarks_from_file};
use pdf_splice::{Error, Watermark};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MARKER: &[u8] = b"/Artifact <</Subtype /Watermark /Type /Pagination >>BDC";

fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

fn page_text(text: &str) -> String {
    format!("BT /F1 24 Tf 72 700 Td ({}) Tj ET", text)
}

/// Write an uncompressed Letter-size PDF with one line of text per page
fn write_pdf(path: &Path, title: &str, texts: &[&str]) {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("Type1"));
    font.set("BaseFont", name("Helvetica"));
    let font_id = doc.add_object(Object::Dictionary(font));

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    let resources_id = doc.add_object(Object::Dictionary(resources));

    let mut kids = Vec::new();
    for text in texts {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), page_text(text).into_bytes()));

        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        page.set("Resources", Object::Reference(resources_id));
        page.set("Contents", Object::Reference(content_id));
        kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", name("Pages"));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));

    let mut info = Dictionary::new();
    info.set("Title", Object::String(title.as_bytes().to_vec(), StringFormat::Literal));
    let info_id = doc.add_object(Object::Dictionary(info));

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.save(path).expect("Failed to write test PDF");
}

/// Decoded content of every page, in page order
fn page_contents(path: &Path) -> Vec<Vec<u8>> {
    let doc = Document::load(path).expect("Failed to load PDF");
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    pages
        .into_iter()
        .map(|id| doc.get_page_content(id).expect("Failed to read page content"))
        .collect()
}

fn count_markers(content: &[u8]) -> usize {
    content.windows(MARKER.len()).filter(|w| *w == MARKER).count()
}

fn contains(content: &[u8], needle: &str) -> bool {
    content.windows(needle.len()).any(|w| w == needle.as_bytes())
}

fn jpeg_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08];
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[0x03, 0x01, 0x11, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

#[test]
fn test_merge_page_count_and_order() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let first = temp_dir.path().join("1. intro.pdf");
    let second = temp_dir.path().join("2. advanced.pdf");
    write_pdf(&first, "Intro", &["one", "two"]);
    write_pdf(&second, "Advanced", &["three", "four", "five"]);

    let output_path = temp_dir.path().join("merged.pdf");
    let options = MergeOptions {
        input_paths: vec![first, second],
        output_path: output_path.clone(),
    };
    merge_pdfs(&options).expect("Failed to merge PDFs");

    assert!(output_path.exists(), "Merged PDF was not created");
    assert_eq!(count_pages(&output_path).unwrap(), 5);

    let contents = page_contents(&output_path);
    let expected = ["one", "two", "three", "four", "five"];
    assert_eq!(contents.len(), expected.len());
    for (content, text) in contents.iter().zip(expected) {
        assert!(contains(content, &format!("({})", text)), "page should show {}", text);
    }

    // The first document's info dictionary survives
    let metadata = extract_metadata(&output_path).unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Intro"));
    assert_eq!(metadata.page_count, 5);
}

#[test]
fn test_merge_empty_input_list() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let options = MergeOptions {
        input_paths: vec![],
        output_path: temp_dir.path().join("empty.pdf"),
    };

    let result = merge_pdfs(&options);
    assert!(result.is_err(), "Should fail with empty input list");
    assert!(result.unwrap_err().to_string().contains("No input files"));
}

#[test]
fn test_merge_nonexistent_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let options = MergeOptions {
        input_paths: vec![PathBuf::from("nonexistent.pdf")],
        output_path: temp_dir.path().join("output.pdf"),
    };

    let result = merge_pdfs(&options);
    assert!(matches!(result, Err(Error::FileNotFound(_))));
}

#[test]
fn test_text_watermark_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let marked = temp_dir.path().join("marked.pdf");
    let clean = temp_dir.path().join("clean.pdf");
    write_pdf(&input, "Report", &["alpha", "beta"]);

    assert!(!has_watermarks(&input).unwrap());

    let mut wm = parse_text_watermark_details("Confidential", "rot:45, op:0.5", false).unwrap();
    let report = add_watermarks_to_file(&input, &marked, &[], &mut wm).unwrap();
    assert_eq!(report.succeeded, vec![1, 2]);
    assert!(has_watermarks(&marked).unwrap());

    for content in page_contents(&marked) {
        assert_eq!(count_markers(&content), 1);
        // Watermarks go underneath the page content
        assert!(content.starts_with(b" /Artifact"));
    }
    assert!(extract_metadata(&marked).unwrap().watermarked);

    let report = remove_watermarks_from_file(&marked, &clean, &[]).unwrap();
    assert_eq!(report.succeeded, vec![1, 2]);
    assert!(!has_watermarks(&clean).unwrap());

    let contents = page_contents(&clean);
    assert_eq!(contents[0], page_text("alpha").into_bytes());
    assert_eq!(contents[1], page_text("beta").into_bytes());
}

#[test]
fn test_watermark_selected_pages() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");
    write_pdf(&input, "Report", &["a", "b", "c"]);

    let mut wm = Watermark::text("Draft", true);
    let report = add_watermarks_to_file(&input, &output, &[2, 9], &mut wm).unwrap();
    assert_eq!(report.succeeded, vec![2]);

    let contents = page_contents(&output);
    assert_eq!(count_markers(&contents[0]), 0);
    assert_eq!(count_markers(&contents[1]), 1);
    assert_eq!(count_markers(&contents[2]), 0);
}

#[test]
fn test_pdf_stamp_update_replaces() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let donor = temp_dir.path().join("letterhead.pdf");
    let once = temp_dir.path().join("once.pdf");
    let twice = temp_dir.path().join("twice.pdf");
    write_pdf(&input, "Letter", &["body 1", "body 2"]);
    write_pdf(&donor, "Letterhead", &["ACME Corp"]);

    let mut stamp = Watermark::pdf(load_context(&donor).unwrap(), 1, true);
    stamp.update = true;
    add_watermarks_to_file(&input, &once, &[], &mut stamp).unwrap();
    add_watermarks_to_file(&once, &twice, &[], &mut stamp).unwrap();

    for content in page_contents(&twice) {
        // The replaced stamp leaves its graphics state wrapper behind
        assert_eq!(count_markers(&content), 1);
        assert!(content.starts_with(b"q "));
    }
    assert_eq!(count_pages(&twice).unwrap(), 2);
}

#[test]
fn test_remove_without_watermarks() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    write_pdf(&input, "Plain", &["x"]);

    let result = remove_watermarks_from_file(&input, &temp_dir.path().join("out.pdf"), &[]);
    assert!(matches!(result, Err(Error::NoWatermarkFound)));
}

#[test]
fn test_import_images_into_document() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    write_pdf(&input, "Album", &["cover"]);

    let images: Vec<PathBuf> = (0..2)
        .map(|i| {
            let path = temp_dir.path().join(format!("photo{}.jpg", i));
            std::fs::write(&path, jpeg_bytes(400, 300)).unwrap();
            path
        })
        .collect();

    let output = temp_dir.path().join("album.pdf");
    let imp = parse_import_details("pos:c, sc:0.5").unwrap();
    import_images_to_file(Some(&input), &images, &output, &imp).unwrap();

    assert_eq!(count_pages(&output).unwrap(), 3);
    let contents = page_contents(&output);
    assert!(contains(&contents[1], "/Im0 Do"));
    assert!(contents[2].starts_with(b"q 297.50 0.00 0.00 223.1"));
}

#[test]
fn test_import_images_new_document() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let image = temp_dir.path().join("scan.jpg");
    std::fs::write(&image, jpeg_bytes(640, 480)).unwrap();

    let output = temp_dir.path().join("scan.pdf");
    import_images_to_file(None, &[image], &output, &Default::default()).unwrap();

    assert_eq!(count_pages(&output).unwrap(), 1);
    assert_eq!(page_contents(&output)[0], b"q 640.000000 0 0 480.000000 0 0 cm /Im0 Do Q".to_vec());
}
