//! Image import: one new page per image

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use crate::context::{load_context, save_context, Context};
use crate::error::{Error, Result};
use crate::filter::encode_stream;
use crate::layout::{lower_left_corner, Anchor, Dim, Rectangle};
use crate::object::{name, name_array};
use crate::watermark::geometry::scaled_box;

/// Page layout for imported images
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Page dimensions in points (ignored for `Anchor::Full`)
    pub page_dim: Dim,
    /// Paper size name, empty when dimensions were given explicitly
    pub page_size: String,
    /// Destination resolution; 0 keeps one point per pixel
    pub dpi: u32,
    pub anchor: Anchor,
    pub dx: f64,
    pub dy: f64,
    pub scale: f64,
    pub scale_abs: bool,
}

impl Default for Import {
    fn default() -> Self {
        Self {
            page_dim: Dim::a4(),
            page_size: "A4".to_string(),
            dpi: 0,
            anchor: Anchor::Full,
            dx: 0.0,
            dy: 0.0,
            scale: 0.5,
            scale_abs: false,
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = if self.page_size.is_empty() { "custom" } else { &self.page_size };
        write!(
            f,
            "page {} ({}), pos {}, offset {:.0}/{:.0}, scale {:.2} {}",
            size,
            self.page_dim,
            self.anchor,
            self.dx,
            self.dy,
            self.scale,
            if self.scale_abs { "absolute" } else { "relative" }
        )?;
        if self.dpi > 0 {
            write!(f, ", {} dpi", self.dpi)?;
        }
        Ok(())
    }
}

/// An encoded image XObject ready to be placed
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub xobject: Stream,
    pub width: u32,
    pub height: u32,
}

/// Wrap JPEG bytes in a DCTDecode image XObject without re-encoding
pub fn jpeg_image(data: Vec<u8>) -> Result<ImageSource> {
    let (width, height, components) = jpeg_dimensions(&data)?;
    let color_space = match components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        n => return Err(Error::General(format!("JPEG with {} color components is unsupported", n))),
    };

    let mut dict = Dictionary::new();
    dict.set("Type", name("XObject"));
    dict.set("Subtype", name("Image"));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", name(color_space));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", name("DCTDecode"));
    dict.set("Length", Object::Integer(data.len() as i64));

    let xobject = Stream {
        dict,
        content: data,
        allows_compression: false,
        start_position: None,
    };
    Ok(ImageSource { xobject, width, height })
}

/// Read an image file; only JPEG is supported
pub fn read_image(path: &Path) -> Result<ImageSource> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    jpeg_image(fs::read(path)?)
}

/// `(width, height, components)` from the first start-of-frame segment
fn jpeg_dimensions(data: &[u8]) -> Result<(u32, u32, u8)> {
    let bad = |msg: &str| Error::General(format!("invalid JPEG: {}", msg));

    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(bad("missing SOI marker"));
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(bad("marker expected"));
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;

        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = data.get(pos + 4..pos + 2 + len).ok_or_else(|| bad("truncated frame header"))?;
            if seg.len() < 6 {
                return Err(bad("truncated frame header"));
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            if width == 0 || height == 0 {
                return Err(bad("zero image dimension"));
            }
            return Ok((width, height, seg[5]));
        }
        if marker == 0xDA {
            break;
        }
        pos += 2 + len;
    }
    Err(bad("no frame header"))
}

/// Content stream bytes drawing `/Im0` on a page of size `page_dim`
pub fn import_image_content(page_dim: Dim, img_width: f64, img_height: f64, imp: &Import) -> Vec<u8> {
    let (vpw, vph) = (page_dim.width, page_dim.height);

    if imp.anchor == Anchor::Full {
        return format!("q {:.6} 0 0 {:.6} 0 0 cm /Im0 Do Q", vpw, vph).into_bytes();
    }

    let (mut w, mut h) = (img_width, img_height);
    if imp.dpi > 0 {
        w *= 72.0 / imp.dpi as f64;
        h *= 72.0 / imp.dpi as f64;
    }

    let bb = scaled_box(w, h, imp.scale, imp.scale_abs, &Rectangle::for_dim(vpw, vph));
    let ll = lower_left_corner(vpw, vph, bb.width(), bb.height(), imp.anchor);

    format!(
        "q {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} cm /Im0 Do Q",
        bb.width(),
        0.0,
        0.0,
        bb.height(),
        ll.x + imp.dx,
        ll.y + imp.dy
    )
    .into_bytes()
}

/// Create a page showing `image` as a child of `parent`. The page is not linked into the tree.
pub fn new_page_for_image(ctx: &mut Context, image: ImageSource, parent: ObjectId, imp: &Import) -> Result<ObjectId> {
    let (w, h) = (image.width as f64, image.height as f64);
    let image_id = ctx.table.allocate(Object::Stream(image.xobject));

    let mut xobjects = Dictionary::new();
    xobjects.set("Im0", Object::Reference(image_id));
    let mut resources = Dictionary::new();
    resources.set("ProcSet", name_array(&["PDF", "ImageB", "ImageC", "ImageI"]));
    resources.set("XObject", Object::Dictionary(xobjects));
    let resources_id = ctx.table.allocate(Object::Dictionary(resources));

    let dim = if imp.anchor == Anchor::Full { Dim::new(w, h) } else { imp.page_dim };

    let mut contents_dict = Dictionary::new();
    contents_dict.set("Filter", name("FlateDecode"));
    let mut contents = Stream {
        dict: contents_dict,
        content: Vec::new(),
        allows_compression: false,
        start_position: None,
    };
    encode_stream(&mut contents, import_image_content(dim, w, h, imp))?;
    let contents_id = ctx.table.allocate(Object::Stream(contents));

    let mut page = Dictionary::new();
    page.set("Type", name("Page"));
    page.set("Parent", Object::Reference(parent));
    page.set("MediaBox", Rectangle::for_dim(dim.width, dim.height).to_object());
    page.set("Resources", Object::Reference(resources_id));
    page.set("Contents", Object::Reference(contents_id));
    Ok(ctx.table.allocate(Object::Dictionary(page)))
}

/// Append one page per image to the end of the document
pub fn import_images(ctx: &mut Context, images: Vec<ImageSource>, imp: &Import) -> Result<Vec<ObjectId>> {
    let parent = ctx.pages_root()?;
    let mut pages = Vec::with_capacity(images.len());

    for image in images {
        let (w, h) = (image.width, image.height);
        let page = new_page_for_image(ctx, image, parent, imp)?;
        ctx.append_to_page_tree(page, 1)?;
        ctx.page_count += 1;
        log::debug!("imported {}x{} image as page {}", w, h, ctx.page_count);
        pages.push(page);
    }

    Ok(pages)
}

/// Import image files into `input` (or a new document) and write the result to `output`
pub fn import_images_to_file(input: Option<&Path>, images: &[PathBuf], output: &Path, imp: &Import) -> Result<()> {
    if images.is_empty() {
        return Err(Error::General("No image files provided".to_string()));
    }

    let mut ctx = match input {
        Some(path) => load_context(path)?,
        None => Context::new(),
    };

    let sources = images.iter().map(|p| read_image(p)).collect::<Result<Vec<_>>>()?;
    import_images(&mut ctx, sources, imp)?;
    log::info!("imported {} image(s): {}", images.len(), imp);

    save_context(ctx, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::decode_stream;

    /// Minimal JPEG header: SOI, an APP0 segment and a baseline SOF0
    fn jpeg_bytes(width: u16, height: u16, components: u8) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&[components, 0x01, 0x11, 0x00]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    fn content_str(ctx: &Context, page: ObjectId) -> String {
        let dict = ctx.table.resolve(page).unwrap().as_dict().unwrap();
        let id = dict.get(b"Contents").unwrap().as_reference().unwrap();
        let Object::Stream(s) = ctx.table.resolve(id).unwrap() else { panic!("contents is not a stream") };
        String::from_utf8(decode_stream(s).unwrap()).unwrap()
    }

    #[test]
    fn test_jpeg_header() {
        let img = jpeg_image(jpeg_bytes(640, 480, 3)).unwrap();
        assert_eq!((img.width, img.height), (640, 480));
        assert!(matches!(img.xobject.dict.get(b"ColorSpace"), Ok(Object::Name(n)) if n == b"DeviceRGB"));
        assert!(matches!(img.xobject.dict.get(b"Filter"), Ok(Object::Name(n)) if n == b"DCTDecode"));

        assert!(jpeg_image(b"\x89PNG".to_vec()).is_err());
        assert!(jpeg_image(jpeg_bytes(1, 1, 2)).is_err());
    }

    #[test]
    fn test_full_page_content() {
        let content = import_image_content(Dim::new(640.0, 480.0), 640.0, 480.0, &Import::default());
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "q 640.000000 0 0 480.000000 0 0 cm /Im0 Do Q"
        );
    }

    #[test]
    fn test_anchored_content() {
        let imp = Import {
            anchor: Anchor::BottomLeft,
            dx: 10.0,
            dy: 20.0,
            ..Import::default()
        };
        let content = import_image_content(Dim::a4(), 200.0, 100.0, &imp);
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "q 297.50 0.00 0.00 148.75 10.00 20.00 cm /Im0 Do Q"
        );
    }

    #[test]
    fn test_dpi_and_absolute_scale() {
        let imp = Import {
            anchor: Anchor::TopLeft,
            dpi: 144,
            scale: 1.0,
            scale_abs: true,
            ..Import::default()
        };
        let content = import_image_content(Dim::a4(), 300.0, 150.0, &imp);
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "q 150.00 0.00 0.00 75.00 0.00 767.00 cm /Im0 Do Q"
        );
    }

    #[test]
    fn test_import_appends_pages() {
        let mut ctx = Context::new();
        let images = vec![
            jpeg_image(jpeg_bytes(100, 50, 1)).unwrap(),
            jpeg_image(jpeg_bytes(30, 60, 3)).unwrap(),
        ];
        let pages = import_images(&mut ctx, images, &Import::default()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(ctx.page_count, 2);

        let listed = ctx.pages().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, pages[0]);

        // Full pages take the image size
        let mb = listed[0].attrs.media_box.unwrap();
        assert_eq!((mb.width(), mb.height()), (100.0, 50.0));
        assert_eq!(content_str(&ctx, pages[1]), "q 30.000000 0 0 60.000000 0 0 cm /Im0 Do Q");

        let root = ctx.pages_root().unwrap();
        let count = ctx.table.resolve(root).unwrap().as_dict().unwrap().get(b"Count").unwrap().as_i64().unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_import_on_paper_size() {
        let mut ctx = Context::new();
        let imp = Import {
            anchor: Anchor::Center,
            ..Import::default()
        };
        let pages = import_images(&mut ctx, vec![jpeg_image(jpeg_bytes(100, 100, 3)).unwrap()], &imp).unwrap();

        let page = ctx.page(1).unwrap();
        assert_eq!(page.id, pages[0]);
        let mb = page.attrs.media_box.unwrap();
        assert_eq!((mb.width(), mb.height()), (595.0, 842.0));
        assert!(content_str(&ctx, pages[0]).starts_with("q 297.50 0.00 0.00 297.50 "));
    }
}
