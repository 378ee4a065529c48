//! Watermarks and stamps
//!
//! A watermark is drawn behind the page content, a stamp on top of it. Both
//! are emitted as a form XObject tagged with an optional content group and
//! invoked from the page content stream inside a marked-content artifact
//! block, which is what `detect_watermarks` and `remove_watermarks` look for.

pub mod apply;
pub mod content;
pub mod geometry;
pub mod metrics;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use lopdf::{ObjectId, Stream};
use crate::context::Context;
use crate::layout::{Anchor, Rectangle};
use crate::xref::{IntSet, ObjectNumber};
use self::metrics::{FontMetrics, StandardMetrics};

pub use apply::{
    add_watermarks, add_watermarks_to_file, detect_watermarks, has_watermarks, remove_watermarks,
    remove_watermarks_from_file, BatchReport,
};
pub use geometry::Matrix;

/// Direction of a diagonal overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Diagonal {
    #[default]
    LowerLeftToUpperRight,
    UpperLeftToLowerRight,
}

/// Rotation of the overlay: an explicit angle or one derived from the page diagonal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    /// Degrees in [-180, 180]
    Rotation(f64),
    Diagonal(Diagonal),
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Diagonal(Diagonal::default())
    }
}

/// Text render mode (`Tr` operand)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Fill = 0,
    Stroke = 1,
    FillAndStroke = 2,
}

/// RGB color with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl SimpleColor {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const GRAY: SimpleColor = SimpleColor::new(0.5, 0.5, 0.5);
}

impl fmt::Display for SimpleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r={:.1} g={:.1} b={:.1}", self.r, self.g, self.b)
    }
}

/// Text overlay settings
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub lines: Vec<String>,
    pub font_name: String,
    pub font_size: i64,
    pub color: SimpleColor,
    pub render_mode: RenderMode,
}

/// What gets drawn
#[derive(Debug, Clone)]
pub enum Overlay {
    Text(TextOverlay),
    /// An encoded image XObject stream and its pixel dimensions
    Image { xobject: Stream, width: u32, height: u32 },
    /// A page of another document; page 0 maps donor page `min(i, count)` onto page `i`
    Pdf { donor: Box<Context>, page: usize },
}

/// Content and migrated resources of one donor page
#[derive(Debug, Clone)]
pub(crate) struct DonorPage {
    pub content: Vec<u8>,
    pub resources: ObjectId,
    pub width: f64,
    pub height: f64,
}

/// Form cache key: the bounding box bit patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FormKey([u64; 4]);

impl From<&Rectangle> for FormKey {
    fn from(r: &Rectangle) -> Self {
        FormKey([r.ll.x.to_bits(), r.ll.y.to_bits(), r.ur.x.to_bits(), r.ur.y.to_bits()])
    }
}

/// Resource names a patched content stream refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResourceNames {
    pub ext_gstate: String,
    pub form: String,
}

/// Overlay configuration plus the state of one application session
pub struct Watermark {
    pub overlay: Overlay,
    /// Stamp (drawn over the content) rather than watermark (drawn under it)
    pub on_top: bool,
    /// Remove an existing watermark from each page before applying
    pub update: bool,
    pub anchor: Anchor,
    pub dx: f64,
    pub dy: f64,
    orientation: Orientation,
    pub opacity: f64,
    pub scale: f64,
    /// Scale relative to the natural size rather than to the page
    pub scale_abs: bool,

    // current page
    pub(crate) bb: Rectangle,
    pub(crate) vp: Rectangle,
    pub(crate) page_rotation: i64,
    pub(crate) scaled_font_size: i64,

    // session
    pub(crate) ocg: Option<ObjectId>,
    pub(crate) ext_gstate: Option<ObjectId>,
    pub(crate) font: Option<ObjectId>,
    pub(crate) image: Option<ObjectId>,
    pub(crate) form_cache: HashMap<FormKey, ObjectId>,
    pub(crate) donor_pages: BTreeMap<usize, DonorPage>,
    pub(crate) applied: IntSet,
    pub(crate) applied_names: BTreeMap<ObjectNumber, ResourceNames>,

    metrics: Box<dyn FontMetrics>,
}

impl Watermark {
    /// Overlay with default placement
    pub fn new(overlay: Overlay, on_top: bool) -> Self {
        Self {
            overlay,
            on_top,
            update: false,
            anchor: Anchor::Center,
            dx: 0.0,
            dy: 0.0,
            orientation: Orientation::default(),
            opacity: 1.0,
            scale: 0.5,
            scale_abs: false,
            bb: Rectangle::default(),
            vp: Rectangle::default(),
            page_rotation: 0,
            scaled_font_size: 0,
            ocg: None,
            ext_gstate: None,
            font: None,
            image: None,
            form_cache: HashMap::new(),
            donor_pages: BTreeMap::new(),
            applied: IntSet::new(),
            applied_names: BTreeMap::new(),
            metrics: Box::new(StandardMetrics),
        }
    }

    /// Text overlay; `\n` (escaped or literal) separates lines
    pub fn text(text: &str, on_top: bool) -> Self {
        let lines = text
            .split("\\n")
            .flat_map(|part| part.split('\n'))
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        Self::new(
            Overlay::Text(TextOverlay {
                lines,
                font_name: "Helvetica".to_string(),
                font_size: 24,
                color: SimpleColor::GRAY,
                render_mode: RenderMode::Fill,
            }),
            on_top,
        )
    }

    /// Image overlay from an already encoded image XObject
    pub fn image(xobject: Stream, width: u32, height: u32, on_top: bool) -> Self {
        Self::new(Overlay::Image { xobject, width, height }, on_top)
    }

    /// Overlay taken from page `page` of `donor` (0 = one donor page per destination page)
    pub fn pdf(donor: Context, page: usize, on_top: bool) -> Self {
        Self::new(Overlay::Pdf { donor: Box::new(donor), page }, on_top)
    }

    /// Replace the glyph metrics used for text overlays
    pub fn with_metrics(mut self, metrics: Box<dyn FontMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &dyn FontMetrics {
        self.metrics.as_ref()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Rotate by an explicit angle, clearing diagonal mode
    pub fn set_rotation(&mut self, degrees: f64) {
        self.orientation = Orientation::Rotation(degrees);
    }

    /// Align with a page diagonal, clearing any explicit angle
    pub fn set_diagonal(&mut self, diagonal: Diagonal) {
        self.orientation = Orientation::Diagonal(diagonal);
    }

    pub fn text_overlay(&self) -> Option<&TextOverlay> {
        match &self.overlay {
            Overlay::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn text_overlay_mut(&mut self) -> Option<&mut TextOverlay> {
        match &mut self.overlay {
            Overlay::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.overlay, Overlay::Text(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self.overlay, Overlay::Image { .. })
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self.overlay, Overlay::Pdf { .. })
    }

    /// PDF overlay mapping a separate donor page onto each page
    pub fn multi_stamp(&self) -> bool {
        matches!(self.overlay, Overlay::Pdf { page: 0, .. })
    }

    /// Forms built for this overlay can be shared between pages with equal geometry
    pub(crate) fn cached_form(&self) -> bool {
        !self.multi_stamp()
    }

    /// Donor page used for destination page `page_nr`
    pub(crate) fn donor_page_nr(&self, page_nr: usize) -> usize {
        match &self.overlay {
            Overlay::Pdf { page: 0, .. } => page_nr.min(self.donor_pages.len()),
            Overlay::Pdf { page, .. } => *page,
            _ => 0,
        }
    }

    /// Forget the objects created in a previous document
    pub fn reset_session(&mut self) {
        self.ocg = None;
        self.ext_gstate = None;
        self.font = None;
        self.image = None;
        self.form_cache.clear();
        self.donor_pages.clear();
        self.applied.clear();
        self.applied_names.clear();
    }

    /// Object numbers of content streams patched in this session
    pub fn applied_objects(&self) -> &IntSet {
        &self.applied
    }

    /// Bounding box computed for the most recent page
    pub fn bounding_box(&self) -> Rectangle {
        self.bb
    }

    /// "stamp" or "watermark"
    pub fn mode_name(&self) -> &'static str {
        if self.on_top {
            "stamp"
        } else {
            "watermark"
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.overlay {
            Overlay::Text(_) => "text",
            Overlay::Image { .. } => "image",
            Overlay::Pdf { .. } => "pdf",
        }
    }
}

impl fmt::Debug for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watermark")
            .field("kind", &self.kind_name())
            .field("on_top", &self.on_top)
            .field("update", &self.update)
            .field("anchor", &self.anchor)
            .field("offset", &(self.dx, self.dy))
            .field("orientation", &self.orientation)
            .field("opacity", &self.opacity)
            .field("scale", &self.scale)
            .field("scale_abs", &self.scale_abs)
            .field("applied", &self.applied)
            .finish()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.mode_name())?;
        if let Overlay::Text(t) = &self.overlay {
            write!(f, " {:?} ({} {}pt, {})", t.lines.join("\\n"), t.font_name, t.font_size, t.color)?;
        }
        let scale = if self.scale_abs { "abs" } else { "rel" };
        write!(
            f,
            ", {} offset ({:.0}, {:.0}), scale {:.2} {}, opacity {:.2}",
            self.anchor, self.dx, self.dy, self.scale, scale, self.opacity
        )?;
        match self.orientation {
            Orientation::Rotation(r) => write!(f, ", rotation {:.1}", r),
            Orientation::Diagonal(Diagonal::LowerLeftToUpperRight) => write!(f, ", diagonal ll-ur"),
            Orientation::Diagonal(Diagonal::UpperLeftToLowerRight) => write!(f, ", diagonal ul-lr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_defaults() {
        let wm = Watermark::text("Draft\\nConfidential", false);
        let t = wm.text_overlay().unwrap();
        assert_eq!(t.lines, vec!["Draft", "Confidential"]);
        assert_eq!(t.font_name, "Helvetica");
        assert_eq!(t.font_size, 24);
        assert_eq!(t.color, SimpleColor::GRAY);
        assert_eq!(wm.anchor, Anchor::Center);
        assert_eq!(wm.scale, 0.5);
        assert!(!wm.scale_abs);
        assert_eq!(wm.opacity, 1.0);
        assert_eq!(wm.orientation(), Orientation::Diagonal(Diagonal::LowerLeftToUpperRight));
        assert_eq!(wm.mode_name(), "watermark");
    }

    #[test]
    fn test_empty_lines_dropped() {
        let wm = Watermark::text("a\n\nb\\n", true);
        assert_eq!(wm.text_overlay().unwrap().lines, vec!["a", "b"]);
    }

    #[test]
    fn test_rotation_and_diagonal_exclusive() {
        let mut wm = Watermark::text("x", true);
        wm.set_rotation(30.0);
        assert_eq!(wm.orientation(), Orientation::Rotation(30.0));
        wm.set_diagonal(Diagonal::UpperLeftToLowerRight);
        assert_eq!(wm.orientation(), Orientation::Diagonal(Diagonal::UpperLeftToLowerRight));
    }

    #[test]
    fn test_multi_stamp_donor_page() {
        let mut wm = Watermark::pdf(Context::new(), 0, true);
        assert!(wm.multi_stamp());
        assert!(!wm.cached_form());
        for n in 1..=3 {
            wm.donor_pages.insert(
                n,
                DonorPage { content: Vec::new(), resources: (1, 0), width: 10.0, height: 10.0 },
            );
        }
        assert_eq!(wm.donor_page_nr(2), 2);
        assert_eq!(wm.donor_page_nr(7), 3);

        let single = Watermark::pdf(Context::new(), 2, true);
        assert!(single.cached_form());
        assert_eq!(single.donor_page_nr(9), 2);
    }
}
