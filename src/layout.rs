//! Page layout primitives: points, rectangles, paper sizes and anchors
//!
//! All lengths are PDF user space units (points, 1/72 inch) and the
//! coordinate system has its origin at the bottom-left of the page.

use std::fmt;
use std::str::FromStr;
use lopdf::Object;
use crate::error::{Error, Result};
use crate::object::number;

/// A point in user space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Axis aligned rectangle given by its lower-left and upper-right corners
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub ll: Point,
    pub ur: Point,
}

impl Rectangle {
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self {
            ll: Point { x: llx, y: lly },
            ur: Point { x: urx, y: ury },
        }
    }

    /// Rectangle anchored at the origin with the given dimensions
    pub fn for_dim(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Parse a `[llx lly urx ury]` array, normalizing swapped corners
    pub fn from_array(arr: &[Object]) -> Option<Self> {
        if arr.len() != 4 {
            return None;
        }
        let v: Vec<f64> = arr.iter().filter_map(number).collect();
        if v.len() != 4 {
            return None;
        }
        Some(Self::new(v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])))
    }

    pub fn width(&self) -> f64 {
        self.ur.x - self.ll.x
    }

    pub fn height(&self) -> f64 {
        self.ur.y - self.ll.y
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() / self.height()
    }

    /// PDF array representation `[llx lly urx ury]`
    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.ll.x as f32),
            Object::Real(self.ll.y as f32),
            Object::Real(self.ur.x as f32),
            Object::Real(self.ur.y as f32),
        ])
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}, {:.2}) w={:.2} h={:.2}",
            self.ll.x, self.ll.y, self.ur.x, self.ur.y, self.width(), self.height()
        )
    }
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dim {
    pub width: f64,
    pub height: f64,
}

impl Dim {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// US Letter size (8.5" × 11")
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self::new(595.0, 842.0)
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Swap width and height
    pub fn rotated(self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}x{:.0} points", self.width, self.height)
    }
}

/// Look up a named paper size (case sensitive, e.g. "A4", "Letter")
pub fn paper_size(name: &str) -> Option<Dim> {
    let (w, h) = match name {
        "A0" => (2384.0, 3370.0),
        "A1" => (1684.0, 2384.0),
        "A2" => (1191.0, 1684.0),
        "A3" => (842.0, 1191.0),
        "A4" => (595.0, 842.0),
        "A5" => (420.0, 595.0),
        "A6" => (298.0, 420.0),
        "A7" => (210.0, 298.0),
        "A8" => (147.0, 210.0),
        "Letter" => (612.0, 792.0),
        "Legal" => (612.0, 1008.0),
        "Ledger" => (1224.0, 792.0),
        "Tabloid" => (792.0, 1224.0),
        "Executive" => (522.0, 756.0),
        "ANSIC" => (1224.0, 1584.0),
        "ANSID" => (1584.0, 2448.0),
        "ANSIE" => (2448.0, 3168.0),
        _ => return None,
    };
    Some(Dim::new(w, h))
}

/// Parse a page format like "A4", "A4L" (landscape) or "LetterP" (portrait).
///
/// Returns the dimensions and the bare paper size name.
pub fn parse_page_format(s: &str) -> Result<(Dim, String)> {
    let (base, landscape, portrait) = if let Some(b) = s.strip_suffix('L') {
        (b, true, false)
    } else if let Some(b) = s.strip_suffix('P') {
        (b, false, true)
    } else {
        (s, false, false)
    };

    let dim = paper_size(base)
        .ok_or_else(|| Error::InvalidParameterValue(format!("page format {} is unsupported", base)))?;

    let dim = if (dim.is_portrait() && landscape) || (dim.is_landscape() && portrait) {
        dim.rotated()
    } else {
        dim
    };

    Ok((dim, base.to_string()))
}

/// Anchor used for relative positioning of an overlay on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    BottomCenter,
    BottomRight,
    /// Fill the entire page (image import only)
    Full,
}

impl FromStr for Anchor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tl" => Ok(Anchor::TopLeft),
            "tc" => Ok(Anchor::TopCenter),
            "tr" => Ok(Anchor::TopRight),
            "l" => Ok(Anchor::Left),
            "c" => Ok(Anchor::Center),
            "r" => Ok(Anchor::Right),
            "bl" => Ok(Anchor::BottomLeft),
            "bc" => Ok(Anchor::BottomCenter),
            "br" => Ok(Anchor::BottomRight),
            "full" => Ok(Anchor::Full),
            _ => Err(Error::InvalidParameterValue(format!("unknown position anchor: {}", s))),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Anchor::TopLeft => "top left",
            Anchor::TopCenter => "top center",
            Anchor::TopRight => "top right",
            Anchor::Left => "left",
            Anchor::Center => "center",
            Anchor::Right => "right",
            Anchor::BottomLeft => "bottom left",
            Anchor::BottomCenter => "bottom center",
            Anchor::BottomRight => "bottom right",
            Anchor::Full => "full",
        };
        f.write_str(s)
    }
}

/// Lower-left corner of a box of size `bbw × bbh` anchored inside a viewport of size `vpw × vph`.
///
/// `Full` has no anchor position and yields the origin.
pub fn lower_left_corner(vpw: f64, vph: f64, bbw: f64, bbh: f64, anchor: Anchor) -> Point {
    let (x, y) = match anchor {
        Anchor::TopLeft => (0.0, vph - bbh),
        Anchor::TopCenter => (vpw / 2.0 - bbw / 2.0, vph - bbh),
        Anchor::TopRight => (vpw - bbw, vph - bbh),
        Anchor::Left => (0.0, vph / 2.0 - bbh / 2.0),
        Anchor::Center => (vpw / 2.0 - bbw / 2.0, vph / 2.0 - bbh / 2.0),
        Anchor::Right => (vpw - bbw, vph / 2.0 - bbh / 2.0),
        Anchor::BottomLeft => (0.0, 0.0),
        Anchor::BottomCenter => (vpw / 2.0 - bbw / 2.0, 0.0),
        Anchor::BottomRight => (vpw - bbw, 0.0),
        Anchor::Full => (0.0, 0.0),
    };
    Point { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_size() {
        let letter = Dim::letter();
        assert_eq!(letter.width, 612.0);
        assert_eq!(letter.height, 792.0);
        assert!(letter.is_portrait());
    }

    #[test]
    fn test_parse_page_format_landscape() {
        let (dim, name) = parse_page_format("A4L").unwrap();
        assert_eq!(name, "A4");
        assert_eq!(dim, Dim::new(842.0, 595.0));

        // Ledger is landscape by default, P turns it upright
        let (dim, _) = parse_page_format("LedgerP").unwrap();
        assert!(dim.is_portrait());
    }

    #[test]
    fn test_parse_page_format_unknown() {
        assert!(matches!(parse_page_format("B7"), Err(Error::InvalidParameterValue(_))));
    }

    #[test]
    fn test_rectangle_from_array_normalizes() {
        let arr = vec![Object::Integer(612), Object::Integer(792), Object::Integer(0), Object::Real(0.0)];
        let r = Rectangle::from_array(&arr).unwrap();
        assert_eq!(r, Rectangle::for_dim(612.0, 792.0));
        assert!(Rectangle::from_array(&arr[..3]).is_none());
    }

    #[test]
    fn test_lower_left_corner_center() {
        let p = lower_left_corner(612.0, 792.0, 306.0, 306.0, Anchor::Center);
        assert_eq!(p, Point { x: 153.0, y: 243.0 });
    }

    #[test]
    fn test_lower_left_corner_edges() {
        let p = lower_left_corner(600.0, 800.0, 100.0, 50.0, Anchor::TopRight);
        assert_eq!(p, Point { x: 500.0, y: 750.0 });

        let p = lower_left_corner(600.0, 800.0, 100.0, 50.0, Anchor::BottomCenter);
        assert_eq!(p, Point { x: 250.0, y: 0.0 });
    }

    #[test]
    fn test_anchor_from_str() {
        assert_eq!("bl".parse::<Anchor>().unwrap(), Anchor::BottomLeft);
        assert_eq!("full".parse::<Anchor>().unwrap(), Anchor::Full);
        assert!("middle".parse::<Anchor>().is_err());
    }
}
