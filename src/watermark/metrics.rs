//! Glyph metrics for the standard 14 fonts
//!
//! Text overlays are sized from glyph advance widths. The built-in tables
//! cover WinAnsi codes 32..=255 and are approximations: Helvetica metrics
//! serve the whole Helvetica family, Times-Roman metrics (Liberation Serif is
//! metric compatible) serve the Times family, Courier is monospaced.

/// Source of glyph widths and font bounding boxes
pub trait FontMetrics {
    /// Advance width of `byte` in 1/1000 em
    fn glyph_width(&self, font_name: &str, byte: u8) -> u16;

    /// Height of the font bounding box in 1/1000 em
    fn bbox_height(&self, font_name: &str) -> f64;

    /// Width of `text` rendered at `size` points
    fn text_width(&self, font_name: &str, text: &str, size: f64) -> f64 {
        let units: u32 = encode_win_ansi(text)
            .iter()
            .map(|&b| self.glyph_width(font_name, b) as u32)
            .sum();
        units as f64 * size / 1000.0
    }

    /// Largest integral font size at which `text` fits into `width`
    fn font_size_for_width(&self, font_name: &str, text: &str, width: f64) -> i64 {
        let w1 = self.text_width(font_name, text, 1.0);
        if w1 <= 0.0 {
            return 0;
        }
        (width / w1).floor() as i64
    }
}

/// Built-in tables for the standard 14 fonts
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMetrics;

impl FontMetrics for StandardMetrics {
    fn glyph_width(&self, font_name: &str, byte: u8) -> u16 {
        if byte < 32 {
            return 0;
        }
        let i = (byte - 32) as usize;
        match family(font_name) {
            Family::Courier => 600,
            Family::Times => TIMES_WIDTHS[i],
            Family::Helvetica => HELVETICA_WIDTHS[i],
        }
    }

    fn bbox_height(&self, font_name: &str) -> f64 {
        match family(font_name) {
            Family::Helvetica => 1156.0,
            Family::Times => 1116.0,
            Family::Courier => 1076.0,
        }
    }
}

enum Family {
    Helvetica,
    Times,
    Courier,
}

fn family(font_name: &str) -> Family {
    if font_name.starts_with("Times") {
        Family::Times
    } else if font_name.starts_with("Courier") {
        Family::Courier
    } else {
        Family::Helvetica
    }
}

/// Names of the standard 14 fonts
pub const CORE_FONTS: [&str; 14] = [
    "Courier",
    "Courier-Bold",
    "Courier-BoldOblique",
    "Courier-Oblique",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-BoldOblique",
    "Helvetica-Oblique",
    "Symbol",
    "Times-Bold",
    "Times-BoldItalic",
    "Times-Italic",
    "Times-Roman",
    "ZapfDingbats",
];

pub fn is_core_font(name: &str) -> bool {
    CORE_FONTS.contains(&name)
}

/// Map text to single-byte codes of the overlay font encoding.
///
/// The encoding is WinAnsi with the Euro sign moved to 172, unmappable
/// characters become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20AC}' => 172,
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Helvetica widths for codes 32..=255, with the Euro sign at 172
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 350,
    556, 350, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350,
    350, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 350, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 556, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

/// Times-Roman widths for codes 32..=255, with the Euro sign at 172
const TIMES_WIDTHS: [u16; 224] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541, 350,
    500, 350, 333, 500, 444, 1000, 500, 500, 333, 1000, 556, 333, 889, 350, 611, 350,
    350, 333, 333, 444, 444, 350, 500, 1000, 333, 980, 389, 333, 722, 350, 444, 722,
    250, 333, 500, 500, 500, 500, 200, 500, 333, 760, 276, 500, 500, 333, 760, 333,
    400, 564, 300, 300, 333, 500, 453, 250, 333, 300, 310, 500, 750, 750, 750, 444,
    722, 722, 722, 722, 722, 722, 889, 667, 611, 611, 611, 611, 333, 333, 333, 333,
    722, 722, 722, 722, 722, 722, 722, 564, 722, 722, 722, 722, 722, 722, 556, 500,
    444, 444, 444, 444, 444, 444, 667, 444, 444, 444, 444, 444, 278, 278, 278, 278,
    500, 500, 500, 500, 500, 500, 500, 564, 500, 500, 500, 500, 500, 500, 500, 500,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_courier_is_monospaced() {
        let m = StandardMetrics;
        assert_eq!(m.text_width("Courier", "iiii", 10.0), 24.0);
        assert_eq!(m.text_width("Courier-Bold", "WWWW", 10.0), 24.0);
    }

    #[test]
    fn test_helvetica_width() {
        let m = StandardMetrics;
        // H 722 + i 222
        assert!((m.text_width("Helvetica", "Hi", 1000.0) - 944.0).abs() < 1e-9);
    }

    #[test]
    fn test_accented_widths() {
        let m = StandardMetrics;
        for font in ["Helvetica", "Times-Roman"] {
            assert_eq!(m.text_width(font, "\u{c4}", 1000.0), m.text_width(font, "A", 1000.0));
            assert_eq!(m.text_width(font, "\u{e9}", 1000.0), m.text_width(font, "e", 1000.0));
            assert_eq!(m.text_width(font, "\u{f1}", 1000.0), m.text_width(font, "n", 1000.0));
        }
        assert_eq!(m.glyph_width("Helvetica", 0xC6), 1000);
        assert_eq!(m.glyph_width("Helvetica", 0xFF), 500);
        assert_eq!(m.glyph_width("Helvetica-Bold", 172), 556);
        assert_eq!(m.glyph_width("Times-Roman", 172), 500);
    }

    #[test]
    fn test_font_size_for_width() {
        let m = StandardMetrics;
        // 10 Courier glyphs are 6 points wide at size 1
        assert_eq!(m.font_size_for_width("Courier", "0123456789", 300.0), 50);
        assert_eq!(m.font_size_for_width("Courier", "0123456789", 305.9), 50);
        assert_eq!(m.font_size_for_width("Courier", "", 300.0), 0);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("a\u{20AC}\u{e9}\u{4e2d}"), vec![b'a', 172, 0xE9, b'?']);
    }

    #[test]
    fn test_core_fonts() {
        assert!(is_core_font("Times-Roman"));
        assert!(!is_core_font("Arial"));
    }
}
