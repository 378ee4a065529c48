//! Overlay geometry: bounding box and placement matrix

use std::f64::consts::PI;
use std::ops::Mul;
use crate::layout::{lower_left_corner, Rectangle};
use super::{Diagonal, Orientation, Overlay, Watermark};

/// 3x3 affine transform in row-vector convention, third column always [0 0 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [[f64; 3]; 3]);

impl Matrix {
    /// Identity matrix (no transformation)
    pub fn identity() -> Self {
        Matrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Counter-clockwise rotation by `degrees`
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = (degrees * PI / 180.0).sin_cos();
        Matrix([[cos, sin, 0.0], [-sin, cos, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Matrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [tx, ty, 1.0]])
    }

    /// `[a b c d e f]` operands of the `cm` operator
    pub fn cm_operands(&self) -> [f64; 6] {
        let m = &self.0;
        [m[0][0], m[0][1], m[1][0], m[1][1], m[2][0], m[2][1]]
    }

    /// Apply to a point
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (x * m[0][0] + y * m[1][0] + m[2][0], x * m[0][1] + y * m[1][1] + m[2][1])
    }

    /// Check if this is (approximately) the identity matrix
    pub fn is_identity(&self) -> bool {
        let id = Matrix::identity();
        self.0
            .iter()
            .flatten()
            .zip(id.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() < 0.001)
    }
}

impl Mul for Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Matrix) -> Matrix {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Matrix(out)
    }
}

/// Box of natural size `width × height` scaled into viewport `vp`, keeping the aspect ratio.
///
/// Absolute scaling multiplies the natural width; relative scaling fits the
/// larger dimension to `scale` times the matching viewport dimension.
pub fn scaled_box(width: f64, height: f64, scale: f64, scale_abs: bool, vp: &Rectangle) -> Rectangle {
    let ar = width / height;
    let (w, h) = if scale_abs {
        let w = scale * width;
        (w, w / ar)
    } else if ar >= 1.0 {
        let w = scale * vp.width();
        (w, w / ar)
    } else {
        let h = scale * vp.height();
        (h * ar, h)
    };
    Rectangle::for_dim(w, h)
}

impl Watermark {
    /// Compute the overlay's bounding box for page `page_nr` from the current viewport
    pub fn calc_bounding_box(&mut self, page_nr: usize) {
        let natural = match &self.overlay {
            Overlay::Image { width, height, .. } => Some((*width as f64, *height as f64)),
            Overlay::Pdf { .. } => self
                .donor_pages
                .get(&self.donor_page_nr(page_nr))
                .map(|p| (p.width, p.height)),
            Overlay::Text(_) => None,
        };

        if let Some((w, h)) = natural {
            self.bb = scaled_box(w, h, self.scale, self.scale_abs, &self.vp);
            return;
        }

        let Overlay::Text(text) = &self.overlay else { return };
        let metrics = self.metrics.as_ref();

        let (w, scaled) = if self.scale_abs {
            let scaled = (text.font_size as f64 * self.scale) as i64;
            let w = text
                .lines
                .iter()
                .map(|l| metrics.text_width(&text.font_name, l, scaled as f64))
                .fold(0.0, f64::max);
            (w, scaled)
        } else {
            let w = self.scale * self.vp.width();
            let scaled = text
                .lines
                .iter()
                .map(|l| metrics.font_size_for_width(&text.font_name, l, w))
                .min()
                .unwrap_or(text.font_size);
            (w, scaled)
        };

        let lines = text.lines.len().max(1) as f64;
        let fbb_height = metrics.bbox_height(&text.font_name);
        let h = scaled as f64 * fbb_height / 1000.0 + (lines - 1.0) * scaled as f64;

        self.scaled_font_size = scaled;
        self.bb = Rectangle::for_dim(w, h);
    }

    /// Rotation angle in degrees for the current viewport and bounding box
    pub fn rotation_degrees(&self) -> f64 {
        match self.orientation {
            Orientation::Rotation(r) => r,
            Orientation::Diagonal(direction) => {
                let mut r = (self.vp.height() / self.vp.width()).atan() * 180.0 / PI;
                if self.bb.aspect_ratio() < 1.0 {
                    r -= 90.0;
                }
                if direction == Diagonal::UpperLeftToLowerRight {
                    r = -r;
                }
                r
            }
        }
    }

    /// Placement matrix: rotate about the box center, then move to the anchor plus offset
    pub fn calc_transform_matrix(&self) -> Matrix {
        let r = self.rotation_degrees();
        let (sin, cos) = (r * PI / 180.0).sin_cos();
        let rotation = Matrix([[cos, sin, 0.0], [-sin, cos, 0.0], [0.0, 0.0, 1.0]]);

        // Text boxes carry their baseline offset in the lower-left y
        let dy = if self.is_text() { self.bb.ll.y } else { 0.0 };

        let (bbw, bbh) = (self.bb.width(), self.bb.height());
        let ll = lower_left_corner(self.vp.width(), self.vp.height(), bbw, bbh, self.anchor);

        let tx = ll.x + bbw / 2.0 + self.dx + sin * (bbh / 2.0 + dy) - cos * bbw / 2.0;
        let ty = ll.y + bbh / 2.0 + self.dy - cos * (bbh / 2.0 + dy) - sin * bbw / 2.0;

        rotation * Matrix::translation(tx, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Dictionary, Stream};
    use crate::layout::Anchor;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn image_watermark(w: u32, h: u32) -> Watermark {
        let mut wm = Watermark::image(Stream::new(Dictionary::new(), Vec::new()), w, h, false);
        wm.vp = Rectangle::for_dim(612.0, 792.0);
        wm
    }

    #[test]
    fn test_square_image_relative_scale() {
        let mut wm = image_watermark(100, 100);
        wm.set_rotation(0.0);
        wm.calc_bounding_box(1);
        assert!(close(wm.bb.width(), 306.0));
        assert!(close(wm.bb.height(), 306.0));

        let m = wm.calc_transform_matrix();
        let [a, b, c, d, e, f] = m.cm_operands();
        assert!(close(a, 1.0) && close(b, 0.0) && close(c, 0.0) && close(d, 1.0));
        assert!(close(e, 153.0));
        assert!(close(f, 243.0));
    }

    #[test]
    fn test_portrait_image_fits_height() {
        let mut wm = image_watermark(50, 100);
        wm.calc_bounding_box(1);
        assert!(close(wm.bb.height(), 396.0));
        assert!(close(wm.bb.width(), 198.0));
    }

    #[test]
    fn test_absolute_scale() {
        let mut wm = image_watermark(200, 100);
        wm.scale = 2.0;
        wm.scale_abs = true;
        wm.calc_bounding_box(1);
        assert!(close(wm.bb.width(), 400.0));
        assert!(close(wm.bb.height(), 200.0));
    }

    #[test]
    fn test_diagonal_angle() {
        let mut wm = image_watermark(100, 100);
        wm.calc_bounding_box(1);
        let r = wm.rotation_degrees();
        assert!((r - 52.3).abs() < 0.1, "got {}", r);

        wm.set_diagonal(Diagonal::UpperLeftToLowerRight);
        assert!((wm.rotation_degrees() + 52.3).abs() < 0.1);

        // Tall boxes turn the other way round
        let mut tall = image_watermark(50, 100);
        tall.calc_bounding_box(1);
        assert!((tall.rotation_degrees() - (52.3 - 90.0)).abs() < 0.1);
    }

    #[test]
    fn test_rotation_pivots_about_box_center() {
        let mut wm = image_watermark(100, 100);
        wm.set_rotation(90.0);
        wm.calc_bounding_box(1);
        let m = wm.calc_transform_matrix();

        // The box center stays where the unrotated center would be
        let (cx, cy) = m.transform(153.0, 153.0);
        assert!(close(cx, 306.0), "cx {}", cx);
        assert!(close(cy, 396.0), "cy {}", cy);
    }

    #[test]
    fn test_text_relative_scale() {
        let mut wm = Watermark::text("Draft", false);
        wm.vp = Rectangle::for_dim(612.0, 792.0);
        wm.text_overlay_mut().unwrap().font_name = "Courier".to_string();
        wm.calc_bounding_box(1);

        // 5 Courier glyphs are 3 points wide at size 1, the box is 306 wide
        assert_eq!(wm.scaled_font_size, 102);
        assert!(close(wm.bb.width(), 306.0));
        assert!(close(wm.bb.height(), 102.0 * 1076.0 / 1000.0));
    }

    #[test]
    fn test_text_absolute_scale_multiline() {
        let mut wm = Watermark::text("ab\\ncdef", false);
        wm.vp = Rectangle::for_dim(612.0, 792.0);
        wm.scale = 1.0;
        wm.scale_abs = true;
        wm.text_overlay_mut().unwrap().font_name = "Courier".to_string();
        wm.calc_bounding_box(1);

        assert_eq!(wm.scaled_font_size, 24);
        assert!(close(wm.bb.width(), 4.0 * 0.6 * 24.0));
        assert!(close(wm.bb.height(), 24.0 * 1.076 + 24.0));
    }

    #[test]
    fn test_anchor_offset() {
        let mut wm = image_watermark(100, 100);
        wm.set_rotation(0.0);
        wm.anchor = Anchor::BottomLeft;
        wm.dx = 10.0;
        wm.dy = -5.0;
        wm.calc_bounding_box(1);
        let [_, _, _, _, e, f] = wm.calc_transform_matrix().cm_operands();
        assert!(close(e, 10.0));
        assert!(close(f, -5.0));
    }

    #[test]
    fn test_matrix_multiply_identity() {
        let r = Matrix::rotation(30.0);
        assert_eq!(r * Matrix::identity(), r);
        assert!((Matrix::rotation(45.0) * Matrix::rotation(-45.0)).is_identity());
    }
}
