//! Parameter strings for watermarks and image import
//!
//! A description is a comma separated list of `key:value` pairs, e.g.
//! `"rot:45, op:0.6, pos:bl, off:10 10"`. Keys may be abbreviated to any
//! unambiguous prefix.

use crate::error::{Error, Result};
use crate::layout::{parse_page_format, Anchor, Dim};
use crate::pdf::import::Import;
use crate::watermark::metrics::is_core_font;
use crate::watermark::{Diagonal, Overlay, RenderMode, SimpleColor, Watermark};

type Handler<T> = fn(&str, &mut T) -> Result<()>;

/// Resolve `prefix` against the keys of `table`
fn complete<'a, T>(table: &'a [(&'static str, T)], prefix: &str) -> Result<&'a T> {
    let mut found = None;
    for (key, handler) in table {
        if !key.starts_with(prefix) {
            continue;
        }
        if found.is_some() {
            return Err(Error::AmbiguousParameterPrefix(prefix.to_string()));
        }
        found = Some(handler);
    }
    found.ok_or_else(|| Error::UnknownParameterPrefix(prefix.to_string()))
}

/// Split a description into trimmed `(key, value)` pairs
fn pairs<'a>(description: &'a str, what: &str) -> Result<Vec<(&'a str, &'a str)>> {
    if description.trim().is_empty() {
        return Ok(Vec::new());
    }
    description
        .split(',')
        .map(|item| {
            let mut parts = item.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(k), Some(v), None) => Ok((k.trim(), v.trim())),
                _ => Err(Error::InvalidParameterValue(format!("invalid {} configuration: {}", what, item))),
            }
        })
        .collect()
}

fn invalid(msg: String) -> Error {
    Error::InvalidParameterValue(msg)
}

fn parse_f64(s: &str, what: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|_| invalid(format!("{} must be a numeric value: {}", what, s)))
}

fn parse_unit(s: &str, what: &str) -> Result<f64> {
    let v = parse_f64(s, what)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(invalid(format!("{} must be between 0.0 and 1.0: {}", what, s)));
    }
    Ok(v)
}

/// `"dx dy"`
fn parse_offset(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    match parts.as_slice() {
        [dx, dy] => Ok((parse_f64(dx, "offset")?, parse_f64(dy, "offset")?)),
        _ => Err(invalid(format!("position offset needs 2 numeric values: {}", s))),
    }
}

/// `"0.5"`, `"0.5 abs"` or `"0.5 rel"`
fn parse_scale_factor(s: &str) -> Result<(f64, bool)> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    let (factor, mode) = match parts.as_slice() {
        [f] => (*f, None),
        [f, m] => (*f, Some(*m)),
        _ => return Err(invalid(format!("scale factor: 0.0 <= s <= 1.0 {{abs|rel}}, {}", s))),
    };
    let scale = parse_unit(factor, "scale factor")?;
    let abs = match mode {
        None | Some("r") | Some("rel") => false,
        Some("a") | Some("abs") => true,
        Some(m) => return Err(invalid(format!("scale mode must be abs or rel: {}", m))),
    };
    Ok((scale, abs))
}

/// A watermark being configured, remembering whether an orientation was given
struct WatermarkParams {
    wm: Watermark,
    orientation_set: bool,
}

impl WatermarkParams {
    fn set_orientation(&mut self) -> Result<()> {
        if self.orientation_set {
            return Err(invalid("please specify rotation or diagonal, not both".to_string()));
        }
        self.orientation_set = true;
        Ok(())
    }
}

const WATERMARK_KEYS: &[(&str, Handler<WatermarkParams>)] = &[
    ("fontname", parse_font_name),
    ("points", parse_points),
    ("color", parse_color),
    ("rotation", parse_rotation),
    ("diagonal", parse_diagonal),
    ("opacity", parse_opacity),
    ("mode", parse_render_mode),
    ("rendermode", parse_render_mode),
    ("position", parse_position),
    ("offset", parse_watermark_offset),
    ("scalefactor", parse_watermark_scale),
];

fn parse_font_name(s: &str, p: &mut WatermarkParams) -> Result<()> {
    if !is_core_font(s) {
        return Err(invalid(format!("font {} is unsupported", s)));
    }
    if let Some(text) = p.wm.text_overlay_mut() {
        text.font_name = s.to_string();
    }
    Ok(())
}

fn parse_points(s: &str, p: &mut WatermarkParams) -> Result<()> {
    let size: i64 = s
        .parse()
        .map_err(|_| invalid(format!("font size must be an integer: {}", s)))?;
    if size <= 0 {
        return Err(invalid(format!("font size must be positive: {}", s)));
    }
    if let Some(text) = p.wm.text_overlay_mut() {
        text.font_size = size;
    }
    Ok(())
}

fn parse_color(s: &str, p: &mut WatermarkParams) -> Result<()> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(invalid(format!("color needs 3 intensities 0.0 <= i <= 1.0: {}", s)));
    };
    let color = SimpleColor::new(
        parse_unit(r, "red")? as f32,
        parse_unit(g, "green")? as f32,
        parse_unit(b, "blue")? as f32,
    );
    if let Some(text) = p.wm.text_overlay_mut() {
        text.color = color;
    }
    Ok(())
}

fn parse_rotation(s: &str, p: &mut WatermarkParams) -> Result<()> {
    p.set_orientation()?;
    let r = parse_f64(s, "rotation")?;
    if !(-180.0..=180.0).contains(&r) {
        return Err(invalid(format!("rotation must be between -180 and 180 degrees: {}", s)));
    }
    p.wm.set_rotation(r);
    Ok(())
}

fn parse_diagonal(s: &str, p: &mut WatermarkParams) -> Result<()> {
    p.set_orientation()?;
    let diagonal = match s {
        "1" => Diagonal::LowerLeftToUpperRight,
        "2" => Diagonal::UpperLeftToLowerRight,
        _ => {
            return Err(invalid(format!(
                "diagonal: 1..lower left to upper right, 2..upper left to lower right, got {}",
                s
            )))
        }
    };
    p.wm.set_diagonal(diagonal);
    Ok(())
}

fn parse_opacity(s: &str, p: &mut WatermarkParams) -> Result<()> {
    p.wm.opacity = parse_unit(s, "opacity")?;
    Ok(())
}

fn parse_render_mode(s: &str, p: &mut WatermarkParams) -> Result<()> {
    let mode = match s {
        "0" => RenderMode::Fill,
        "1" => RenderMode::Stroke,
        "2" => RenderMode::FillAndStroke,
        _ => return Err(invalid(format!("render mode: 0..fill, 1..stroke, 2..fill&stroke, got {}", s))),
    };
    if let Some(text) = p.wm.text_overlay_mut() {
        text.render_mode = mode;
    }
    Ok(())
}

fn parse_position(s: &str, p: &mut WatermarkParams) -> Result<()> {
    let anchor: Anchor = s.parse()?;
    if anchor == Anchor::Full {
        return Err(invalid("position full is only available for image import".to_string()));
    }
    p.wm.anchor = anchor;
    Ok(())
}

fn parse_watermark_offset(s: &str, p: &mut WatermarkParams) -> Result<()> {
    (p.wm.dx, p.wm.dy) = parse_offset(s)?;
    Ok(())
}

fn parse_watermark_scale(s: &str, p: &mut WatermarkParams) -> Result<()> {
    (p.wm.scale, p.wm.scale_abs) = parse_scale_factor(s)?;
    Ok(())
}

/// Build a watermark (`on_top == false`) or stamp for `kind` configured by `description`
pub fn parse_watermark_details(kind: Overlay, description: &str, on_top: bool) -> Result<Watermark> {
    apply_watermark_details(Watermark::new(kind, on_top), description)
}

/// Text variant of `parse_watermark_details`
pub fn parse_text_watermark_details(text: &str, description: &str, on_top: bool) -> Result<Watermark> {
    apply_watermark_details(Watermark::text(text, on_top), description)
}

/// Apply `description` on top of an already constructed watermark
pub fn apply_watermark_details(wm: Watermark, description: &str) -> Result<Watermark> {
    let what = wm.mode_name();
    let mut params = WatermarkParams { wm, orientation_set: false };
    for (key, value) in pairs(description, what)? {
        let handler = complete(WATERMARK_KEYS, key)?;
        handler(value, &mut params)?;
    }
    Ok(params.wm)
}

/// Import configuration being parsed, remembering whether page dimensions were given
struct ImportParams {
    imp: Import,
    user_dim: bool,
}

impl ImportParams {
    fn set_dimensions(&mut self, dim: Dim, page_size: String) -> Result<()> {
        if self.user_dim {
            return Err(invalid("only one of formsize(papersize) or dimensions allowed".to_string()));
        }
        self.user_dim = true;
        self.imp.page_dim = dim;
        self.imp.page_size = page_size;
        Ok(())
    }
}

const IMPORT_KEYS: &[(&str, Handler<ImportParams>)] = &[
    ("dimensions", parse_dimensions),
    ("dpi", parse_dpi),
    ("formsize", parse_form_size),
    ("papersize", parse_form_size),
    ("position", parse_import_position),
    ("offset", parse_import_offset),
    ("scalefactor", parse_import_scale),
];

fn parse_dimensions(s: &str, p: &mut ImportParams) -> Result<()> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    let [w, h] = parts.as_slice() else {
        return Err(invalid(format!("dimensions need 2 positive values: {}", s)));
    };
    let (w, h) = (parse_f64(w, "width")?, parse_f64(h, "height")?);
    if w <= 0.0 || h <= 0.0 {
        return Err(invalid(format!("dimensions must be positive: {}", s)));
    }
    p.set_dimensions(Dim::new(w, h), String::new())
}

fn parse_form_size(s: &str, p: &mut ImportParams) -> Result<()> {
    let (dim, name) = parse_page_format(s)?;
    p.set_dimensions(dim, name)
}

fn parse_dpi(s: &str, p: &mut ImportParams) -> Result<()> {
    p.imp.dpi = s
        .parse()
        .map_err(|_| invalid(format!("dpi must be a positive integer: {}", s)))?;
    Ok(())
}

fn parse_import_position(s: &str, p: &mut ImportParams) -> Result<()> {
    p.imp.anchor = s.parse()?;
    Ok(())
}

fn parse_import_offset(s: &str, p: &mut ImportParams) -> Result<()> {
    (p.imp.dx, p.imp.dy) = parse_offset(s)?;
    Ok(())
}

fn parse_import_scale(s: &str, p: &mut ImportParams) -> Result<()> {
    (p.imp.scale, p.imp.scale_abs) = parse_scale_factor(s)?;
    Ok(())
}

/// Parse an image import description; an empty description yields the defaults
pub fn parse_import_details(description: &str) -> Result<Import> {
    let mut params = ImportParams {
        imp: Import::default(),
        user_dim: false,
    };
    for (key, value) in pairs(description, "import")? {
        let handler = complete(IMPORT_KEYS, key)?;
        handler(value, &mut params)?;
    }
    Ok(params.imp)
}
