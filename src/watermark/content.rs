//! Marked-content artifact blocks inside page content streams
//!
//! Injected overlays are bracketed by
//! `/Artifact <</Subtype /Watermark /Type /Pagination >>BDC ... EMC`.
//! The tag bytes are matched literally, so a string operand that happens to
//! contain them is treated as a marker as well.

use super::geometry::Matrix;

/// Opening tag of an overlay block
pub const MARKER_OPEN: &[u8] = b"/Artifact <</Subtype /Watermark /Type /Pagination >>BDC";

/// Closing tag of an overlay block
pub const MARKER_CLOSE: &[u8] = b"EMC";

/// Content bytes invoking form `xo_id` with graphics state `gs_id` under transform `m`
pub fn marker_block(m: &Matrix, gs_id: &str, xo_id: &str) -> Vec<u8> {
    let [a, b, c, d, e, f] = m.cm_operands();
    format!(
        " /Artifact <</Subtype /Watermark /Type /Pagination >>BDC q {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} cm /{} gs /{} Do Q EMC ",
        a, b, c, d, e, f, gs_id, xo_id
    )
    .into_bytes()
}

/// Insert `block` into `content`.
///
/// On top the block is appended; with `save_gstate` the original content is
/// wrapped in `q ... Q` first so its graphics state cannot leak into the
/// overlay. Behind the block is prepended.
pub fn patch(content: &[u8], block: &[u8], on_top: bool, save_gstate: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + block.len() + 4);
    if on_top {
        if save_gstate {
            out.extend_from_slice(b"q ");
        }
        out.extend_from_slice(content);
        out.extend_from_slice(b" Q");
        out.extend_from_slice(block);
    } else {
        out.extend_from_slice(block);
        out.extend_from_slice(content);
    }
    out
}

/// `content` prefixed with a graphics state save
pub fn save_gstate(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 2);
    out.extend_from_slice(b"q ");
    out.extend_from_slice(content);
    out
}

pub fn has_marker(content: &[u8]) -> bool {
    find(content, MARKER_OPEN, 0).is_some()
}

/// Result of excising overlay blocks from one content stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    pub content: Vec<u8>,
    /// ExtGState resource names the removed blocks referred to
    pub ext_gstates: Vec<String>,
    /// XObject resource names the removed blocks referred to
    pub forms: Vec<String>,
    pub blocks: usize,
}

/// Cut every overlay block out of `content`; `None` if there is none.
///
/// A block takes one padding space on either side with it so that removing
/// a block inserted by `patch` restores the surrounding bytes.
pub fn remove_markers(content: &[u8]) -> Option<Removal> {
    let mut removal = Removal::default();
    let mut out = Vec::with_capacity(content.len());
    let mut pos = 0;

    while let Some(begin) = find(content, MARKER_OPEN, pos) {
        let Some(close) = find(content, MARKER_CLOSE, begin + MARKER_OPEN.len()) else {
            log::warn!("unterminated watermark block at offset {}", begin);
            break;
        };
        let end = close + MARKER_CLOSE.len();
        let block = &content[begin..end];

        if let Some(name) = operand_name(block, b"/GS", b" gs") {
            removal.ext_gstates.push(name);
        }
        if let Some(name) = operand_name(block, b"/Fm", b" Do") {
            removal.forms.push(name);
        }

        let mut cut_start = begin;
        if cut_start > pos && content[cut_start - 1] == b' ' {
            cut_start -= 1;
        }
        let mut cut_end = end;
        if cut_end < content.len() && content[cut_end] == b' ' {
            cut_end += 1;
        }

        out.extend_from_slice(&content[pos..cut_start]);
        // Keep tokens on both sides apart
        if !out.is_empty() && cut_end < content.len() {
            out.push(b' ');
        }
        pos = cut_end;
        removal.blocks += 1;
    }

    if removal.blocks == 0 {
        return None;
    }
    out.extend_from_slice(&content[pos..]);
    removal.content = out;
    Some(removal)
}

/// Resource name following `prefix`'s slash up to `terminator`, e.g. `GS0` in `/GS0 gs`
fn operand_name(block: &[u8], prefix: &[u8], terminator: &[u8]) -> Option<String> {
    let start = find(block, prefix, 0)?;
    let end = find(block, terminator, start)?;
    Some(String::from_utf8_lossy(&block[start + 1..end]).into_owned())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
