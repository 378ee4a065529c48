//! Applying, detecting and removing overlays on a document

use std::collections::BTreeMap;
use std::path::Path;
use lopdf::{Dictionary, Object, ObjectId, Stream};
use crate::context::{load_context, save_context, Context, PageEntry, ResourcesRef};
use crate::error::{Error, Result};
use crate::filter::{decode_stream, encode_stream, is_unsupported};
use crate::object::{collect_references, dict_mut, dict_type, kind, literal, name, name_array, text_string};
use crate::pdf::migrate::migrate;
use crate::xref::{ObjectMap, ObjectNumber};
use super::content::{has_marker, marker_block, patch, remove_markers, save_gstate};
use super::metrics::encode_win_ansi;
use super::{DonorPage, FormKey, Overlay, ResourceNames, Watermark};

/// Per-page outcome of a batch operation
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<usize>,
    /// Pages left alone because a content stream uses an unsupported filter
    /// (or, on removal, carried no overlay)
    pub skipped: Vec<usize>,
    pub failed: Vec<(usize, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, page_nr: usize, outcome: Result<bool>) {
        match outcome {
            Ok(true) => self.succeeded.push(page_nr),
            Ok(false) => self.skipped.push(page_nr),
            Err(e) => {
                log::warn!("page {}: {}", page_nr, e);
                self.failed.push((page_nr, e));
            }
        }
    }
}

/// Selected pages in ascending order; empty selects every page
fn selected_pages(all: Vec<PageEntry>, pages: &[usize]) -> Vec<PageEntry> {
    let count = all.len();
    if pages.is_empty() {
        return all;
    }

    let mut selected: Vec<usize> = pages.iter().copied().filter(|&n| n >= 1 && n <= count).collect();
    if selected.len() < pages.len() {
        log::warn!(
            "ignoring {} page number(s) outside the document ({} pages)",
            pages.len() - selected.len(),
            count
        );
    }
    selected.sort_unstable();
    selected.dedup();
    all.into_iter().filter(|p| selected.binary_search(&p.number).is_ok()).collect()
}

/// Apply `wm` to the selected pages of `ctx` (all pages if `pages` is empty).
///
/// Optional content, graphics state and overlay resources are set up once
/// per session; failing that aborts the call. Failures on individual pages
/// are collected in the report.
pub fn add_watermarks(ctx: &mut Context, pages: &[usize], wm: &mut Watermark) -> Result<BatchReport> {
    log::info!("adding {}", wm);
    let pages = selected_pages(ctx.pages()?, pages);

    prepare_session(ctx, wm)?;

    let mut report = BatchReport::default();
    let mut orphans = Vec::new();
    for page in &pages {
        let outcome = add_page_watermark(ctx, page, wm, &mut orphans);
        report.record(page.number, outcome);
    }
    free_orphans(ctx, orphans);

    // Optional content requires 1.5
    if ctx.version.as_str() < "1.5" {
        ctx.version = "1.5".to_string();
    }

    log::info!(
        "{}: {} pages done, {} skipped, {} failed",
        wm.mode_name(),
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}

fn prepare_session(ctx: &mut Context, wm: &mut Watermark) -> Result<()> {
    if wm.ocg.is_none() {
        wm.ocg = Some(prepare_oc_properties(ctx, wm.on_top)?);
    }

    if wm.ext_gstate.is_none() {
        let mut gs = Dictionary::new();
        gs.set("Type", name("ExtGState"));
        gs.set("CA", Object::Real(wm.opacity as f32));
        gs.set("ca", Object::Real(wm.opacity as f32));
        wm.ext_gstate = Some(ctx.table.allocate(Object::Dictionary(gs)));
    }

    match &wm.overlay {
        Overlay::Text(text) if wm.font.is_none() => {
            wm.font = Some(ctx.table.allocate(Object::Dictionary(core_font_dict(&text.font_name))));
        }
        Overlay::Image { xobject, .. } if wm.image.is_none() => {
            wm.image = Some(ctx.table.allocate(Object::Stream(xobject.clone())));
        }
        Overlay::Pdf { donor, page } if wm.donor_pages.is_empty() => {
            let donor_pages = migrate_donor_pages(ctx, donor, *page)?;
            wm.donor_pages = donor_pages;
        }
        _ => {}
    }
    Ok(())
}

/// Id of the optional content group overlays are tagged with.
///
/// The first group already listed in the catalog is reused; otherwise a
/// "Watermark" (on top) or "Background" group is created and switched on for
/// viewing, printing and export.
fn prepare_oc_properties(ctx: &mut Context, on_top: bool) -> Result<ObjectId> {
    if let Some(ocgs) = locate_ocgs(ctx)? {
        match ocgs.first() {
            Some(Object::Reference(id)) => return Ok(*id),
            Some(_) => return Err(Error::General("OCProperties: corrupt OCGs element".to_string())),
            None => {}
        }
    }

    let (label, subtype) = if on_top { ("Watermark", "FG") } else { ("Background", "BG") };

    let state = |key: &str| {
        let mut d = Dictionary::new();
        d.set(key, name("ON"));
        Object::Dictionary(d)
    };
    let mut element = Dictionary::new();
    element.set("Subtype", name(subtype));
    let mut usage = Dictionary::new();
    usage.set("PageElement", Object::Dictionary(element));
    usage.set("View", state("ViewState"));
    usage.set("Print", state("PrintState"));
    usage.set("Export", state("ExportState"));

    let mut ocg = Dictionary::new();
    ocg.set("Name", literal(label));
    ocg.set("Type", name("OCG"));
    ocg.set("Usage", Object::Dictionary(usage));
    let ocg_id = ctx.table.allocate(Object::Dictionary(ocg));
    let ocg_ref = || Object::Array(vec![Object::Reference(ocg_id)]);

    let auto_state = |event: &str| {
        let mut d = Dictionary::new();
        d.set("Category", name_array(&[event]));
        d.set("Event", name(event));
        d.set("OCGs", ocg_ref());
        Object::Dictionary(d)
    };
    let mut config = Dictionary::new();
    config.set("AS", Object::Array(vec![auto_state("View"), auto_state("Print"), auto_state("Export")]));
    config.set("ON", ocg_ref());
    config.set("Order", Object::Array(Vec::new()));
    config.set("RBGroups", Object::Array(Vec::new()));

    let mut props = Dictionary::new();
    props.set("OCGs", ocg_ref());
    props.set("D", Object::Dictionary(config));
    ctx.catalog_mut()?.set("OCProperties", Object::Dictionary(props));

    log::debug!("created optional content group {} ({})", ocg_id.0, label);
    Ok(ocg_id)
}

/// The catalog's `/OCProperties /OCGs` array, if present
fn locate_ocgs(ctx: &Context) -> Result<Option<Vec<Object>>> {
    let catalog = ctx.catalog()?;
    let Ok(props) = catalog.get(b"OCProperties") else { return Ok(None) };
    let props = ctx.table.dereference_dict(props)?;
    let Ok(ocgs) = props.get(b"OCGs") else { return Ok(None) };
    match ctx.table.dereference(ocgs)? {
        Object::Array(arr) => Ok(Some(arr.clone())),
        _ => Ok(None),
    }
}

/// True if the catalog lists an optional content group named Watermark or Background
fn has_watermark_ocg(ctx: &Context) -> Result<bool> {
    let Some(ocgs) = locate_ocgs(ctx)? else { return Ok(false) };
    for o in &ocgs {
        if matches!(o, Object::Null) {
            continue;
        }
        let d = ctx.table.dereference_dict(o)?;
        if dict_type(d) != Some(&b"OCG"[..]) {
            continue;
        }
        let label = d.get(b"Name").ok().and_then(text_string);
        if matches!(label.as_deref(), Some("Watermark") | Some("Background")) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Type1 dictionary for one of the standard 14 fonts
fn core_font_dict(font_name: &str) -> Dictionary {
    let mut d = Dictionary::new();
    d.set("Type", name("Font"));
    d.set("Subtype", name("Type1"));
    d.set("BaseFont", name(font_name));

    if font_name != "Symbol" && font_name != "ZapfDingbats" {
        let mut enc = Dictionary::new();
        enc.set("Type", name("Encoding"));
        enc.set("BaseEncoding", name("WinAnsiEncoding"));
        enc.set("Differences", Object::Array(vec![Object::Integer(172), name("Euro")]));
        d.set("Encoding", Object::Dictionary(enc));
    }
    d
}

/// Copy the donor pages an overlay needs into `ctx`.
///
/// Page 0 selects donor pages 1..=min(page count of `ctx`, page count of `donor`).
fn migrate_donor_pages(ctx: &mut Context, donor: &Context, page: usize) -> Result<BTreeMap<usize, DonorPage>> {
    let donor_pages = donor.pages()?;
    let numbers: Vec<usize> = if page == 0 {
        let n = ctx.pages()?.len().min(donor_pages.len()).max(1);
        (1..=n).collect()
    } else {
        vec![page]
    };

    // Shared across pages so common resources are copied once
    let mut migrated = ObjectMap::new();
    let mut out = BTreeMap::new();
    for n in numbers {
        let entry = n
            .checked_sub(1)
            .and_then(|i| donor_pages.get(i))
            .ok_or(Error::InvalidPageNumber(n))?;
        out.insert(n, migrate_donor_page(ctx, donor, entry, &mut migrated)?);
    }
    log::debug!("migrated {} donor pages ({} objects)", out.len(), migrated.len());
    Ok(out)
}

fn migrate_donor_page(ctx: &mut Context, donor: &Context, page: &PageEntry, migrated: &mut ObjectMap) -> Result<DonorPage> {
    let page_nr = page.number;

    let mut content = Vec::new();
    for (i, id) in content_streams(donor, page.id)?.into_iter().enumerate() {
        if i > 0 {
            content.push(b'\n');
        }
        // Unsupported filters are fatal here: the overlay would be empty
        content.extend(stream_bytes(donor, id)?);
    }
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::NoContent(page_nr));
    }

    let resources = match page.attrs.resources {
        Some(r) => Object::Dictionary(donor.resources(r)?.clone()),
        None => Object::Dictionary(Dictionary::new()),
    };
    let resources = migrate(&donor.table, &mut ctx.table, migrated, &resources)?;
    let resources = ctx.table.allocate(resources);

    let vp = page.viewport();
    Ok(DonorPage {
        content,
        resources,
        width: vp.width(),
        height: vp.height(),
    })
}

fn add_page_watermark(
    ctx: &mut Context,
    page: &PageEntry,
    wm: &mut Watermark,
    orphans: &mut Vec<ObjectId>,
) -> Result<bool> {
    let page_nr = page.number;
    if wm.update {
        let touched = content_streams(ctx, page.id)?
            .iter()
            .any(|id| wm.applied.contains(&id.0));
        // A stream shared with a page done earlier in this session already carries the new overlay
        if !touched {
            remove_page_watermark(ctx, page, orphans)?;
        }
    }

    wm.vp = page.viewport();
    wm.page_rotation = page.attrs.rotate;

    let form = form_for_page(ctx, page_nr, wm)?;
    log::debug!(
        "page {}: viewport {}, rotation {}, box {}",
        page_nr,
        wm.vp,
        wm.page_rotation,
        wm.bb
    );

    let names = resource_names(ctx, page)?;
    let block = marker_block(&wm.calc_transform_matrix(), &names.ext_gstate, &names.form);

    let Some(names) = patch_page_contents(ctx, page, wm, names, &block)? else {
        return Ok(false);
    };

    let gs = wm
        .ext_gstate
        .ok_or_else(|| Error::General("graphics state missing from session".to_string()))?;
    let res = ctx.page_resources_mut(page)?;
    insert_resource(res, b"ExtGState", &names.ext_gstate, gs);
    insert_resource(res, b"XObject", &names.form, form);
    Ok(true)
}

/// First `GSn`/`Fmn` names not yet used by the page's resources
fn resource_names(ctx: &Context, page: &PageEntry) -> Result<ResourceNames> {
    let res = match page.attrs.resources {
        Some(r) => Some(ctx.resources(r)?),
        None => None,
    };
    Ok(ResourceNames {
        ext_gstate: free_name(ctx, res, b"ExtGState", "GS")?,
        form: free_name(ctx, res, b"XObject", "Fm")?,
    })
}

fn free_name(ctx: &Context, res: Option<&Dictionary>, category: &[u8], prefix: &str) -> Result<String> {
    let sub = res
        .and_then(|r| r.get(category).ok())
        .and_then(|o| ctx.table.dereference_dict(o).ok());
    (0..1000)
        .map(|n| format!("{}{}", prefix, n))
        .find(|key| sub.map_or(true, |d| !d.has(key.as_bytes())))
        .ok_or_else(|| Error::General(format!("no free {} resource name", prefix)))
}

fn insert_resource(res: &mut Dictionary, category: &[u8], key: &str, id: ObjectId) {
    match res.get_mut(category) {
        Ok(Object::Dictionary(d)) => {
            d.set(key, Object::Reference(id));
        }
        _ => {
            let mut d = Dictionary::new();
            d.set(key, Object::Reference(id));
            res.set(category.to_vec(), Object::Dictionary(d));
        }
    }
}

/// Insert `block` into the page content.
///
/// Returns the resource names the page content now refers to, or `None` if a
/// stream could not be decoded and the page was left untouched.
fn patch_page_contents(
    ctx: &mut Context,
    page: &PageEntry,
    wm: &mut Watermark,
    names: ResourceNames,
    block: &[u8],
) -> Result<Option<ResourceNames>> {
    let streams = content_streams(ctx, page.id)?;

    let (first, last) = match (streams.first(), streams.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            let id = ctx
                .table
                .allocate(Object::Stream(Stream::new(Dictionary::new(), block.to_vec())));
            page_dict_mut(ctx, page.id)?.set("Contents", Object::Reference(id));
            wm.applied.insert(id.0);
            wm.applied_names.insert(id.0, names.clone());
            return Ok(Some(names));
        }
    };

    if streams.len() == 1 || !wm.on_top {
        if let Some(done) = already_patched(wm, first, &names) {
            return Ok(Some(done));
        }
        let Some(bytes) = decodable(ctx, first, page.number)? else { return Ok(None) };
        write_stream(ctx, first, patch(&bytes, block, wm.on_top, true))?;
        wm.applied.insert(first.0);
        wm.applied_names.insert(first.0, names.clone());
        return Ok(Some(names));
    }

    // On top of several streams: save the state in the first, draw after the last
    if let Some(done) = already_patched(wm, last, &names) {
        return Ok(Some(done));
    }
    let Some(last_bytes) = decodable(ctx, last, page.number)? else { return Ok(None) };
    if !wm.applied.contains(&first.0) {
        let Some(first_bytes) = decodable(ctx, first, page.number)? else { return Ok(None) };
        write_stream(ctx, first, save_gstate(&first_bytes))?;
        wm.applied.insert(first.0);
    }
    write_stream(ctx, last, patch(&last_bytes, block, true, false))?;
    wm.applied.insert(last.0);
    wm.applied_names.insert(last.0, names.clone());
    Ok(Some(names))
}

fn already_patched(wm: &Watermark, id: ObjectId, names: &ResourceNames) -> Option<ResourceNames> {
    if !wm.applied.contains(&id.0) {
        return None;
    }
    log::debug!("content stream {} already carries this overlay", id.0);
    Some(wm.applied_names.get(&id.0).cloned().unwrap_or_else(|| names.clone()))
}

/// Decoded stream bytes, or `None` if its filter is unsupported
fn decodable(ctx: &Context, id: ObjectId, page_nr: usize) -> Result<Option<Vec<u8>>> {
    match stream_bytes(ctx, id) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if is_unsupported(&e) => {
            log::warn!("page {}: {}, content left unchanged", page_nr, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Look up or build the form XObject for the current page geometry
fn form_for_page(ctx: &mut Context, page_nr: usize, wm: &mut Watermark) -> Result<ObjectId> {
    wm.calc_bounding_box(page_nr);
    let key = FormKey::from(&wm.bb);
    let donor_count = wm.donor_pages.len();

    if wm.cached_form() || page_nr > donor_count {
        if let Some(&id) = wm.form_cache.get(&key) {
            return Ok(id);
        }
    }

    let content = form_content(page_nr, wm)?;
    let resources = form_resources(ctx, page_nr, wm)?;
    let ocg = wm
        .ocg
        .ok_or_else(|| Error::General("optional content group missing from session".to_string()))?;

    let mut dict = Dictionary::new();
    dict.set("Type", name("XObject"));
    dict.set("Subtype", name("Form"));
    dict.set("BBox", wm.bb.to_object());
    dict.set("Matrix", Object::Array([1, 0, 0, 1, 0, 0].iter().map(|&v| Object::Integer(v)).collect()));
    dict.set("OC", Object::Reference(ocg));
    dict.set("Resources", Object::Reference(resources));

    let form = Stream {
        dict,
        content,
        allows_compression: true,
        start_position: None,
    };
    let id = ctx.table.allocate(Object::Stream(form));

    if wm.cached_form() || page_nr >= donor_count {
        wm.form_cache.insert(key, id);
    }
    Ok(id)
}

fn form_content(page_nr: usize, wm: &Watermark) -> Result<Vec<u8>> {
    let (bbw, bbh) = (wm.bb.width(), wm.bb.height());

    match &wm.overlay {
        Overlay::Pdf { .. } => {
            let donor = wm
                .donor_pages
                .get(&wm.donor_page_nr(page_nr))
                .ok_or(Error::NoContent(page_nr))?;
            let sc = if wm.scale_abs { wm.scale } else { bbw / donor.width };
            let mut out = format!("{:.6} 0 0 {:.6} 0 0 cm ", sc, sc).into_bytes();
            out.extend_from_slice(&donor.content);
            Ok(out)
        }
        Overlay::Image { .. } => Ok(format!("q {:.6} 0 0 {:.6} 0 0 cm /Im0 Do Q", bbw, bbh).into_bytes()),
        Overlay::Text(text) => {
            let size = wm.scaled_font_size;
            // 12 point text sits 9.47 points above its box
            let dy = -(size as f64) / 12.0 * 9.47;

            let mut out = format!(
                "0 g 0 G 0 i 0 J []0 d 0 j 1 w 10 M 0 Tc 0 Tw 100 Tz 0 TL {} Tr 0 Ts ",
                text.render_mode as i32
            )
            .into_bytes();

            // Bottom line first
            for (j, line) in text.lines.iter().rev().enumerate() {
                let sw = wm.metrics().text_width(&text.font_name, line, size as f64);
                let dx = bbw / 2.0 - sw / 2.0;
                out.extend(
                    format!(
                        "BT /{} {} Tf {:.6} {:.6} {:.6} rg {:.6} {:.6} Td (",
                        text.font_name,
                        size,
                        text.color.r,
                        text.color.g,
                        text.color.b,
                        dx,
                        dy + ((j + 1) as i64 * size) as f64
                    )
                    .into_bytes(),
                );
                out.extend(escape_literal(&encode_win_ansi(line)));
                out.extend_from_slice(b") Tj ET ");
            }
            Ok(out)
        }
    }
}

fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Resource dictionary of a form: the donor page's resources for PDF
/// overlays, a fresh dictionary for images and text
fn form_resources(ctx: &mut Context, page_nr: usize, wm: &Watermark) -> Result<ObjectId> {
    let missing = |what: &str| Error::General(format!("{} missing from session", what));

    let mut d = Dictionary::new();
    match &wm.overlay {
        Overlay::Pdf { .. } => {
            return wm
                .donor_pages
                .get(&wm.donor_page_nr(page_nr))
                .map(|p| p.resources)
                .ok_or(Error::NoContent(page_nr));
        }
        Overlay::Image { .. } => {
            let image = wm.image.ok_or_else(|| missing("image"))?;
            let mut xobjects = Dictionary::new();
            xobjects.set("Im0", Object::Reference(image));
            d.set("ProcSet", name_array(&["PDF", "ImageC"]));
            d.set("XObject", Object::Dictionary(xobjects));
        }
        Overlay::Text(text) => {
            let font = wm.font.ok_or_else(|| missing("font"))?;
            let mut fonts = Dictionary::new();
            fonts.set(text.font_name.as_str(), Object::Reference(font));
            d.set("Font", Object::Dictionary(fonts));
            d.set("ProcSet", name_array(&["PDF", "Text"]));
        }
    }
    Ok(ctx.table.allocate(Object::Dictionary(d)))
}

/// Remove overlays from the selected pages (all pages if `pages` is empty).
///
/// Fails with `NoWatermarkFound` if the catalog lists no Watermark or
/// Background group, or if no selected page carried an overlay. Graphics
/// states and forms that end up unreferenced are freed.
pub fn remove_watermarks(ctx: &mut Context, pages: &[usize]) -> Result<BatchReport> {
    if !has_watermark_ocg(ctx)? {
        return Err(Error::NoWatermarkFound);
    }
    let pages = selected_pages(ctx.pages()?, pages);

    let mut report = BatchReport::default();
    let mut orphans = Vec::new();
    for page in &pages {
        let outcome = remove_page_watermark(ctx, page, &mut orphans);
        report.record(page.number, outcome);
    }

    if report.succeeded.is_empty() && report.failed.is_empty() {
        return Err(Error::NoWatermarkFound);
    }
    free_orphans(ctx, orphans);

    log::info!("removed overlays from {} pages", report.succeeded.len());
    Ok(report)
}

/// Strip overlay blocks from the first and last content stream of a page
/// and drop the resource names they used. Returns whether anything was removed.
fn remove_page_watermark(ctx: &mut Context, page: &PageEntry, orphans: &mut Vec<ObjectId>) -> Result<bool> {
    let page_nr = page.number;
    let streams = first_and_last(content_streams(ctx, page.id)?);

    let mut ext_gstates = Vec::new();
    let mut forms = Vec::new();
    let mut found = false;

    for id in streams {
        let Some(bytes) = decodable(ctx, id, page_nr)? else { continue };
        if let Some(removal) = remove_markers(&bytes) {
            write_stream(ctx, id, removal.content)?;
            ext_gstates.extend(removal.ext_gstates);
            forms.extend(removal.forms);
            found = true;
        }
    }

    if found {
        if let Some(r) = page.attrs.resources {
            remove_resource_names(ctx, r, b"ExtGState", &ext_gstates, orphans)?;
            remove_resource_names(ctx, r, b"XObject", &forms, orphans)?;
        }
        log::debug!("page {}: removed overlay ({:?}, {:?})", page_nr, ext_gstates, forms);
    }
    Ok(found)
}

/// Delete `names` from one resource category, dropping the category once it is empty
fn remove_resource_names(
    ctx: &mut Context,
    r: ResourcesRef,
    category: &[u8],
    names: &[String],
    orphans: &mut Vec<ObjectId>,
) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }

    let indirect = match ctx.resources(r)?.get(category) {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => return Ok(()),
    };

    let sub = match indirect {
        Some(id) => dict_mut(ctx.table.resolve_mut(id)?),
        None => match ctx.resources_mut(r)?.get_mut(category) {
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        },
    };
    let Some(sub) = sub else { return Ok(()) };

    for key in names {
        if let Some(Object::Reference(id)) = sub.remove(key.as_bytes()) {
            orphans.push(id);
        }
    }

    if sub.len() == 0 {
        ctx.resources_mut(r)?.remove(category);
        if let Some(id) = indirect {
            orphans.push(id);
        }
    }
    Ok(())
}

/// Free every candidate no in-use object refers to any more, following what freed objects held.
///
/// Reference counts are taken once for the whole table and decremented as objects go.
fn free_orphans(ctx: &mut Context, candidates: Vec<ObjectId>) {
    if candidates.is_empty() {
        return;
    }
    let mut pending: Vec<ObjectNumber> = candidates.into_iter().map(|id| id.0).collect();
    pending.sort_unstable();
    pending.dedup();

    let mut counts = ctx.table.reference_counts();
    let mut children = Vec::new();
    let mut freed = 0;
    while let Some(number) = pending.pop() {
        if number == ctx.root.0 || ctx.info.map(|id| id.0) == Some(number) {
            continue;
        }
        if counts.get(&number).is_some_and(|&n| n > 0) {
            continue;
        }
        let Some(object) = ctx.table.entry(number).and_then(|e| e.object()) else { continue };
        children.clear();
        collect_references(object, &mut children);
        if ctx.table.free(number).is_err() {
            continue;
        }
        freed += 1;

        for child in &children {
            if child.0 == number {
                continue;
            }
            if let Some(n) = counts.get_mut(&child.0) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    pending.push(child.0);
                }
            }
        }
    }
    if freed > 0 {
        log::debug!("freed {} unreferenced objects", freed);
    }
}

/// True if the document carries a Watermark/Background group and at least
/// one page holds an overlay block
pub fn detect_watermarks(ctx: &Context) -> Result<bool> {
    if !has_watermark_ocg(ctx)? {
        return Ok(false);
    }

    for page in ctx.pages()? {
        for id in first_and_last(content_streams(ctx, page.id)?) {
            match stream_bytes(ctx, id) {
                Ok(bytes) if has_marker(&bytes) => return Ok(true),
                Ok(_) => {}
                Err(e) if is_unsupported(&e) => {
                    log::debug!("page {}: {}, not inspected", page.number, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(false)
}

/// Content stream ids of a page in drawing order
fn content_streams(ctx: &Context, page_id: ObjectId) -> Result<Vec<ObjectId>> {
    let page = ctx.table.dereference_dict(ctx.table.resolve(page_id)?)?;

    let array = match page.get(b"Contents") {
        Err(_) | Ok(Object::Null) => return Ok(Vec::new()),
        Ok(Object::Reference(id)) => match ctx.table.resolve(*id)? {
            Object::Stream(_) => return Ok(vec![*id]),
            Object::Array(arr) => arr,
            other => {
                return Err(Error::General(format!(
                    "page object {}: contents is a {}",
                    page_id.0,
                    kind(other)
                )))
            }
        },
        Ok(Object::Array(arr)) => arr,
        Ok(other) => {
            return Err(Error::General(format!(
                "page object {}: contents is a {}",
                page_id.0,
                kind(other)
            )))
        }
    };

    array
        .iter()
        .filter(|o| !matches!(o, Object::Null))
        .map(|o| match o {
            Object::Reference(id) => Ok(*id),
            other => Err(Error::General(format!(
                "page object {}: direct {} in contents array",
                page_id.0,
                kind(other)
            ))),
        })
        .collect()
}

fn first_and_last(streams: Vec<ObjectId>) -> Vec<ObjectId> {
    match streams.as_slice() {
        [] => Vec::new(),
        [only] => vec![*only],
        [first, .., last] => vec![*first, *last],
    }
}

fn stream_bytes(ctx: &Context, id: ObjectId) -> Result<Vec<u8>> {
    match ctx.table.resolve(id)? {
        Object::Stream(s) => decode_stream(s),
        other => Err(Error::General(format!("object {} is a {}, expected a stream", id.0, kind(other)))),
    }
}

fn write_stream(ctx: &mut Context, id: ObjectId, data: Vec<u8>) -> Result<()> {
    match ctx.table.resolve_mut(id)? {
        Object::Stream(s) => encode_stream(s, data),
        other => Err(Error::General(format!("object {} is a {}, expected a stream", id.0, kind(other)))),
    }
}

fn page_dict_mut(ctx: &mut Context, id: ObjectId) -> Result<&mut Dictionary> {
    dict_mut(ctx.table.resolve_mut(id)?)
        .ok_or_else(|| Error::General(format!("page object {} is not a dictionary", id.0)))
}

/// Load `input`, apply `wm` to the selected pages and write `output`
pub fn add_watermarks_to_file(
    input: &Path,
    output: &Path,
    pages: &[usize],
    wm: &mut Watermark,
) -> Result<BatchReport> {
    let mut ctx = load_context(input)?;
    wm.reset_session();
    let report = add_watermarks(&mut ctx, pages, wm)?;
    save_context(ctx, output)?;
    Ok(report)
}

/// Load `input`, remove overlays from the selected pages and write `output`
pub fn remove_watermarks_from_file(input: &Path, output: &Path, pages: &[usize]) -> Result<BatchReport> {
    let mut ctx = load_context(input)?;
    let report = remove_watermarks(&mut ctx, pages)?;
    save_context(ctx, output)?;
    Ok(report)
}

/// Check a file for overlays
pub fn has_watermarks(path: &Path) -> Result<bool> {
    let ctx = load_context(path)?;
    detect_watermarks(&ctx)
}
