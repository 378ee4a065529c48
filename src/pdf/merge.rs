//! Whole-document merging

use std::collections::BTreeMap;
use std::path::PathBuf;
use lopdf::{Object, ObjectId};
use crate::context::{load_context, save_context, Context};
use crate::error::{Error, Result};
use crate::object::{dict_mut, dict_ref, integer};
use crate::pdf::migrate::patch_object;
use crate::xref::{IntSet, ObjectMap, ObjectNumber, XRefEntry};

/// Options for merging PDFs
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Input PDF file paths in the order they should be merged
    pub input_paths: Vec<PathBuf>,
    /// Output PDF file path
    pub output_path: PathBuf,
}

/// Merge multiple PDF files into a single PDF
///
/// Every input after the first is merged into the first one, so the first
/// document's catalog, info dictionary and page tree root survive.
///
/// # Example
///
/// ```no_run
/// use pdf_splice::pdf::{MergeOptions, merge_pdfs};
/// use std::path::PathBuf;
///
/// let options = MergeOptions {
///     input_paths: vec![
///         PathBuf::from("1. first.pdf"),
///         PathBuf::from("2. second.pdf"),
///     ],
///     output_path: PathBuf::from("merged.pdf"),
/// };
///
/// merge_pdfs(&options).expect("Failed to merge");
/// ```
pub fn merge_pdfs(options: &MergeOptions) -> Result<()> {
    if options.input_paths.is_empty() {
        return Err(Error::General("No input files provided".to_string()));
    }

    // Validate all input files exist
    for path in &options.input_paths {
        if !path.exists() {
            return Err(Error::FileNotFound(path.clone()));
        }
    }

    let mut dest: Option<Context> = None;
    for path in &options.input_paths {
        let ctx = load_context(path)?;

        // Validate document has pages
        if ctx.page_count == 0 {
            return Err(Error::EmptyPdf(path.clone()));
        }

        match dest.as_mut() {
            None => dest = Some(ctx),
            Some(d) => {
                merge(ctx, d)?;
                log::info!("merged {} ({} pages so far)", path.display(), d.page_count);
            }
        }
    }

    match dest {
        Some(ctx) => save_context(ctx, &options.output_path),
        None => Err(Error::General("No input files provided".to_string())),
    }
}

/// Merge `source` entirely into `dest` and return the rename table that was
/// applied to `source`'s object numbers.
///
/// Source objects are renumbered into the contiguous range starting at
/// `dest`'s size, source's page tree root is appended under dest's, and
/// source's catalog and info dictionary are freed in `dest`. Free slots of
/// `source` keep their chain and are linked into `dest`'s free list. Objects reachable
/// only from the freed info dictionary are left behind unreferenced.
///
/// There is no rollback: if this fails after the page trees were spliced,
/// `dest` is left partially merged.
pub fn merge(mut source: Context, dest: &mut Context) -> Result<ObjectMap> {
    source.pages_root()?;
    dest.pages_root()?;

    let numbers = source.table.object_numbers();
    let base = dest.table.size();
    let rename: ObjectMap = numbers
        .iter()
        .enumerate()
        .map(|(i, &n)| (n, base + i as u32))
        .collect();
    log::debug!(
        "merge: renaming {} source objects into {}..{}",
        rename.len(),
        base,
        base + rename.len() as u32
    );

    renumber(&mut source, &rename);
    splice_page_trees(&mut source, dest)?;

    // Source's free slots go in front of dest's free list
    let source_free = source.table.free_list_head();
    let mut entries = source.table.take_entries();
    if source_free != 0 {
        link_free_list(&mut entries, source_free, dest.table.free_list_head());
    }
    for (number, entry) in entries {
        if number == 0 {
            continue;
        }
        dest.table.insert(number, entry);
    }
    if source_free != 0 {
        dest.table.set_free_list_head(source_free);
    }
    dest.table.ensure_size(base + rename.len() as u32);

    dest.table.free(source.root.0)?;
    if let Some(info) = source.info {
        dest.table.free(info.0)?;
    }

    dest.duplicate_info_objects.extend(&source.duplicate_info_objects);
    dest.linearization_objects.extend(&source.linearization_objects);
    dest.xref_streams.extend(&source.xref_streams);
    dest.object_streams.extend(&source.object_streams);

    log::info!(
        "merge: {} objects appended, destination now has {} pages",
        rename.len(),
        dest.page_count
    );
    Ok(rename)
}

fn rename_id(id: ObjectId, rename: &ObjectMap) -> Option<ObjectId> {
    rename.get(&id.0).map(|&n| (n, id.1))
}

fn rename_set(set: &IntSet, rename: &ObjectMap) -> IntSet {
    set.iter().filter_map(|n| rename.get(n)).copied().collect()
}

/// Move every entry of `ctx` to its renamed number and rewrite all references
fn renumber(ctx: &mut Context, rename: &ObjectMap) {
    if let Some(root) = rename_id(ctx.root, rename) {
        ctx.root = root;
    }
    ctx.info = match ctx.info {
        Some(info) => {
            let renamed = rename_id(info, rename);
            if renamed.is_none() {
                log::warn!("info dictionary {} is not in the table, dropping it", info.0);
            }
            renamed
        }
        None => None,
    };

    let old = ctx.table.take_entries();
    let mut entries = BTreeMap::new();

    for (number, mut entry) in old {
        match &mut entry {
            XRefEntry::Free { next, .. } => {
                // 0 terminates the free list
                if *next != 0 {
                    *next = rename.get(&*next).copied().unwrap_or(0);
                }
            }
            XRefEntry::InUse { object, .. } => patch_object(object, rename),
        }

        if number == 0 {
            entries.insert(0, entry);
        } else if let Some(&new) = rename.get(&number) {
            entries.insert(new, entry);
        }
    }
    ctx.table.replace_entries(entries);
    if let Some(&highest) = rename.values().next_back() {
        ctx.table.ensure_size(highest + 1);
    }

    ctx.duplicate_info_objects = rename_set(&ctx.duplicate_info_objects, rename);
    ctx.linearization_objects = rename_set(&ctx.linearization_objects, rename);
    ctx.xref_streams = rename_set(&ctx.xref_streams, rename);
    ctx.object_streams = rename_set(&ctx.object_streams, rename);
}

/// Point the last entry of the free list starting at `head` to `tail`
fn link_free_list(entries: &mut BTreeMap<ObjectNumber, XRefEntry>, head: ObjectNumber, tail: ObjectNumber) {
    let mut current = head;
    for _ in 0..entries.len() {
        match entries.get_mut(&current) {
            Some(XRefEntry::Free { next, .. }) if *next == 0 => {
                *next = tail;
                return;
            }
            Some(XRefEntry::Free { next, .. }) => current = *next,
            _ => break,
        }
    }
    log::warn!("free list of merged document is broken at object {}", current);
}

/// Hang source's page tree root under dest's and update the page counts
fn splice_page_trees(source: &mut Context, dest: &mut Context) -> Result<()> {
    let source_pages = source.pages_root()?;
    let dest_pages = dest.pages_root()?;

    let source_count = source
        .table
        .resolve(source_pages)
        .ok()
        .and_then(dict_ref)
        .and_then(|d| d.get(b"Count").ok())
        .and_then(integer)
        .unwrap_or(0);

    let node = dict_mut(source.table.resolve_mut(source_pages)?).ok_or(Error::MissingPageTree)?;
    node.set("Parent", Object::Reference(dest_pages));

    dest.append_to_page_tree(source_pages, source_count)?;
    dest.page_count += source.page_count;
    Ok(())
}
