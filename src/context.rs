//! Document context: one PDF's object table and document-level anchors

use std::path::Path;
use chrono::Local;
use lopdf::{Dictionary, Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::layout::Rectangle;
use crate::object::{dict_mut, dict_ref, dict_type, integer, literal, name};
use crate::xref::{IntSet, ObjectNumber, XRefEntry, XRefTable};

/// Where a page's effective resource dictionary lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcesRef {
    /// Inline dictionary stored under `/Resources` of the given page tree node
    Inline(ObjectId),
    /// Indirect resource dictionary object
    Indirect(ObjectId),
}

/// Attributes a page inherits from its ancestors in the page tree
#[derive(Debug, Clone, Default)]
pub struct InheritedPageAttrs {
    pub resources: Option<ResourcesRef>,
    pub media_box: Option<Rectangle>,
    pub crop_box: Option<Rectangle>,
    pub rotate: i64,
}

/// One leaf of the page tree
#[derive(Debug, Clone)]
pub struct PageEntry {
    /// 1-based page number in document order
    pub number: usize,
    pub id: ObjectId,
    pub attrs: InheritedPageAttrs,
}

impl PageEntry {
    /// Visible region: CropBox if present, else MediaBox, else US Letter
    pub fn viewport(&self) -> Rectangle {
        self.attrs
            .crop_box
            .or(self.attrs.media_box)
            .unwrap_or_else(|| Rectangle::for_dim(612.0, 792.0))
    }
}

/// A document's complete in-memory state
#[derive(Debug, Clone)]
pub struct Context {
    pub table: XRefTable,
    /// Catalog
    pub root: ObjectId,
    /// Document information dictionary
    pub info: Option<ObjectId>,
    pub page_count: usize,
    pub version: String,

    // Housekeeping sets, reconciled on merge and skipped on write
    pub duplicate_info_objects: IntSet,
    pub linearization_objects: IntSet,
    pub xref_streams: IntSet,
    pub object_streams: IntSet,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A document with an empty page tree
    pub fn new() -> Self {
        let mut table = XRefTable::new();

        let mut pages = Dictionary::new();
        pages.set("Type", name("Pages"));
        pages.set("Kids", Object::Array(Vec::new()));
        pages.set("Count", Object::Integer(0));
        let pages_id = table.allocate(Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", name("Catalog"));
        catalog.set("Pages", Object::Reference(pages_id));
        let root = table.allocate(Object::Dictionary(catalog));

        Self {
            table,
            root,
            info: None,
            page_count: 0,
            version: "1.7".to_string(),
            duplicate_info_objects: IntSet::new(),
            linearization_objects: IntSet::new(),
            xref_streams: IntSet::new(),
            object_streams: IntSet::new(),
        }
    }

    /// Build a context from a document parsed by lopdf
    pub fn from_document(doc: Document) -> Result<Self> {
        let root = match doc.trailer.get(b"Root") {
            Ok(Object::Reference(id)) => *id,
            _ => return Err(Error::General("trailer has no Root reference".to_string())),
        };
        let info = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };

        let mut table = XRefTable::new();
        let mut linearization_objects = IntSet::new();
        let mut xref_streams = IntSet::new();
        let mut object_streams = IntSet::new();

        for ((number, generation), object) in doc.objects {
            if number == 0 {
                continue;
            }
            match &object {
                Object::Stream(s) => match dict_type(&s.dict) {
                    Some(b"XRef") => {
                        xref_streams.insert(number);
                    }
                    Some(b"ObjStm") => {
                        object_streams.insert(number);
                    }
                    _ => {}
                },
                Object::Dictionary(d) if d.has(b"Linearized") => {
                    linearization_objects.insert(number);
                }
                _ => {}
            }
            table.insert(number, XRefEntry::in_use(object, generation));
        }
        table.ensure_size(doc.max_id + 1);

        let mut ctx = Self {
            table,
            root,
            info,
            page_count: 0,
            version: doc.version,
            duplicate_info_objects: IntSet::new(),
            linearization_objects,
            xref_streams,
            object_streams,
        };

        let pages_id = ctx.pages_root()?;
        let count = ctx
            .table
            .resolve(pages_id)
            .ok()
            .and_then(dict_ref)
            .and_then(|d| d.get(b"Count").ok())
            .and_then(integer)
            .unwrap_or(0);
        ctx.page_count = count.max(0) as usize;

        log::debug!(
            "loaded context: {} entries, size {}, {} pages",
            ctx.table.len(),
            ctx.table.size(),
            ctx.page_count
        );
        Ok(ctx)
    }

    /// Convert back into a lopdf document for writing.
    ///
    /// Housekeeping objects are left out, the writer regenerates them.
    pub fn into_document(self) -> Document {
        let mut doc = Document::with_version(self.version.as_str());
        let skip = |n: &ObjectNumber| {
            self.xref_streams.contains(n)
                || self.object_streams.contains(n)
                || self.linearization_objects.contains(n)
                || self.duplicate_info_objects.contains(n)
        };

        for (&number, entry) in self.table.entries() {
            if number == 0 || skip(&number) {
                continue;
            }
            if let XRefEntry::InUse { object, generation, .. } = entry {
                doc.objects.insert((number, *generation), object.clone());
            }
        }

        doc.max_id = self.table.size().saturating_sub(1);
        doc.trailer.set("Root", Object::Reference(self.root));
        if let Some(info) = self.info {
            doc.trailer.set("Info", Object::Reference(info));
        }
        doc
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        let obj = self.table.resolve(self.root)?;
        dict_ref(obj).ok_or_else(|| Error::General("catalog is not a dictionary".to_string()))
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let obj = self.table.resolve_mut(self.root)?;
        dict_mut(obj).ok_or_else(|| Error::General("catalog is not a dictionary".to_string()))
    }

    /// Id of the page tree root; `MissingPageTree` if it does not resolve to a dictionary
    pub fn pages_root(&self) -> Result<ObjectId> {
        let catalog = self.catalog().map_err(|_| Error::MissingPageTree)?;
        let id = match catalog.get(b"Pages") {
            Ok(Object::Reference(id)) => *id,
            _ => return Err(Error::MissingPageTree),
        };
        match self.table.resolve(id) {
            Ok(Object::Dictionary(_)) => Ok(id),
            _ => Err(Error::MissingPageTree),
        }
    }

    /// Append `kid` to the page tree root's `Kids` and add `count` to its `Count`
    pub fn append_to_page_tree(&mut self, kid: ObjectId, count: i64) -> Result<()> {
        let root = self.pages_root()?;
        let node = dict_mut(self.table.resolve_mut(root)?).ok_or(Error::MissingPageTree)?;

        let current = node.get(b"Count").ok().and_then(integer).unwrap_or(0);
        node.set("Count", Object::Integer(current + count));

        let kids_id = match node.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => {
                kids.push(Object::Reference(kid));
                return Ok(());
            }
            Ok(Object::Reference(id)) => *id,
            _ => {
                node.set("Kids", Object::Array(vec![Object::Reference(kid)]));
                return Ok(());
            }
        };

        match self.table.resolve_mut(kids_id)? {
            Object::Array(kids) => {
                kids.push(Object::Reference(kid));
                Ok(())
            }
            _ => Err(Error::MissingPageTree),
        }
    }

    /// All leaf pages in document order with their inherited attributes
    pub fn pages(&self) -> Result<Vec<PageEntry>> {
        let root = self.pages_root()?;
        let mut visited = IntSet::new();
        let mut out = Vec::new();
        self.collect_pages(root, &InheritedPageAttrs::default(), &mut visited, &mut out)?;
        Ok(out)
    }

    /// Page `number` (1-based)
    pub fn page(&self, number: usize) -> Result<PageEntry> {
        if number == 0 {
            return Err(Error::InvalidPageNumber(number));
        }
        self.pages()?
            .into_iter()
            .nth(number - 1)
            .ok_or(Error::InvalidPageNumber(number))
    }

    fn collect_pages(
        &self,
        id: ObjectId,
        inherited: &InheritedPageAttrs,
        visited: &mut IntSet,
        out: &mut Vec<PageEntry>,
    ) -> Result<()> {
        if !visited.insert(id.0) {
            log::warn!("page tree cycle at object {}", id.0);
            return Ok(());
        }

        let node = self.table.dereference_dict(self.table.resolve(id)?)?;
        let mut attrs = inherited.clone();

        match node.get(b"Resources") {
            Ok(Object::Reference(r)) => attrs.resources = Some(ResourcesRef::Indirect(*r)),
            Ok(Object::Dictionary(_)) => attrs.resources = Some(ResourcesRef::Inline(id)),
            _ => {}
        }
        if let Some(r) = self.rectangle(node, b"MediaBox") {
            attrs.media_box = Some(r);
        }
        if let Some(r) = self.rectangle(node, b"CropBox") {
            attrs.crop_box = Some(r);
        }
        if let Some(rot) = node
            .get(b"Rotate")
            .ok()
            .and_then(|o| self.table.dereference(o).ok())
            .and_then(integer)
        {
            attrs.rotate = rot;
        }

        match node.get(b"Kids") {
            Ok(kids) if dict_type(node) != Some(&b"Page"[..]) => {
                let kids = match self.table.dereference(kids)? {
                    Object::Array(arr) => arr,
                    _ => return Ok(()),
                };
                for kid in kids {
                    if let Object::Reference(kid_id) = kid {
                        self.collect_pages(*kid_id, &attrs, visited, out)?;
                    }
                }
            }
            _ => out.push(PageEntry {
                number: out.len() + 1,
                id,
                attrs,
            }),
        }
        Ok(())
    }

    fn rectangle(&self, dict: &Dictionary, key: &[u8]) -> Option<Rectangle> {
        let obj = self.table.dereference(dict.get(key).ok()?).ok()?;
        match obj {
            Object::Array(arr) => Rectangle::from_array(arr),
            _ => None,
        }
    }

    /// Read-only view of a page's effective resource dictionary
    pub fn resources(&self, r: ResourcesRef) -> Result<&Dictionary> {
        match r {
            ResourcesRef::Inline(holder) => {
                let node = self.table.dereference_dict(self.table.resolve(holder)?)?;
                match node.get(b"Resources") {
                    Ok(Object::Dictionary(d)) => Ok(d),
                    _ => Err(Error::General(format!("object {} lost its resources", holder.0))),
                }
            }
            ResourcesRef::Indirect(id) => self.table.dereference_dict(self.table.resolve(id)?),
        }
    }

    /// Mutable view of a page's effective resource dictionary
    pub fn resources_mut(&mut self, r: ResourcesRef) -> Result<&mut Dictionary> {
        let (id, inline) = match r {
            ResourcesRef::Inline(holder) => (holder, true),
            ResourcesRef::Indirect(id) => (id, false),
        };
        let dict = dict_mut(self.table.resolve_mut(id)?)
            .ok_or_else(|| Error::General(format!("object {} is not a dictionary", id.0)))?;
        if !inline {
            return Ok(dict);
        }
        match dict.get_mut(b"Resources") {
            Ok(Object::Dictionary(d)) => Ok(d),
            _ => Err(Error::General(format!("object {} lost its resources", id.0))),
        }
    }

    /// Give a page its own inline resource dictionary and return it.
    ///
    /// Inherited or shared resources are copied, and indirect `ExtGState`/`XObject`
    /// sub-dictionaries are inlined, so that adding names never leaks into other pages.
    pub fn page_resources_mut(&mut self, page: &PageEntry) -> Result<&mut Dictionary> {
        let mut res = match page.attrs.resources {
            Some(ResourcesRef::Inline(holder)) if holder == page.id => None,
            Some(r) => Some(self.resources(r)?.clone()),
            None => Some(Dictionary::new()),
        };

        if let Some(res) = res.as_mut() {
            for key in [&b"ExtGState"[..], &b"XObject"[..]] {
                let sub = match res.get(key) {
                    Ok(Object::Reference(id)) => self.table.dereference_dict(self.table.resolve(*id)?)?.clone(),
                    _ => continue,
                };
                res.set(key.to_vec(), Object::Dictionary(sub));
            }
        }

        let page_dict = dict_mut(self.table.resolve_mut(page.id)?)
            .ok_or_else(|| Error::General(format!("page object {} is not a dictionary", page.id.0)))?;
        if let Some(res) = res {
            page_dict.set("Resources", Object::Dictionary(res));
        }
        match page_dict.get_mut(b"Resources") {
            Ok(Object::Dictionary(d)) => Ok(d),
            _ => Err(Error::General(format!("page object {} has no resources", page.id.0))),
        }
    }

    /// Document information dictionary, if present and resolvable
    pub fn info_dict(&self) -> Option<&Dictionary> {
        self.info
            .and_then(|id| self.table.resolve(id).ok())
            .and_then(dict_ref)
    }

    /// Stamp `/ModDate` into the information dictionary
    pub fn touch_mod_date(&mut self) {
        let Some(id) = self.info else { return };
        let now = Local::now();
        let offset = now.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        let stamp = format!(
            "{}{}{:02}'{:02}'",
            now.format("D:%Y%m%d%H%M%S"),
            sign,
            offset / 3600,
            (offset % 3600) / 60
        );
        if let Some(info) = self.table.resolve_mut(id).ok().and_then(dict_mut) {
            info.set("ModDate", literal(&stamp));
        }
    }
}

/// Load a PDF file into a context
pub fn load_context(path: &Path) -> Result<Context> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let doc = Document::load(path)?;
    Context::from_document(doc)
}

/// Write a context to a PDF file, compressing unfiltered streams
pub fn save_context(mut ctx: Context, path: &Path) -> Result<()> {
    ctx.touch_mod_date();
    let mut doc = ctx.into_document();
    doc.compress();
    doc.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_tree() -> Context {
        let mut ctx = Context::new();
        let pages_id = ctx.pages_root().unwrap();

        let mut font = Dictionary::new();
        font.set("F1", Object::Null);
        let mut res = Dictionary::new();
        res.set("Font", Object::Dictionary(font));

        let mut inner = Dictionary::new();
        inner.set("Type", name("Pages"));
        inner.set("Parent", Object::Reference(pages_id));
        inner.set("Resources", Object::Dictionary(res));
        inner.set("Rotate", Object::Integer(90));
        let inner_id = ctx.table.allocate(Object::Dictionary(inner));

        let mut kids = Vec::new();
        for _ in 0..2 {
            let mut page = Dictionary::new();
            page.set("Type", name("Page"));
            page.set("Parent", Object::Reference(inner_id));
            kids.push(Object::Reference(ctx.table.allocate(Object::Dictionary(page))));
        }
        if let Ok(Object::Dictionary(d)) = ctx.table.resolve_mut(inner_id) {
            d.set("Kids", Object::Array(kids));
            d.set("Count", Object::Integer(2));
        }

        let mut leaf = Dictionary::new();
        leaf.set("Type", name("Page"));
        leaf.set("Parent", Object::Reference(pages_id));
        leaf.set("MediaBox", Rectangle::for_dim(595.0, 842.0).to_object());
        let leaf_id = ctx.table.allocate(Object::Dictionary(leaf));

        if let Ok(Object::Dictionary(d)) = ctx.table.resolve_mut(pages_id) {
            d.set("Kids", Object::Array(vec![Object::Reference(inner_id), Object::Reference(leaf_id)]));
            d.set("Count", Object::Integer(3));
            d.set("MediaBox", Rectangle::for_dim(612.0, 792.0).to_object());
        }
        ctx.page_count = 3;
        ctx
    }

    #[test]
    fn test_new_context_has_empty_page_tree() {
        let ctx = Context::new();
        assert!(ctx.pages_root().is_ok());
        assert!(ctx.pages().unwrap().is_empty());
        assert_eq!(ctx.table.size(), 3);
    }

    #[test]
    fn test_pages_inherit_attributes() {
        let ctx = two_level_tree();
        let pages = ctx.pages().unwrap();
        assert_eq!(pages.len(), 3);

        assert_eq!(pages[0].attrs.rotate, 90);
        assert!(matches!(pages[0].attrs.resources, Some(ResourcesRef::Inline(_))));
        assert_eq!(pages[0].viewport(), Rectangle::for_dim(612.0, 792.0));

        assert_eq!(pages[2].number, 3);
        assert_eq!(pages[2].attrs.rotate, 0);
        assert!(pages[2].attrs.resources.is_none());
        assert_eq!(pages[2].viewport(), Rectangle::for_dim(595.0, 842.0));
    }

    #[test]
    fn test_page_out_of_range() {
        let ctx = two_level_tree();
        assert!(matches!(ctx.page(0), Err(Error::InvalidPageNumber(0))));
        assert!(matches!(ctx.page(4), Err(Error::InvalidPageNumber(4))));
        assert!(ctx.page(3).is_ok());
    }

    #[test]
    fn test_page_resources_mut_copies_inherited() {
        let mut ctx = two_level_tree();
        let page = ctx.page(1).unwrap();
        let res = ctx.page_resources_mut(&page).unwrap();
        res.set("ExtGState", Object::Dictionary(Dictionary::new()));

        // The sibling still sees only the inherited dictionary
        let sibling = ctx.page(2).unwrap();
        let inherited = ctx.resources(sibling.attrs.resources.unwrap()).unwrap();
        assert!(!inherited.has(b"ExtGState"));

        let page = ctx.page(1).unwrap();
        assert_eq!(page.attrs.resources, Some(ResourcesRef::Inline(page.id)));
    }

    #[test]
    fn test_missing_page_tree() {
        let mut ctx = Context::new();
        ctx.catalog_mut().unwrap().remove(b"Pages");
        assert!(matches!(ctx.pages_root(), Err(Error::MissingPageTree)));
    }

    #[test]
    fn test_document_round_trip_skips_housekeeping() {
        let mut ctx = Context::new();
        let mut info = Dictionary::new();
        info.set("Title", literal("Report"));
        ctx.info = Some(ctx.table.allocate(Object::Dictionary(info)));
        let stray = ctx.table.allocate(Object::Integer(7));
        ctx.object_streams.insert(stray.0);

        let doc = ctx.clone().into_document();
        assert!(!doc.objects.contains_key(&stray));
        assert_eq!(doc.max_id, ctx.table.size() - 1);

        let back = Context::from_document(doc).unwrap();
        assert_eq!(back.root, ctx.root);
        assert_eq!(back.info, ctx.info);
        assert_eq!(back.table.size(), ctx.table.size());
    }
}
