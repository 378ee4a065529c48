//! Cross-reference table
//!
//! Every document owns one `XRefTable`: an arena of entries indexed by object
//! number. Indirect references are plain `(number, generation)` values that
//! are resolved through the table, so shared and cyclic object graphs need no
//! ownership tricks.
//!
//! Object 0 is always the head of the free list. A free entry stores the
//! number of the next free entry; 0 terminates the list.

use std::collections::{BTreeMap, BTreeSet};
use lopdf::{Dictionary, Object, ObjectId};
use crate::error::{Error, Result};
use crate::object::{collect_references, dict_ref, kind};

/// Object number within one table
pub type ObjectNumber = u32;

/// Set of object numbers
pub type IntSet = BTreeSet<ObjectNumber>;

/// Rename table: old object number -> new object number
pub type ObjectMap = BTreeMap<ObjectNumber, ObjectNumber>;

/// Generation of the free-list head (object 0)
pub const FREE_HEAD_GENERATION: u16 = 65535;

/// Upper bound for reference chains followed by `dereference`
const MAX_REFERENCE_CHAIN: usize = 32;

/// One entry of the cross-reference table
#[derive(Debug, Clone)]
pub enum XRefEntry {
    /// Free slot, linked into the free list
    Free {
        /// Next free object number (0 = end of list)
        next: ObjectNumber,
        generation: u16,
    },
    /// Slot owning an object value
    InUse {
        object: Object,
        generation: u16,
        /// Byte offset in the file the object was read from, if known
        offset: Option<u64>,
    },
}

impl XRefEntry {
    /// An in-use entry without a known file offset
    pub fn in_use(object: Object, generation: u16) -> Self {
        XRefEntry::InUse { object, generation, offset: None }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
        }
    }

    pub fn object(&self) -> Option<&Object> {
        match self {
            XRefEntry::InUse { object, .. } => Some(object),
            XRefEntry::Free { .. } => None,
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut Object> {
        match self {
            XRefEntry::InUse { object, .. } => Some(object),
            XRefEntry::Free { .. } => None,
        }
    }
}

/// Per-document table of indirect objects
#[derive(Debug, Clone)]
pub struct XRefTable {
    entries: BTreeMap<ObjectNumber, XRefEntry>,
    /// One past the highest assigned object number
    size: ObjectNumber,
}

impl Default for XRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XRefTable {
    /// Empty table holding only the free-list head
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(0, XRefEntry::Free { next: 0, generation: FREE_HEAD_GENERATION });
        Self { entries, size: 1 }
    }

    /// Next object number to be assigned
    pub fn size(&self) -> ObjectNumber {
        self.size
    }

    /// Number of entries including the free-list head
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn entry(&self, number: ObjectNumber) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    pub fn entry_mut(&mut self, number: ObjectNumber) -> Option<&mut XRefEntry> {
        self.entries.get_mut(&number)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ObjectNumber, &XRefEntry)> {
        self.entries.iter()
    }

    /// All object numbers except the free-list head
    pub fn object_numbers(&self) -> IntSet {
        self.entries.keys().copied().filter(|&n| n != 0).collect()
    }

    /// Object numbers of in-use entries
    pub fn in_use_numbers(&self) -> IntSet {
        self.entries
            .iter()
            .filter(|(&n, e)| n != 0 && !e.is_free())
            .map(|(&n, _)| n)
            .collect()
    }

    /// Follow one level of indirection.
    ///
    /// Fails with `DanglingReference` when the target entry is free or absent.
    pub fn resolve(&self, id: ObjectId) -> Result<&Object> {
        self.entries
            .get(&id.0)
            .and_then(XRefEntry::object)
            .ok_or(Error::DanglingReference(id.0, id.1))
    }

    /// Mutable variant of `resolve`
    pub fn resolve_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.entries
            .get_mut(&id.0)
            .and_then(XRefEntry::object_mut)
            .ok_or(Error::DanglingReference(id.0, id.1))
    }

    /// Reference to an in-use object number, carrying its generation
    pub fn reference(&self, number: ObjectNumber) -> Result<ObjectId> {
        match self.entries.get(&number) {
            Some(entry) if !entry.is_free() => Ok((number, entry.generation())),
            _ => Err(Error::DanglingReference(number, 0)),
        }
    }

    /// Follow references until a direct object is reached
    pub fn dereference<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                Object::Reference(id) => current = self.resolve(*id)?,
                _ => return Ok(current),
            }
        }
        Err(Error::General("reference chain too long".to_string()))
    }

    /// Dereference an object expected to be a dictionary (or a stream's dictionary)
    pub fn dereference_dict<'a>(&'a self, obj: &'a Object) -> Result<&'a Dictionary> {
        let obj = self.dereference(obj)?;
        dict_ref(obj).ok_or_else(|| Error::General(format!("expected dictionary, found {}", kind(obj))))
    }

    /// Append a new in-use entry at `size` and return its reference
    pub fn allocate(&mut self, object: Object) -> ObjectId {
        let number = self.reserve();
        self.entries.insert(number, XRefEntry::in_use(object, 0));
        (number, 0)
    }

    /// Claim the next object number without filling it yet
    pub fn reserve(&mut self) -> ObjectNumber {
        let number = self.size;
        self.size += 1;
        number
    }

    /// Place an entry at an explicit number, growing `size` to cover it
    pub fn insert(&mut self, number: ObjectNumber, entry: XRefEntry) {
        if number >= self.size {
            self.size = number + 1;
        }
        self.entries.insert(number, entry);
    }

    /// Grow `size` to at least `size` (never shrinks)
    pub(crate) fn ensure_size(&mut self, size: ObjectNumber) {
        self.size = self.size.max(size);
    }

    /// Mark an entry free and link it into the free list headed at object 0
    pub fn free(&mut self, number: ObjectNumber) -> Result<()> {
        if number == 0 {
            return Ok(());
        }

        let head_next = self.free_list_head();

        let entry = self.entries.get_mut(&number).ok_or(Error::DanglingReference(number, 0))?;
        if entry.is_free() {
            return Ok(());
        }

        let generation = entry.generation().saturating_add(1).min(FREE_HEAD_GENERATION);
        *entry = XRefEntry::Free { next: head_next, generation };

        if let Some(XRefEntry::Free { next, .. }) = self.entries.get_mut(&0) {
            *next = number;
        }

        log::debug!("freed object {} (generation now {})", number, generation);
        Ok(())
    }

    /// First free object number (0 if the list is empty)
    pub fn free_list_head(&self) -> ObjectNumber {
        match self.entries.get(&0) {
            Some(XRefEntry::Free { next, .. }) => *next,
            _ => 0,
        }
    }

    /// Point the free-list head (object 0) at `next`
    pub(crate) fn set_free_list_head(&mut self, next: ObjectNumber) {
        if let Some(XRefEntry::Free { next: head, .. }) = self.entries.get_mut(&0) {
            *head = next;
        }
    }

    /// How many references each object number receives from in-use objects.
    ///
    /// Self references are not counted. Objects nobody refers to are absent.
    pub fn reference_counts(&self) -> BTreeMap<ObjectNumber, usize> {
        let mut counts = BTreeMap::new();
        let mut refs = Vec::new();
        for (&n, entry) in &self.entries {
            let Some(obj) = entry.object() else { continue };
            refs.clear();
            collect_references(obj, &mut refs);
            for id in &refs {
                if id.0 != n {
                    *counts.entry(id.0).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub(crate) fn replace_entries(&mut self, entries: BTreeMap<ObjectNumber, XRefEntry>) {
        self.entries = entries;
    }

    /// Move all entries out, leaving only a fresh free-list head
    pub(crate) fn take_entries(&mut self) -> BTreeMap<ObjectNumber, XRefEntry> {
        let fresh = XRefTable::new();
        std::mem::replace(&mut self.entries, fresh.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_uses_size() {
        let mut table = XRefTable::new();
        assert_eq!(table.size(), 1);

        let a = table.allocate(Object::Integer(1));
        let b = table.allocate(Object::Integer(2));

        assert_eq!(a, (1, 0));
        assert_eq!(b, (2, 0));
        assert_eq!(table.size(), 3);
        assert!(matches!(table.resolve(b), Ok(Object::Integer(2))));
    }

    #[test]
    fn test_resolve_absent_is_dangling() {
        let table = XRefTable::new();
        assert!(matches!(table.resolve((5, 0)), Err(Error::DanglingReference(5, 0))));
    }

    #[test]
    fn test_free_links_into_free_list() {
        let mut table = XRefTable::new();
        table.allocate(Object::Null);
        table.allocate(Object::Null);
        table.allocate(Object::Null);

        table.free(2).unwrap();
        table.free(3).unwrap();

        assert_eq!(table.free_list_head(), 3);
        match table.entry(3) {
            Some(XRefEntry::Free { next, generation }) => {
                assert_eq!(*next, 2);
                assert_eq!(*generation, 1);
            }
            other => panic!("expected free entry, got {:?}", other),
        }
        match table.entry(2) {
            Some(XRefEntry::Free { next, .. }) => assert_eq!(*next, 0),
            other => panic!("expected free entry, got {:?}", other),
        }

        assert!(matches!(table.resolve((2, 0)), Err(Error::DanglingReference(2, 0))));
        // Size never shrinks
        assert_eq!(table.size(), 4);
    }

    #[test]
    fn test_free_twice_is_noop() {
        let mut table = XRefTable::new();
        table.allocate(Object::Null);
        table.free(1).unwrap();
        table.free(1).unwrap();
        assert_eq!(table.free_list_head(), 1);
        assert_eq!(table.entry(1).map(XRefEntry::generation), Some(1));
    }

    #[test]
    fn test_dereference_follows_chain() {
        let mut table = XRefTable::new();
        let target = table.allocate(Object::Integer(42));
        let middle = table.allocate(Object::Reference(target));

        let start = Object::Reference(middle);
        assert!(matches!(table.dereference(&start), Ok(Object::Integer(42))));
    }

    #[test]
    fn test_reference_counts() {
        let mut table = XRefTable::new();
        let leaf = table.allocate(Object::Integer(1));
        let orphan = table.allocate(Object::Integer(2));
        table.allocate(Object::Array(vec![Object::Reference(leaf), Object::Reference(leaf)]));
        let holder = table.allocate(Object::Array(vec![Object::Reference(leaf)]));
        let looped = table.reserve();
        table.insert(looped, XRefEntry::in_use(Object::Array(vec![Object::Reference((looped, 0))]), 0));
        table.free(holder.0).unwrap();

        let counts = table.reference_counts();
        assert_eq!(counts.get(&leaf.0), Some(&2));
        assert_eq!(counts.get(&orphan.0), None);
        assert_eq!(counts.get(&looped), None);
    }
}
