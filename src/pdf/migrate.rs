//! Object-subgraph migration between two documents
//!
//! Two independently parsed documents use unrelated object number spaces, so
//! an object copied from one into the other must have every indirect
//! reference it (transitively) holds rewritten into the destination's space.
//! The `migrated` map carries the old -> new numbering across calls of one
//! session so objects shared by several roots are copied at most once.

use lopdf::Object;
use crate::error::Result;
use crate::xref::{IntSet, ObjectMap, XRefEntry, XRefTable};

/// Rewrite every indirect reference inside `object` through `map`.
///
/// References whose number has no mapping become `null`.
pub fn patch_object(object: &mut Object, map: &ObjectMap) {
    match object {
        Object::Reference(id) => {
            let (number, generation) = *id;
            *object = match map.get(&number) {
                Some(&new) => Object::Reference((new, generation)),
                None => {
                    log::debug!("unmapped reference {} {} R replaced by null", number, generation);
                    Object::Null
                }
            };
        }
        Object::Array(arr) => {
            for o in arr.iter_mut() {
                patch_object(o, map);
            }
        }
        Object::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                patch_object(v, map);
            }
        }
        Object::Stream(stream) => {
            for (_, v) in stream.dict.iter_mut() {
                patch_object(v, map);
            }
        }
        _ => {}
    }
}

/// Collect the object numbers reachable from `object` in `source` that have
/// not been migrated yet.
///
/// Numbers outside the table's range are skipped; an in-range reference to a
/// free entry fails with `DanglingReference`.
pub fn identify(source: &XRefTable, object: &Object, migrated: &ObjectMap, out: &mut IntSet) -> Result<()> {
    match object {
        Object::Reference(id) => {
            let number = id.0;
            if number == 0 || number >= source.size() {
                log::debug!("skipping out of range reference {} {} R", id.0, id.1);
                return Ok(());
            }
            if migrated.contains_key(&number) || out.contains(&number) {
                return Ok(());
            }
            let target = source.resolve(*id)?;
            out.insert(number);
            identify(source, target, migrated, out)?;
        }
        Object::Array(arr) => {
            for o in arr {
                identify(source, o, migrated, out)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, v) in dict.iter() {
                identify(source, v, migrated, out)?;
            }
        }
        Object::Stream(stream) => {
            for (_, v) in stream.dict.iter() {
                identify(source, v, migrated, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Copy the closure of `object` from `source` into `dest` under fresh numbers
/// and return `object` with its references rewritten.
///
/// `source` is left untouched.
pub fn migrate(source: &XRefTable, dest: &mut XRefTable, migrated: &mut ObjectMap, object: &Object) -> Result<Object> {
    let mut closure = IntSet::new();
    identify(source, object, migrated, &mut closure)?;

    for &number in &closure {
        let new = dest.reserve();
        migrated.insert(number, new);
    }

    for &number in &closure {
        let (value, generation) = match source.entry(number) {
            Some(XRefEntry::InUse { object, generation, .. }) => (object.clone(), *generation),
            _ => continue,
        };
        let mut value = value;
        patch_object(&mut value, migrated);
        dest.insert(migrated[&number], XRefEntry::in_use(value, generation));
    }

    if !closure.is_empty() {
        log::debug!("migrated {} objects: {:?}", closure.len(), closure);
    }

    let mut top = object.clone();
    patch_object(&mut top, migrated);
    Ok(top)
}
