//! Helpers over lopdf object values
//!
//! The object variants (null, boolean, integer, real, name, string, array,
//! dictionary, stream, reference) are `lopdf::Object`. These helpers read
//! them without caring whether a number was written as integer or real.

use lopdf::{Dictionary, Object, ObjectId, StringFormat};

/// Read a numeric object as f64 (integers and reals alike)
pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Variant name of an object, for diagnostics
pub fn kind(obj: &Object) -> &'static str {
    match obj {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) => "integer",
        Object::Real(_) => "real",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

/// Read an integer object
pub fn integer(obj: &Object) -> Option<i64> {
    match obj {
        Object::Integer(i) => Some(*i),
        _ => None,
    }
}

/// Compare a name object against the given bytes
pub fn is_name(obj: &Object, name: &[u8]) -> bool {
    matches!(obj, Object::Name(n) if n.as_slice() == name)
}

/// The `/Type` name of a dictionary, if any
pub fn dict_type(dict: &Dictionary) -> Option<&[u8]> {
    match dict.get(b"Type") {
        Ok(Object::Name(n)) => Some(n.as_slice()),
        _ => None,
    }
}

/// Decode a PDF text string (literal or hex) into a Rust string.
///
/// UTF-16BE strings are recognized by their byte order mark, everything else
/// is taken as Latin-1 compatible bytes.
pub fn text_string(obj: &Object) -> Option<String> {
    let bytes = match obj {
        Object::String(bytes, _) => bytes,
        _ => return None,
    };

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    Some(bytes.iter().map(|&b| b as char).collect())
}

/// Build a literal string object
pub fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

/// Build a name object
pub fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

/// Build an array of name objects
pub fn name_array(names: &[&str]) -> Object {
    Object::Array(names.iter().map(|n| name(n)).collect())
}

/// Mutable dictionary view of a dictionary or stream object
pub fn dict_mut(obj: &mut Object) -> Option<&mut Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&mut s.dict),
        _ => None,
    }
}

/// Dictionary view of a dictionary or stream object
pub fn dict_ref(obj: &Object) -> Option<&Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

/// Collect every indirect reference contained in an object, in visiting order.
/// References are not followed.
pub fn collect_references(obj: &Object, out: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => out.push(*id),
        Object::Array(arr) => {
            for o in arr {
                collect_references(o, out);
            }
        }
        Object::Dictionary(dict) => {
            for (_, v) in dict.iter() {
                collect_references(v, out);
            }
        }
        Object::Stream(stream) => {
            for (_, v) in stream.dict.iter() {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}
