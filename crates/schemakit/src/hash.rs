//! Stable hash codes for set elements and composite identifiers
//!
//! The hash must be identical across processes, platforms, and releases:
//! persisted set element indices are derived from it, so changing the
//! function invalidates existing state. FNV-1a over bytes is byte-serial
//! and therefore independent of endianness.

use crate::value::AttrValue;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Hash a string to a non-negative, stable `i32`.
pub fn hash_string(s: &str) -> i32 {
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    // Fold into the non-negative i32 range; flat path segments are unsigned.
    (h & 0x7fff_ffff) as i32
}

/// Builds a composite hash by writing fields into a byte buffer with a
/// separator, then hashing once.
///
/// Field order is part of the contract: callers must write fields in the
/// declared schema order, otherwise persisted set indices are invalidated.
#[derive(Debug, Default)]
pub struct CompositeHasher {
    buf: String,
}

impl CompositeHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one field followed by the separator.
    pub fn write(&mut self, field: &str) -> &mut Self {
        self.buf.push_str(field);
        self.buf.push('-');
        self
    }

    pub fn write_int(&mut self, field: i64) -> &mut Self {
        self.write(&field.to_string())
    }

    pub fn write_bool(&mut self, field: bool) -> &mut Self {
        self.write(if field { "true" } else { "false" })
    }

    /// Hash everything written so far.
    pub fn finish(&self) -> i32 {
        hash_string(&self.buf)
    }
}

/// Default set element hash: a canonical serialization of the element,
/// hashed once. Used when the schema declares no custom hash function.
///
/// Collisions are tolerated; elements in the same bucket are compared
/// field-wise by the diff engine.
pub fn default_element_hash(value: &AttrValue) -> i32 {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    hash_string(&buf)
}

fn write_canonical(value: &AttrValue, buf: &mut String) {
    match value {
        AttrValue::String(s) => {
            buf.push_str(s);
            buf.push('-');
        }
        AttrValue::Int(i) => {
            buf.push_str(&i.to_string());
            buf.push('-');
        }
        AttrValue::Float(f) => {
            buf.push_str(&f.to_string());
            buf.push('-');
        }
        AttrValue::Bool(b) => {
            buf.push_str(if *b { "true" } else { "false" });
            buf.push('-');
        }
        AttrValue::List(items) => {
            for item in items {
                write_canonical(item, buf);
            }
        }
        AttrValue::Set(elems) => {
            for elem in elems.values() {
                write_canonical(elem, buf);
            }
        }
        AttrValue::Map(m) | AttrValue::Object(m) => {
            // BTreeMap iterates in key order, keeping the hash stable.
            for (k, v) in m {
                buf.push_str(k);
                buf.push(':');
                write_canonical(v, buf);
            }
        }
    }
}
