//! Attribute path addressing
//!
//! Paths are dot-separated: `network_interface.0.device_index` addresses a
//! field of the first list element, `ebs_block_device.1763922.volume_size`
//! a field of the set element with hash 1763922. The pseudo-leaves `#`
//! (collection cardinality) and `%` (map length) are addressable too.

use crate::value::AttrValue;
use std::fmt;
use thiserror::Error;

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Attribute, object field, or map key.
    Field(String),
    /// List index or set element hash; which one depends on the container.
    Num(i64),
    /// `#` - cardinality of a list or set.
    Count,
    /// `%` - number of keys in a map.
    MapLen,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(s) => f.write_str(s),
            Self::Num(n) => write!(f, "{n}"),
            Self::Count => f.write_str("#"),
            Self::MapLen => f.write_str("%"),
        }
    }
}

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath(Vec<Segment>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty attribute path")]
    Empty,
    #[error("empty segment in path {path:?}")]
    EmptySegment { path: String },
}

impl AttrPath {
    /// Parse a dot-separated path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            let seg = match part {
                "" => {
                    return Err(PathError::EmptySegment {
                        path: raw.to_string(),
                    });
                }
                "#" => Segment::Count,
                "%" => Segment::MapLen,
                _ => match part.parse::<i64>() {
                    Ok(n) if !part.starts_with('+') => Segment::Num(n),
                    _ => Segment::Field(part.to_string()),
                },
            };
            segments.push(seg);
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Name of the top-level attribute this path addresses.
    pub fn root(&self) -> Option<&str> {
        match self.0.first() {
            Some(Segment::Field(s)) => Some(s),
            _ => None,
        }
    }

    /// Resolve the path against a value tree rooted at a top-level attribute
    /// map. `#` and `%` resolve to the collection length as an `Int`.
    pub fn lookup<'a>(
        &self,
        attrs: &'a std::collections::BTreeMap<String, AttrValue>,
    ) -> Option<std::borrow::Cow<'a, AttrValue>> {
        use std::borrow::Cow;

        let mut segs = self.0.iter();
        let root = match segs.next() {
            Some(Segment::Field(s)) => s,
            _ => return None,
        };
        let mut current: &AttrValue = attrs.get(root)?;

        for seg in segs {
            match (seg, current) {
                (Segment::Field(name), AttrValue::Object(m) | AttrValue::Map(m)) => {
                    current = m.get(name)?;
                }
                (Segment::Num(i), AttrValue::List(items)) => {
                    current = items.get(usize::try_from(*i).ok()?)?;
                }
                (Segment::Num(h), AttrValue::Set(elems)) => {
                    current = elems.get(&i32::try_from(*h).ok()?)?;
                }
                (Segment::Count, v) | (Segment::MapLen, v) => {
                    let len = v.len()?;
                    return Some(Cow::Owned(AttrValue::Int(len as i64)));
                }
                _ => return None,
            }
        }
        Some(Cow::Borrowed(current))
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_simple() {
        let p = AttrPath::parse("ami").unwrap();
        assert_eq!(p.segments(), &[Segment::Field("ami".into())]);
    }

    #[test]
    fn test_parse_nested() {
        let p = AttrPath::parse("network_interface.0.device_index").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Field("network_interface".into()),
                Segment::Num(0),
                Segment::Field("device_index".into()),
            ]
        );
    }

    #[test]
    fn test_parse_pseudo_leaves() {
        assert_eq!(
            AttrPath::parse("subnet_ids.#").unwrap().segments()[1],
            Segment::Count
        );
        assert_eq!(
            AttrPath::parse("tags.%").unwrap().segments()[1],
            Segment::MapLen
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(AttrPath::parse(""), Err(PathError::Empty));
        assert!(AttrPath::parse("a..b").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["ami", "ebs_block_device.1763922.volume_size", "tags.%", "x.#"] {
            assert_eq!(AttrPath::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_lookup_list_and_count() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "sg".to_string(),
            AttrValue::List(vec![AttrValue::from("a"), AttrValue::from("b")]),
        );
        let v = AttrPath::parse("sg.1").unwrap().lookup(&attrs).unwrap();
        assert_eq!(v.as_ref(), &AttrValue::from("b"));
        let n = AttrPath::parse("sg.#").unwrap().lookup(&attrs).unwrap();
        assert_eq!(n.as_ref(), &AttrValue::Int(2));
    }

    #[test]
    fn test_lookup_set_by_hash() {
        let mut set = BTreeMap::new();
        let mut elem = BTreeMap::new();
        elem.insert("volume_size".to_string(), AttrValue::Int(100));
        set.insert(1763922, AttrValue::Object(elem));
        let mut attrs = BTreeMap::new();
        attrs.insert("ebs_block_device".to_string(), AttrValue::Set(set));

        let v = AttrPath::parse("ebs_block_device.1763922.volume_size")
            .unwrap()
            .lookup(&attrs)
            .unwrap();
        assert_eq!(v.as_ref(), &AttrValue::Int(100));
    }

    #[test]
    fn test_lookup_missing() {
        let attrs = BTreeMap::new();
        assert!(AttrPath::parse("nope").unwrap().lookup(&attrs).is_none());
    }
}
