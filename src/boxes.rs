use crate::values::{Language, Matrix, Timestamp};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else { None }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
    /// True when every byte is printable ASCII, i.e. the lossy form is exact.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|c| (32..=126).contains(c))
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if self.is_printable() {
            s.serialize_str(&self.as_str_lossy())
        } else {
            s.serialize_str(&format!("0x{}", hex::encode(self.0)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    pub start: u64,       // file offset of header start
    pub size: u64,        // total size including header (extended size already applied)
    pub typ: FourCC,
    pub header_size: u64, // 8 or 16
}

impl AtomHeader {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
    pub fn payload_start(&self) -> u64 {
        self.start + self.header_size
    }
    pub fn payload_len(&self) -> u64 {
        self.size - self.header_size
    }
}

/// A decoded field value.
///
/// Every per-type decoder produces its fields as one of these variants, so
/// consumers can match on the shape instead of re-parsing strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Element {
    Int(u64),
    Tag(FourCC),
    Text(String),
    Bytes(#[serde(serialize_with = "ser_hex")] Vec<u8>),
    Timestamp(Timestamp),
    Matrix(Matrix),
    Language(Language),
    /// Fixed-point 16.16 value, kept raw with its decoded float alongside.
    Fixed { raw: u32, value: f64 },
    List(Vec<Element>),
    /// Repeated fixed-shape rows, e.g. edit list entries.
    Table(Vec<Vec<u64>>),
}

fn ser_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

impl Element {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Element::Int(v) => Some(*v),
            _ => None,
        }
    }
    pub fn as_tag(&self) -> Option<FourCC> {
        match self {
            Element::Tag(t) => Some(*t),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Element]> {
        match self {
            Element::List(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_table(&self) -> Option<&[Vec<u64>]> {
        match self {
            Element::Table(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            Element::Timestamp(t) => Some(t),
            _ => None,
        }
    }
    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Element::Matrix(m) => Some(m),
            _ => None,
        }
    }
    pub fn as_language(&self) -> Option<&Language> {
        match self {
            Element::Language(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Int(v) => write!(f, "{}", v),
            Element::Tag(t) => write!(f, "{}", t),
            Element::Text(s) => write!(f, "{:?}", s),
            Element::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Element::Timestamp(t) => write!(f, "{}", t),
            Element::Matrix(m) => write!(f, "{}", m),
            Element::Language(l) => write!(f, "{}", l),
            Element::Fixed { value, .. } => write!(f, "{}", value),
            Element::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Element::Table(rows) => write!(f, "{:?}", rows),
        }
    }
}

/// Field name → value, in the order the fields appear on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Elements(Vec<(&'static str, Element)>);

impl Elements {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a field. A repeated name replaces the earlier value in place.
    pub fn insert(&mut self, name: &'static str, value: Element) {
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(n, _)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Element)> {
        self.0.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Elements {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One node of the parsed tree.
#[derive(Debug, Clone, Serialize)]
pub struct Atom {
    /// Absolute offset of the header in the source stream
    pub offset: u64,
    /// Declared size including the header
    pub size: u64,
    /// 8, or 16 when the extended size field is present
    pub header_size: u64,
    #[serde(rename = "type")]
    pub typ: FourCC,
    /// Present only for tags that carry a version/flags preamble
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    pub elements: Elements,
    /// `None` marks a leaf or opaque atom
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Atom>>,
}

impl Atom {
    pub(crate) fn from_header(hdr: &AtomHeader) -> Self {
        Atom {
            offset: hdr.start,
            size: hdr.size,
            header_size: hdr.header_size,
            typ: hdr.typ,
            version: None,
            flags: None,
            elements: Elements::new(),
            children: None,
        }
    }

    pub fn header(&self) -> AtomHeader {
        AtomHeader {
            start: self.offset,
            size: self.size,
            typ: self.typ,
            header_size: self.header_size,
        }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn children(&self) -> &[Atom] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// First direct child with the given tag.
    pub fn child(&self, typ: &[u8; 4]) -> Option<&Atom> {
        self.children().iter().find(|c| &c.typ.0 == typ)
    }

    /// Follow a path of tags through first-matching children, e.g.
    /// `[b"trak", b"mdia", b"mdhd"]` from a `moov`.
    pub fn descend(&self, path: &[&[u8; 4]]) -> Option<&Atom> {
        path.iter().try_fold(self, |a, typ| a.child(typ))
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }
}

/// Find every atom with the given tag, depth-first in file order.
pub fn find_all<'a>(atoms: &'a [Atom], typ: &[u8; 4]) -> Vec<&'a Atom> {
    let mut out = Vec::new();
    collect(atoms, typ, &mut out);
    out
}

fn collect<'a>(atoms: &'a [Atom], typ: &[u8; 4], out: &mut Vec<&'a Atom>) {
    for a in atoms {
        if &a.typ.0 == typ {
            out.push(a);
        }
        collect(a.children(), typ, out);
    }
}
