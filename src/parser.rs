use crate::boxes::{Atom, AtomHeader, Element, FourCC};
use crate::registry::{default_registry, Dispatch, Registry};
use crate::util::{self, ReadSeek};
use crate::values::{Language, Matrix, Timestamp, ValueError};
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated input: needed {needed} bytes at offset {offset:#x}")]
    TruncatedInput { offset: u64, needed: u64 },
    #[error("malformed atom '{typ}' at offset {offset:#x}: {reason}")]
    MalformedAtom {
        offset: u64,
        typ: FourCC,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

pub const MIN_HEADER_SIZE: u64 = 8;
pub const EXTENDED_HEADER_SIZE: u64 = 16;

/// Limits applied while building the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest container nesting accepted; top-level atoms are depth 0.
    pub max_depth: usize,
    /// Reject any atom declaring more bytes than this.
    pub max_atom_size: Option<u64>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_atom_size: None,
        }
    }
}

impl ParseOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_atom_size(mut self, size: u64) -> Self {
        self.max_atom_size = Some(size);
        self
    }
}

fn malformed(offset: u64, typ: FourCC, reason: impl Into<String>) -> ParseError {
    ParseError::MalformedAtom {
        offset,
        typ,
        reason: reason.into(),
    }
}

/// Read the 8- or 16-byte header at `at`. The cursor is left on the first
/// payload byte.
pub fn read_header<R: Read + Seek + ?Sized>(r: &mut R, at: u64) -> Result<AtomHeader> {
    r.seek(SeekFrom::Start(at))?;
    let size32 = util::read_unsigned(r, 4)? as u64;
    let typ = util::read_tag(r)?;

    let (size, header_size) = if size32 == 1 {
        (util::read_unsigned(r, 8)? as u64, EXTENDED_HEADER_SIZE)
    } else {
        (size32, MIN_HEADER_SIZE)
    };

    if size < header_size {
        return Err(malformed(
            at,
            typ,
            format!("declared size {} is smaller than its {}-byte header", size, header_size),
        ));
    }
    if at.checked_add(size).is_none() {
        return Err(malformed(at, typ, format!("declared size {} overflows the offset range", size)));
    }

    Ok(AtomHeader { start: at, size, typ, header_size })
}

/// Re-read the header at `expected.start` and check it still matches.
pub fn revalidate_header<R: Read + Seek + ?Sized>(r: &mut R, expected: &AtomHeader) -> Result<()> {
    let found = read_header(r, expected.start)?;
    if found.size != expected.size || found.typ != expected.typ {
        return Err(malformed(
            expected.start,
            expected.typ,
            format!("header re-read as '{}' size {}, expected size {}", found.typ, found.size, expected.size),
        ));
    }
    Ok(())
}

/// Parse every top-level atom with the default dispatch table.
pub fn parse_all<R: Read + Seek>(r: &mut R) -> Result<Vec<Atom>> {
    parse_all_with(r, &default_registry(), ParseOptions::default())
}

pub fn parse_all_with<R: Read + Seek>(
    r: &mut R,
    registry: &Registry,
    options: ParseOptions,
) -> Result<Vec<Atom>> {
    AtomParser::new(r, registry, options)?.parse_all()
}

/// Depth-first builder over one stream.
///
/// Decoders receive the parser itself: the `read_*` helpers refuse to read
/// past the end of the atom currently being decoded, and
/// [`AtomParser::parse_children`] recurses for container payloads.
pub struct AtomParser<'a> {
    r: &'a mut dyn ReadSeek,
    registry: &'a Registry,
    options: ParseOptions,
    stream_len: u64,
    depth: usize,
    // atom whose fields are being decoded
    current: AtomHeader,
}

impl<'a> AtomParser<'a> {
    pub fn new(r: &'a mut dyn ReadSeek, registry: &'a Registry, options: ParseOptions) -> Result<Self> {
        let stream_len = util::stream_len(&mut *r)?;
        Ok(Self {
            r,
            registry,
            options,
            stream_len,
            depth: 0,
            current: AtomHeader {
                start: 0,
                size: stream_len,
                typ: FourCC(*b"\0\0\0\0"),
                header_size: 0,
            },
        })
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    /// Parse top-level atoms from the current position to the end of the
    /// stream. Ending exactly on a header boundary is normal termination.
    pub fn parse_all(&mut self) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = self.r.stream_position()?;
        while pos < self.stream_len {
            let atom = self.parse_atom(pos, self.stream_len)?;
            pos = atom.end();
            atoms.push(atom);
        }
        debug!(count = atoms.len(), "parsed top-level atoms");
        Ok(atoms)
    }

    /// Parse child atoms from the current position until `atom`'s declared
    /// end. The children must tile the remaining payload exactly.
    pub fn parse_children(&mut self, atom: &mut Atom) -> Result<()> {
        if self.depth >= self.options.max_depth {
            return Err(malformed(
                atom.offset,
                atom.typ,
                format!("nesting deeper than {} levels", self.options.max_depth),
            ));
        }
        let end = atom.end();
        let mut pos = self.r.stream_position()?;
        if pos > end {
            return Err(malformed(atom.offset, atom.typ, "fields overrun the atom before its children"));
        }

        self.depth += 1;
        let mut kids = Vec::new();
        let res = loop {
            if pos >= end {
                break Ok(());
            }
            match self.parse_atom(pos, end) {
                Ok(child) => {
                    pos = child.end();
                    kids.push(child);
                }
                Err(e) => break Err(e),
            }
        };
        self.depth -= 1;
        res?;

        debug!(typ = %atom.typ, offset = atom.offset, children = kids.len(), "container done");
        atom.children = Some(kids);
        Ok(())
    }

    fn parse_atom(&mut self, at: u64, parent_end: u64) -> Result<Atom> {
        let hdr = read_header(&mut *self.r, at)?;
        trace!(typ = %hdr.typ, offset = hdr.start, size = hdr.size, "atom header");

        if let Some(max) = self.options.max_atom_size {
            if hdr.size > max {
                return Err(malformed(at, hdr.typ, format!("declared size {} exceeds limit {}", hdr.size, max)));
            }
        }
        if hdr.end() > self.stream_len {
            return Err(malformed(
                at,
                hdr.typ,
                format!("extends to {:#x}, past the end of the stream at {:#x}", hdr.end(), self.stream_len),
            ));
        }
        if hdr.end() > parent_end {
            return Err(malformed(
                at,
                hdr.typ,
                format!("extends to {:#x}, past its parent's end at {:#x}", hdr.end(), parent_end),
            ));
        }

        let registry = self.registry;
        let (dispatch, full_box) = registry.dispatch(hdr.typ);
        let mut atom = Atom::from_header(&hdr);
        let outer = std::mem::replace(&mut self.current, hdr);

        let res = self.decode_atom(&mut atom, dispatch, full_box);
        self.current = outer;
        res?;

        self.r.seek(SeekFrom::Start(hdr.end()))?;
        Ok(atom)
    }

    fn decode_atom(&mut self, atom: &mut Atom, dispatch: Dispatch<'_>, full_box: bool) -> Result<()> {
        if full_box {
            atom.version = Some(self.read_uint(1)? as u8);
            atom.flags = Some(self.read_uint(3)? as u32);
        }

        match dispatch {
            Dispatch::Specific(decoder) => {
                decoder.decode(self, atom)?;
                let left = self.remaining()?;
                if left != 0 {
                    return Err(self.malformed(format!("{} payload bytes left undecoded", left)));
                }
            }
            Dispatch::ContainerOnly => self.parse_children(atom)?,
            Dispatch::Opaque => {
                debug!(typ = %atom.typ, offset = atom.offset, size = atom.size, "opaque atom skipped");
                self.skip_rest()?;
            }
        }
        Ok(())
    }

    // ---------- field helpers for decoders ----------

    /// Error describing the atom currently being decoded.
    pub fn malformed(&self, reason: impl Into<String>) -> ParseError {
        malformed(self.current.start, self.current.typ, reason)
    }

    fn value_error(&self, e: ValueError) -> ParseError {
        self.malformed(e.to_string())
    }

    /// Bytes left before the end of the current atom.
    pub fn remaining(&mut self) -> Result<u64> {
        let pos = self.r.stream_position()?;
        let end = self.current.end();
        if pos > end {
            return Err(self.malformed(format!("decoded {} bytes past the end", pos - end)));
        }
        Ok(end - pos)
    }

    fn ensure(&mut self, len: u64) -> Result<()> {
        let left = self.remaining()?;
        if len > left {
            return Err(self.malformed(format!("field of {} bytes overruns the atom ({} left)", len, left)));
        }
        Ok(())
    }

    /// Advance to the end of the current atom without interpreting it.
    pub fn skip_rest(&mut self) -> Result<()> {
        self.r.seek(SeekFrom::Start(self.current.end()))?;
        Ok(())
    }

    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        debug_assert!(width <= 8);
        self.ensure(width as u64)?;
        Ok(util::read_unsigned(&mut *self.r, width)? as u64)
    }

    pub fn read_tag(&mut self) -> Result<FourCC> {
        self.ensure(4)?;
        util::read_tag(&mut *self.r)
    }

    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        self.ensure(len)?;
        util::read_bytes(&mut *self.r, len)
    }

    pub fn read_text(&mut self, len: u64) -> Result<String> {
        Ok(util::text_from_bytes(&self.read_bytes(len)?))
    }

    pub fn read_timestamp(&mut self, width: usize) -> Result<Timestamp> {
        let raw = self.read_uint(width)?;
        Timestamp::from_raw(raw).map_err(|e| self.value_error(e))
    }

    pub fn read_matrix(&mut self) -> Result<Matrix> {
        let mut raw = [0u32; 9];
        for v in raw.iter_mut() {
            *v = self.read_uint(4)? as u32;
        }
        Ok(Matrix::from_raw(raw))
    }

    pub fn read_language(&mut self) -> Result<Language> {
        let raw = self.read_uint(2)? as u16;
        Language::from_raw(raw).map_err(|e| self.value_error(e))
    }

    pub fn read_fixed_16_16(&mut self) -> Result<Element> {
        let raw = self.read_uint(4)? as u32;
        Ok(Element::Fixed {
            raw,
            value: raw as f64 / 65536.0,
        })
    }

    /// `rows` rows of fixed-width integers. The whole table is checked
    /// against the remaining payload before anything is allocated.
    pub fn read_table(&mut self, rows: u64, widths: &[usize]) -> Result<Vec<Vec<u64>>> {
        let row_len: u64 = widths.iter().map(|&w| w as u64).sum();
        self.ensure_entries(rows, row_len)?;
        let mut table = Vec::with_capacity(rows as usize);
        for _ in 0..rows {
            let row = widths
                .iter()
                .map(|&w| self.read_uint(w))
                .collect::<Result<Vec<_>>>()?;
            table.push(row);
        }
        Ok(table)
    }

    /// `count` integers of one width.
    pub fn read_list(&mut self, count: u64, width: usize) -> Result<Vec<Element>> {
        self.ensure_entries(count, width as u64)?;
        (0..count).map(|_| self.read_uint(width).map(Element::Int)).collect()
    }

    fn ensure_entries(&mut self, count: u64, entry_len: u64) -> Result<()> {
        let left = self.remaining()?;
        match count.checked_mul(entry_len) {
            Some(need) if need <= left => Ok(()),
            _ => Err(self.malformed(format!(
                "{} entries of {} bytes do not fit in {} remaining bytes",
                count, entry_len, left
            ))),
        }
    }
}
