use crate::{
    boxes::Atom,
    parser::{self, revalidate_header, ParseOptions},
    registry::{default_registry, Registry},
    util::{hex_dump, read_slice},
};
use anyhow::Context;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

/// Parse every top-level atom, letting the caller extend the default
/// dispatch table first.
///
/// # Example
/// ```no_run
/// use atomseeker::{get_atoms, ParseOptions};
/// use std::fs::File;
///
/// let mut file = File::open("video.mov")?;
/// let atoms = get_atoms(&mut file, ParseOptions::default(), |reg| reg)?;
/// for a in &atoms {
///     println!("{} {} bytes at {:#x}", a.typ, a.size, a.offset);
/// }
/// # Ok::<(), atomseeker::ParseError>(())
/// ```
pub fn get_atoms<R, F>(r: &mut R, options: ParseOptions, registry_fn: F) -> parser::Result<Vec<Atom>>
where
    R: Read + Seek,
    F: FnOnce(Registry) -> Registry,
{
    let reg = registry_fn(default_registry());
    parser::parse_all_with(r, &reg, options)
}

/// Open and parse a file with the default dispatch table.
pub fn analyze_file(path: impl AsRef<Path>, options: ParseOptions) -> anyhow::Result<Vec<Atom>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut r = BufReader::new(f);
    let atoms = get_atoms(&mut r, options, |reg| reg)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(atoms)
}

/// Raw payload bytes of an already parsed atom, after checking that the
/// header recorded for it is still what the stream holds.
pub fn read_payload<R: Read + Seek>(r: &mut R, atom: &Atom) -> parser::Result<Vec<u8>> {
    let hdr = atom.header();
    revalidate_header(r, &hdr)?;
    read_slice(r, hdr.payload_start(), hdr.payload_len())
}

/// Result of a hex dump operation containing the formatted hex output.
#[derive(Serialize)]
pub struct HexDump {
    /// Starting offset of the dumped data
    pub offset: u64,
    /// Actual number of bytes that were read and dumped
    pub length: u64,
    /// Formatted hex dump string with addresses and ASCII representation
    pub hex: String,
}

/// Hex-dump at most `max_len` payload bytes of `atom` (0 means all of it).
pub fn payload_hex<R: Read + Seek>(r: &mut R, atom: &Atom, max_len: u64) -> parser::Result<HexDump> {
    let hdr = atom.header();
    revalidate_header(r, &hdr)?;

    let offset = hdr.payload_start();
    let len = hdr.payload_len();
    let to_read = if max_len == 0 { len } else { len.min(max_len) };
    if to_read == 0 {
        return Ok(HexDump { offset, length: 0, hex: String::new() });
    }

    let data = read_slice(r, offset, to_read)?;
    Ok(HexDump {
        offset,
        length: to_read,
        hex: hex_dump(&data, offset),
    })
}
