use crate::boxes::FourCC;
use crate::parser::{ParseError, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::fmt::Write as _;
use std::io::{self, Read, Seek, SeekFrom};

/// Readable and seekable, usable as a trait object.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

fn eof_as_truncated(e: io::Error, offset: u64, needed: u64) -> ParseError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ParseError::TruncatedInput { offset, needed }
    } else {
        ParseError::Io(e)
    }
}

/// Read `width` bytes (1..=16) as a big-endian unsigned integer.
pub fn read_unsigned<R: Read + Seek + ?Sized>(r: &mut R, width: usize) -> Result<u128> {
    debug_assert!((1..=16).contains(&width));
    let at = r.stream_position()?;
    r.read_uint128::<BigEndian>(width)
        .map_err(|e| eof_as_truncated(e, at, width as u64))
}

/// Read a 4-byte tag in stream order.
pub fn read_tag<R: Read + Seek + ?Sized>(r: &mut R) -> Result<FourCC> {
    let mut t = [0u8; 4];
    read_exact_at(r, &mut t)?;
    Ok(FourCC(t))
}

pub fn read_bytes<R: Read + Seek + ?Sized>(r: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut v = vec![0u8; len as usize];
    read_exact_at(r, &mut v)?;
    Ok(v)
}

fn read_exact_at<R: Read + Seek + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let at = r.stream_position()?;
    r.read_exact(buf)
        .map_err(|e| eof_as_truncated(e, at, buf.len() as u64))
}

/// Total length of the stream; the cursor is left where it was.
pub fn stream_len<R: Seek + ?Sized>(r: &mut R) -> io::Result<u64> {
    let pos = r.stream_position()?;
    let len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

pub fn read_slice<R: Read + Seek + ?Sized>(r: &mut R, offset: u64, len: u64) -> Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset))?;
    read_bytes(r, len)
}

/// One line per 16 bytes: absolute offset, hex column, printable ASCII.
pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    let mut line_offset = start_offset;
    for line in bytes.chunks(16) {
        let hex = hex::encode(line);
        let spaced: Vec<&str> = (0..hex.len()).step_by(2).map(|i| &hex[i..i + 2]).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<47}  |{}|", line_offset, spaced.join(" "), ascii);
        line_offset += line.len() as u64;
    }
    out
}

/// Text field bytes: a leading Pascal length byte is honoured when the
/// bytes after the counted run are padding, trailing NULs are dropped.
pub fn text_from_bytes(bytes: &[u8]) -> String {
    let body = match bytes.split_first() {
        Some((&len, rest))
            if (len as usize) <= rest.len() && rest[len as usize..].iter().all(|&b| b == 0) =>
        {
            &rest[..len as usize]
        }
        _ => bytes,
    };
    let end = body.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
