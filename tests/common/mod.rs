#![allow(dead_code)]

//! Byte builders for synthetic QuickTime/MP4 files.

pub fn atom(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

/// Atom using the 64-bit extended size field.
pub fn large_atom(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(&(payload.len() as u64 + 16).to_be_bytes());
    v.extend_from_slice(payload);
    v
}

pub fn full_atom(typ: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![version];
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    atom(typ, &body)
}

pub fn container(typ: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    atom(typ, &children.concat())
}

pub fn be32(vals: &[u32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn identity_matrix() -> Vec<u8> {
    be32(&[0x10000, 0, 0, 0, 0x10000, 0, 0, 0, 0x4000_0000])
}

pub fn ftyp_isom() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(b"isom");
    p.extend_from_slice(&512u32.to_be_bytes());
    p.extend_from_slice(b"isomiso2mp41");
    atom(b"ftyp", &p)
}

pub fn mvhd_v0() -> Vec<u8> {
    let mut p = be32(&[0, 0, 1000, 5000, 0x10000]);
    p.extend_from_slice(&0x100u16.to_be_bytes()); // volume
    p.extend_from_slice(&[0u8; 10]);
    p.extend_from_slice(&identity_matrix());
    p.extend_from_slice(&be32(&[0, 0, 0, 0, 0, 0, 2]));
    full_atom(b"mvhd", 0, 0, &p)
}

pub fn tkhd_v0() -> Vec<u8> {
    let mut p = be32(&[0, 0, 1, 0, 5000]);
    p.extend_from_slice(&[0u8; 8]);
    p.extend_from_slice(&[0, 0, 0, 0, 0x01, 0x00, 0, 0]); // layer, group, volume, reserved
    p.extend_from_slice(&identity_matrix());
    p.extend_from_slice(&be32(&[320 << 16, 240 << 16]));
    full_atom(b"tkhd", 0, 3, &p)
}

pub fn mdhd_v0(language: u16) -> Vec<u8> {
    let mut p = be32(&[0, 0, 44100, 220500]);
    p.extend_from_slice(&language.to_be_bytes());
    p.extend_from_slice(&0u16.to_be_bytes());
    full_atom(b"mdhd", 0, 0, &p)
}

pub fn elst(entries: &[[u32; 3]]) -> Vec<u8> {
    let mut p = be32(&[entries.len() as u32]);
    for e in entries {
        p.extend_from_slice(&be32(e));
    }
    full_atom(b"elst", 0, 0, &p)
}

pub fn hdlr(subtype: &[u8; 4], name: &[u8]) -> Vec<u8> {
    let mut p = vec![0u8; 4];
    p.extend_from_slice(subtype);
    p.extend_from_slice(&[0u8; 12]);
    p.extend_from_slice(name);
    full_atom(b"hdlr", 0, 0, &p)
}

pub fn dref_self_contained() -> Vec<u8> {
    let mut p = be32(&[1]);
    p.extend_from_slice(&full_atom(b"url ", 0, 1, &[]));
    full_atom(b"dref", 0, 0, &p)
}

pub fn esds() -> Vec<u8> {
    let mut p = be32(&[0]);
    p.extend_from_slice(&[0x03, 0x19, 0x00, 0x01, 0x00]);
    atom(b"esds", &p)
}

pub fn mp4a(version: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let mut p = vec![0u8; 6];
    p.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    p.extend_from_slice(&version.to_be_bytes());
    p.extend_from_slice(&0u16.to_be_bytes()); // revision
    p.extend_from_slice(&[0u8; 4]); // vendor
    p.extend_from_slice(&2u16.to_be_bytes());
    p.extend_from_slice(&16u16.to_be_bytes());
    p.extend_from_slice(&0u16.to_be_bytes());
    p.extend_from_slice(&0u16.to_be_bytes());
    p.extend_from_slice(&(44100u32 << 16).to_be_bytes());
    p.extend_from_slice(&children.concat());
    atom(b"mp4a", &p)
}

pub fn stsd(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut p = be32(&[entries.len() as u32]);
    p.extend_from_slice(&entries.concat());
    full_atom(b"stsd", 0, 0, &p)
}

/// ftyp, moov with one sound track, mdat.
pub fn sample_movie() -> Vec<u8> {
    let stbl = container(
        b"stbl",
        &[
            stsd(&[mp4a(0, &[esds()])]),
            full_atom(b"stts", 0, 0, &be32(&[1, 215, 1024])),
            full_atom(b"stsc", 0, 0, &be32(&[1, 1, 215, 1])),
            full_atom(b"stsz", 0, 0, &be32(&[0, 3, 371, 372, 370])),
            full_atom(b"stco", 0, 0, &be32(&[1, 48])),
        ],
    );
    let minf = container(
        b"minf",
        &[
            full_atom(b"smhd", 0, 0, &[0, 0, 0, 0]),
            container(b"dinf", &[dref_self_contained()]),
            stbl,
        ],
    );
    let mdia = container(
        b"mdia",
        &[mdhd_v0(0x55C4), hdlr(b"soun", b"SoundHandler\0"), minf],
    );
    let trak = container(
        b"trak",
        &[tkhd_v0(), container(b"edts", &[elst(&[[5000, 0, 0x10000]])]), mdia],
    );
    let moov = container(b"moov", &[mvhd_v0(), trak]);
    [ftyp_isom(), moov, atom(b"mdat", &[0xAB; 32])].concat()
}
