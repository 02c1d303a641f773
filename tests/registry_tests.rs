mod common;

use atomseeker::boxes::{Atom, Element, FourCC};
use atomseeker::parser::{parse_all, ParseError};
use atomseeker::values::Language;
use chrono::{TimeZone, Utc};
use common::*;
use std::io::Cursor;

fn parse_one(data: Vec<u8>) -> Atom {
    let mut atoms = parse_all(&mut Cursor::new(data)).expect("parse failed");
    assert_eq!(atoms.len(), 1);
    atoms.remove(0)
}

fn parse_err(data: Vec<u8>) -> ParseError {
    parse_all(&mut Cursor::new(data)).expect_err("parse should fail")
}

fn tag(s: &[u8; 4]) -> Element {
    Element::Tag(FourCC(*s))
}

#[test]
fn ftyp_fields_in_order() {
    let ftyp = parse_one(ftyp_isom());

    let names: Vec<_> = ftyp.elements.names().collect();
    assert_eq!(names, ["Major_Brand", "Minor_Version", "Compatible_Brands"]);

    assert_eq!(ftyp.element("Major_Brand"), Some(&tag(b"isom")));
    assert_eq!(ftyp.element("Minor_Version").and_then(Element::as_int), Some(512));
    let brands = ftyp.element("Compatible_Brands").and_then(Element::as_list).unwrap();
    assert_eq!(brands, [tag(b"isom"), tag(b"iso2"), tag(b"mp41")]);

    // no version/flags for ftyp
    assert!(ftyp.version.is_none());
    assert!(ftyp.flags.is_none());
    assert!(ftyp.children.is_none());
}

#[test]
fn ftyp_with_ragged_tail_is_malformed() {
    let mut p = b"qt  ".to_vec();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"qt  ab");
    let err = parse_err(atom(b"ftyp", &p));
    assert!(matches!(err, ParseError::MalformedAtom { .. }), "{err}");
}

#[test]
fn mvhd_zero_timestamps_and_identity_matrix() {
    let mvhd = parse_one(mvhd_v0());
    assert_eq!(mvhd.size, 108);
    assert_eq!(mvhd.version, Some(0));
    assert_eq!(mvhd.flags, Some(0));

    let epoch = Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).unwrap();
    let created = mvhd.element("Creation_time").and_then(Element::as_timestamp).unwrap();
    assert_eq!(created.date, epoch);

    let m = mvhd.element("Matrix_structure").and_then(Element::as_matrix).unwrap();
    assert!(m.is_identity());
    assert_eq!(m.raw, [0x10000, 0, 0, 0, 0x10000, 0, 0, 0, 0x4000_0000]);

    assert_eq!(mvhd.element("Time_scale").and_then(Element::as_int), Some(1000));
    assert_eq!(mvhd.element("Duration").and_then(Element::as_int), Some(5000));
    assert_eq!(mvhd.element("Next_track_ID").and_then(Element::as_int), Some(2));
    assert_eq!(mvhd.element("Reserved"), Some(&Element::Bytes(vec![0; 10])));
    assert_eq!(mvhd.elements.len(), 15);
}

#[test]
fn tkhd_fields() {
    let tkhd = parse_one(tkhd_v0());
    assert_eq!(tkhd.size, 92);
    assert_eq!(tkhd.flags, Some(3));

    let epoch = Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(tkhd.element("Creation_time").and_then(Element::as_timestamp).unwrap().date, epoch);
    assert_eq!(tkhd.element("Track_ID").and_then(Element::as_int), Some(1));
    assert_eq!(tkhd.element("Volume").and_then(Element::as_int), Some(0x100));
    assert_eq!(tkhd.element("Track_width").and_then(Element::as_int), Some(320 << 16));
    assert!(tkhd.element("Matrix_structure").and_then(Element::as_matrix).unwrap().is_identity());
    let names: Vec<_> = tkhd.elements.names().collect();
    assert_eq!(names.last(), Some(&"Track_height"));
}

#[test]
fn tkhd_version_1_uses_wide_times() {
    let mut p = Vec::new();
    p.extend_from_slice(&3_061_152_000u64.to_be_bytes());
    p.extend_from_slice(&3_061_152_000u64.to_be_bytes());
    p.extend_from_slice(&be32(&[7, 0]));
    p.extend_from_slice(&(1u64 << 33).to_be_bytes());
    p.extend_from_slice(&[0u8; 16]);
    p.extend_from_slice(&identity_matrix());
    p.extend_from_slice(&be32(&[0, 0]));
    let tkhd = parse_one(full_atom(b"tkhd", 1, 0, &p));

    let created = tkhd.element("Creation_time").and_then(Element::as_timestamp).unwrap();
    assert_eq!(created.date, Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(tkhd.element("Track_ID").and_then(Element::as_int), Some(7));
    assert_eq!(tkhd.element("Duration").and_then(Element::as_int), Some(1 << 33));
}

#[test]
fn mdhd_language_und() {
    let mdhd = parse_one(mdhd_v0(0x55C4));
    let lang = mdhd.element("Language").and_then(Element::as_language).unwrap();
    assert_eq!(lang, &Language::Packed("und".into()));
    assert_eq!(lang.to_string(), "und");
    assert_eq!(mdhd.element("Quality").and_then(Element::as_int), Some(0));
}

#[test]
fn mdhd_unspecified_and_macintosh_languages() {
    let mdhd = parse_one(mdhd_v0(0x7FFF));
    assert_eq!(
        mdhd.element("Language").and_then(Element::as_language),
        Some(&Language::Unspecified)
    );

    let mdhd = parse_one(mdhd_v0(11));
    assert_eq!(mdhd.element("Language").unwrap().to_string(), "Japanese");
}

#[test]
fn mdhd_bad_language_is_malformed() {
    for raw in [0x8000u16, 200, 0x0400, 0x7FFE] {
        let err = parse_err(mdhd_v0(raw));
        match err {
            ParseError::MalformedAtom { typ, .. } => assert_eq!(typ, FourCC(*b"mdhd")),
            other => panic!("expected MalformedAtom, got {other:?}"),
        }
    }
}

#[test]
fn mdhd_timestamp_overflow_is_malformed() {
    let mut p = Vec::new();
    p.extend_from_slice(&u64::MAX.to_be_bytes());
    p.extend_from_slice(&0u64.to_be_bytes());
    p.extend_from_slice(&be32(&[600]));
    p.extend_from_slice(&0u64.to_be_bytes());
    p.extend_from_slice(&[0x55, 0xC4, 0, 0]);
    let err = parse_err(full_atom(b"mdhd", 1, 0, &p));
    assert!(err.to_string().contains("overflows"), "{err}");
}

#[test]
fn short_mvhd_is_malformed() {
    let err = parse_err(full_atom(b"mvhd", 0, 0, &be32(&[0, 0, 600])));
    assert!(matches!(err, ParseError::MalformedAtom { .. }), "{err}");
}

#[test]
fn elst_table() {
    let e = parse_one(elst(&[[5000, 0, 0x10000], [100, 0xFFFF_FFFF, 0x10000]]));
    assert_eq!(e.element("Number_of_entries").and_then(Element::as_int), Some(2));
    let table = e.element("Edit_list_table").and_then(Element::as_table).unwrap();
    assert_eq!(table, [vec![5000, 0, 0x10000], vec![100, 0xFFFF_FFFF, 0x10000]]);
}

#[test]
fn elst_count_larger_than_payload_is_malformed() {
    let p = be32(&[0x4000_0000, 1, 2, 3]);
    let err = parse_err(full_atom(b"elst", 0, 0, &p));
    assert!(err.to_string().contains("do not fit"), "{err}");
}

#[test]
fn dref_parses_entries_as_children() {
    let dref = parse_one(dref_self_contained());
    assert_eq!(dref.element("Number_of_entries").and_then(Element::as_int), Some(1));
    let url = &dref.children()[0];
    assert_eq!(url.typ, FourCC(*b"url "));
    assert_eq!(url.flags, Some(1));
    assert!(url.elements.is_empty());
}

#[test]
fn url_location() {
    let url = parse_one(full_atom(b"url ", 0, 0, b"http://example.com/a.mov\0"));
    assert_eq!(
        url.element("Location"),
        Some(&Element::Text("http://example.com/a.mov".into()))
    );
}

#[test]
fn vmhd_fields() {
    let vmhd = parse_one(full_atom(b"vmhd", 0, 1, &[0, 0x40, 0x80, 0, 0x80, 0, 0x80, 0]));
    assert_eq!(vmhd.element("Graphics_mode").and_then(Element::as_int), Some(0x40));
    assert_eq!(
        vmhd.element("Opcolor").and_then(Element::as_list).unwrap(),
        [Element::Int(0x8000), Element::Int(0x8000), Element::Int(0x8000)]
    );
}

#[test]
fn stsd_mp4a_esds() {
    let stsd = parse_one(stsd(&[mp4a(0, &[esds()])]));
    assert_eq!(stsd.version, Some(0));
    assert_eq!(stsd.element("Number_of_entries").and_then(Element::as_int), Some(1));

    let mp4a = &stsd.children()[0];
    assert!(mp4a.version.is_none());
    let names: Vec<_> = mp4a.elements.names().collect();
    assert_eq!(
        names,
        [
            "Reserved",
            "Data_reference_index",
            "Version",
            "Revision_level",
            "Vendor",
            "Number_of_channels",
            "Sample_size",
            "Compression_ID",
            "Packet_size",
            "Sample_rate",
        ]
    );
    assert_eq!(mp4a.element("Number_of_channels").and_then(Element::as_int), Some(2));
    match mp4a.element("Sample_rate") {
        Some(Element::Fixed { value, .. }) => assert_eq!(*value, 44100.0),
        other => panic!("unexpected sample rate {other:?}"),
    }

    let esds = &mp4a.children()[0];
    assert_eq!(esds.typ, FourCC(*b"esds"));
    assert_eq!(esds.elements.len(), 1);
    assert!(esds.children.is_none());
}

#[test]
fn mp4a_other_versions_skip_the_rest() {
    let mp4a = parse_one(mp4a(1, &[vec![0xEE; 16]]));
    assert_eq!(mp4a.element("Version").and_then(Element::as_int), Some(1));
    assert_eq!(mp4a.elements.len(), 3);
    assert!(mp4a.children.is_none());
}

#[test]
fn stsd_count_mismatch_is_tolerated() {
    let mut p = be32(&[3]);
    p.extend_from_slice(&mp4a(0, &[]));
    let stsd = parse_one(full_atom(b"stsd", 0, 0, &p));
    assert_eq!(stsd.children().len(), 1);
}

#[test]
fn avc1_visual_sample_entry() {
    let mut p = vec![0u8; 6];
    p.extend_from_slice(&1u16.to_be_bytes());
    p.extend_from_slice(&[0u8; 16]); // version .. spatial quality
    p.extend_from_slice(&640u16.to_be_bytes());
    p.extend_from_slice(&480u16.to_be_bytes());
    p.extend_from_slice(&be32(&[72 << 16, 72 << 16, 0]));
    p.extend_from_slice(&1u16.to_be_bytes());
    let mut name = [0u8; 32];
    name[0] = 4;
    name[1..5].copy_from_slice(b"h264");
    p.extend_from_slice(&name);
    p.extend_from_slice(&24u16.to_be_bytes());
    p.extend_from_slice(&0xFFFFu16.to_be_bytes());
    p.extend_from_slice(&atom(b"avcC", &[1, 0x64, 0, 0x1F]));
    let avc1 = parse_one(atom(b"avc1", &p));

    assert_eq!(avc1.element("Width").and_then(Element::as_int), Some(640));
    assert_eq!(avc1.element("Height").and_then(Element::as_int), Some(480));
    assert_eq!(avc1.element("Compressor_name"), Some(&Element::Text("h264".into())));
    assert_eq!(avc1.children()[0].typ, FourCC(*b"avcC"));
}

#[test]
fn hdlr_component_name() {
    let h = parse_one(hdlr(b"vide", b"\x0cVideoHandler"));
    assert_eq!(h.element("Component_subtype"), Some(&tag(b"vide")));
    assert_eq!(h.element("Component_name"), Some(&Element::Text("VideoHandler".into())));
}

#[test]
fn sample_tables() {
    let stts = parse_one(full_atom(b"stts", 0, 0, &be32(&[2, 100, 1024, 1, 512])));
    assert_eq!(
        stts.element("Time_to_sample_table").and_then(Element::as_table).unwrap(),
        [vec![100, 1024], vec![1, 512]]
    );

    let stsz = parse_one(full_atom(b"stsz", 0, 0, &be32(&[0, 3, 1000, 2000, 3000])));
    assert_eq!(
        stsz.element("Sample_size_table").and_then(Element::as_list).unwrap(),
        [Element::Int(1000), Element::Int(2000), Element::Int(3000)]
    );

    // a common sample size means no table
    let stsz = parse_one(full_atom(b"stsz", 0, 0, &be32(&[512, 40])));
    assert!(stsz.element("Sample_size_table").is_none());

    let mut p = be32(&[1]);
    p.extend_from_slice(&(5u64 << 32).to_be_bytes());
    let co64 = parse_one(full_atom(b"co64", 0, 0, &p));
    assert_eq!(
        co64.element("Chunk_offset_table").and_then(Element::as_list).unwrap(),
        [Element::Int(5 << 32)]
    );
}
