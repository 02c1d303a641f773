use crate::boxes::{Atom, Element, FourCC};
use crate::parser::{AtomParser, Result};
use std::collections::HashMap;
use tracing::warn;

/// Decoder for the fields of one atom type.
///
/// Called with the cursor on the first field after the header (and after
/// version/flags when the type declares them). A decoder must consume the
/// payload exactly, either field by field, by recursing with
/// [`AtomParser::parse_children`], or by calling [`AtomParser::skip_rest`].
pub trait AtomDecoder: Send + Sync {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()>;
}

/// Whether a 1-byte version and 3-byte flags precede the type's own fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFlags {
    Absent,
    Present,
}

/// Outcome of looking a tag up in the [`Registry`].
pub enum Dispatch<'r> {
    Specific(&'r dyn AtomDecoder),
    /// No fields of its own, only child atoms.
    ContainerOnly,
    /// Unknown tag: header recorded, payload skipped.
    Opaque,
}

enum Handler {
    Decoder(Box<dyn AtomDecoder>),
    Container,
}

struct Entry {
    handler: Handler,
    version_flags: VersionFlags,
    name: String,
}

/// Closed table from tag to decoding strategy.
///
/// The table is immutable once constructed; use [`Registry::with_decoder`]
/// and [`Registry::with_container`] to build it fluently. Lookup is a plain
/// map access, tags never select code any other way.
pub struct Registry {
    map: HashMap<FourCC, Entry>,
}

impl Registry {
    /// Create an empty registry: every tag is opaque.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for display.
    pub fn with_decoder(
        mut self,
        typ: FourCC,
        name: &str,
        version_flags: VersionFlags,
        dec: Box<dyn AtomDecoder>,
    ) -> Self {
        self.map.insert(
            typ,
            Entry {
                handler: Handler::Decoder(dec),
                version_flags,
                name: name.to_string(),
            },
        );
        self
    }

    /// Return a new registry treating `typ` as a pure container.
    pub fn with_container(mut self, typ: FourCC, name: &str) -> Self {
        self.map.insert(
            typ,
            Entry {
                handler: Handler::Container,
                version_flags: VersionFlags::Absent,
                name: name.to_string(),
            },
        );
        self
    }

    /// Strategy for `typ`, and whether version/flags precede its fields.
    pub fn dispatch(&self, typ: FourCC) -> (Dispatch<'_>, bool) {
        match self.map.get(&typ) {
            Some(entry) => {
                let dispatch = match &entry.handler {
                    Handler::Decoder(d) => Dispatch::Specific(d.as_ref()),
                    Handler::Container => Dispatch::ContainerOnly,
                };
                (dispatch, entry.version_flags == VersionFlags::Present)
            }
            None => (Dispatch::Opaque, false),
        }
    }

    pub fn name(&self, typ: FourCC) -> Option<&str> {
        self.map.get(&typ).map(|e| e.name.as_str())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

/// Width of time and duration fields: 64-bit in version 1 layouts.
fn time_width(atom: &Atom) -> usize {
    if atom.version == Some(1) { 8 } else { 4 }
}

fn int(p: &mut AtomParser<'_>, width: usize) -> Result<Element> {
    p.read_uint(width).map(Element::Int)
}

/// Parse the entries of a table-of-atoms box and compare with the count it
/// declared. The byte extent wins; a disagreeing count is only logged.
fn parse_entries(p: &mut AtomParser<'_>, atom: &mut Atom, declared: u64) -> Result<()> {
    p.parse_children(atom)?;
    let found = atom.children().len() as u64;
    if found != declared {
        warn!(typ = %atom.typ, offset = atom.offset, declared, found, "entry count mismatch");
    }
    Ok(())
}

// ---------- Decoders ----------

// ftyp: major + minor + compatible brands filling the rest
pub struct FtypDecoder;

impl AtomDecoder for FtypDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        atom.elements.insert("Major_Brand", Element::Tag(p.read_tag()?));
        atom.elements.insert("Minor_Version", int(p, 4)?);

        let count = p.remaining()? / 4;
        let mut brands = Vec::with_capacity(count as usize);
        for _ in 0..count {
            brands.push(Element::Tag(p.read_tag()?));
        }
        atom.elements.insert("Compatible_Brands", Element::List(brands));
        Ok(())
    }
}

// moov: children only
pub struct MoovDecoder;

impl AtomDecoder for MoovDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        p.parse_children(atom)
    }
}

// mvhd: movie header. Only the creation and modification fields are dates;
// preview, poster, selection and current times count time-scale units and
// stay integers.
pub struct MvhdDecoder;

impl AtomDecoder for MvhdDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let tw = time_width(atom);
        let e = &mut atom.elements;
        e.insert("Creation_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Modification_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Time_scale", int(p, 4)?);
        e.insert("Duration", int(p, tw)?);
        e.insert("Preferred_rate", int(p, 4)?);
        e.insert("Preferred_volume", int(p, 2)?);
        e.insert("Reserved", Element::Bytes(p.read_bytes(10)?));
        e.insert("Matrix_structure", Element::Matrix(p.read_matrix()?));
        e.insert("Preview_time", int(p, 4)?);
        e.insert("Preview_duration", int(p, 4)?);
        e.insert("Poster_time", int(p, 4)?);
        e.insert("Selection_time", int(p, 4)?);
        e.insert("Selection_duration", int(p, 4)?);
        e.insert("Current_time", int(p, 4)?);
        e.insert("Next_track_ID", int(p, 4)?);
        Ok(())
    }
}

// tkhd: track header
pub struct TkhdDecoder;

impl AtomDecoder for TkhdDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let tw = time_width(atom);
        let e = &mut atom.elements;
        e.insert("Creation_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Modification_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Track_ID", int(p, 4)?);
        e.insert("Reserved", int(p, 4)?);
        e.insert("Duration", int(p, tw)?);
        e.insert("Reserved2", int(p, 8)?);
        e.insert("Layer", int(p, 2)?);
        e.insert("Alternate_group", int(p, 2)?);
        e.insert("Volume", int(p, 2)?);
        e.insert("Reserved3", int(p, 2)?);
        e.insert("Matrix_structure", Element::Matrix(p.read_matrix()?));
        e.insert("Track_width", int(p, 4)?);
        e.insert("Track_height", int(p, 4)?);
        Ok(())
    }
}

// mdhd: media header
pub struct MdhdDecoder;

impl AtomDecoder for MdhdDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let tw = time_width(atom);
        let e = &mut atom.elements;
        e.insert("Creation_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Modification_time", Element::Timestamp(p.read_timestamp(tw)?));
        e.insert("Time_scale", int(p, 4)?);
        e.insert("Duration", int(p, tw)?);
        e.insert("Language", Element::Language(p.read_language()?));
        e.insert("Quality", int(p, 2)?);
        Ok(())
    }
}

// elst: edit list, 3 integers per entry
pub struct ElstDecoder;

impl AtomDecoder for ElstDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let tw = time_width(atom);
        let n = p.read_uint(4)?;
        atom.elements.insert("Number_of_entries", Element::Int(n));
        // track duration, media time, media rate
        let table = p.read_table(n, &[tw, tw, 4])?;
        atom.elements.insert("Edit_list_table", Element::Table(table));
        Ok(())
    }
}

// dref / stsd: entry count, then the entries as child atoms
pub struct EntryListDecoder;

impl AtomDecoder for EntryListDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let n = p.read_uint(4)?;
        atom.elements.insert("Number_of_entries", Element::Int(n));
        parse_entries(p, atom, n)
    }
}

// vmhd: video media information header
pub struct VmhdDecoder;

impl AtomDecoder for VmhdDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        atom.elements.insert("Graphics_mode", int(p, 2)?);
        atom.elements.insert("Opcolor", Element::List(p.read_list(3, 2)?));
        Ok(())
    }
}

// smhd: sound media information header
pub struct SmhdDecoder;

impl AtomDecoder for SmhdDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        atom.elements.insert("Balance", int(p, 2)?);
        atom.elements.insert("Reserved", int(p, 2)?);
        Ok(())
    }
}

// hdlr: handler reference, name runs to the end
pub struct HdlrDecoder;

impl AtomDecoder for HdlrDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let e = &mut atom.elements;
        e.insert("Component_type", Element::Tag(p.read_tag()?));
        e.insert("Component_subtype", Element::Tag(p.read_tag()?));
        e.insert("Component_manufacturer", int(p, 4)?);
        e.insert("Component_flags", int(p, 4)?);
        e.insert("Component_flags_mask", int(p, 4)?);
        let left = p.remaining()?;
        e.insert("Component_name", Element::Text(p.read_text(left)?));
        Ok(())
    }
}

// url : data reference entry, location absent for self-contained media
pub struct UrlDecoder;

impl AtomDecoder for UrlDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let left = p.remaining()?;
        if left > 0 {
            atom.elements.insert("Location", Element::Text(p.read_text(left)?));
        }
        Ok(())
    }
}

// mp4a: sound sample description, only version 0 is modeled
pub struct Mp4aDecoder;

impl AtomDecoder for Mp4aDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let e = &mut atom.elements;
        e.insert("Reserved", int(p, 6)?);
        e.insert("Data_reference_index", int(p, 2)?);
        let version = p.read_uint(2)?;
        e.insert("Version", Element::Int(version));
        if version != 0 {
            return p.skip_rest();
        }
        e.insert("Revision_level", int(p, 2)?);
        e.insert("Vendor", Element::Tag(p.read_tag()?));
        e.insert("Number_of_channels", int(p, 2)?);
        e.insert("Sample_size", int(p, 2)?);
        e.insert("Compression_ID", int(p, 2)?);
        e.insert("Packet_size", int(p, 2)?);
        e.insert("Sample_rate", p.read_fixed_16_16()?);
        p.parse_children(atom)
    }
}

// avc1 / hvc1 / hev1 / mp4v: video sample description
pub struct VisualSampleEntryDecoder;

const NO_COLOR_TABLE: u64 = 0xFFFF;

impl AtomDecoder for VisualSampleEntryDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let e = &mut atom.elements;
        e.insert("Reserved", int(p, 6)?);
        e.insert("Data_reference_index", int(p, 2)?);
        e.insert("Version", int(p, 2)?);
        e.insert("Revision_level", int(p, 2)?);
        e.insert("Vendor", Element::Tag(p.read_tag()?));
        e.insert("Temporal_quality", int(p, 4)?);
        e.insert("Spatial_quality", int(p, 4)?);
        e.insert("Width", int(p, 2)?);
        e.insert("Height", int(p, 2)?);
        e.insert("Horizontal_resolution", p.read_fixed_16_16()?);
        e.insert("Vertical_resolution", p.read_fixed_16_16()?);
        e.insert("Data_size", int(p, 4)?);
        e.insert("Frame_count", int(p, 2)?);
        e.insert("Compressor_name", Element::Text(p.read_text(32)?));
        e.insert("Depth", int(p, 2)?);
        let color_table = p.read_uint(2)?;
        e.insert("Color_table_ID", Element::Int(color_table));
        if color_table != NO_COLOR_TABLE {
            // inline color table, not modeled
            return p.skip_rest();
        }
        p.parse_children(atom)
    }
}

// esds: shallow, descriptors are not interpreted
pub struct EsdsDecoder;

impl AtomDecoder for EsdsDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        atom.elements.insert("Version_flags", int(p, 4)?);
        p.skip_rest()
    }
}

// stts / ctts / stsc: counted tables of fixed-width rows
pub struct SampleTableDecoder {
    pub table: &'static str,
    pub widths: &'static [usize],
}

impl AtomDecoder for SampleTableDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let n = p.read_uint(4)?;
        atom.elements.insert("Number_of_entries", Element::Int(n));
        atom.elements.insert(self.table, Element::Table(p.read_table(n, self.widths)?));
        Ok(())
    }
}

// stss / stco / co64: counted lists of one integer each
pub struct SampleListDecoder {
    pub list: &'static str,
    pub width: usize,
}

impl AtomDecoder for SampleListDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let n = p.read_uint(4)?;
        atom.elements.insert("Number_of_entries", Element::Int(n));
        atom.elements.insert(self.list, Element::List(p.read_list(n, self.width)?));
        Ok(())
    }
}

// stsz: table present only when there is no common sample size
pub struct StszDecoder;

impl AtomDecoder for StszDecoder {
    fn decode(&self, p: &mut AtomParser<'_>, atom: &mut Atom) -> Result<()> {
        let sample_size = p.read_uint(4)?;
        let n = p.read_uint(4)?;
        atom.elements.insert("Sample_size", Element::Int(sample_size));
        atom.elements.insert("Number_of_entries", Element::Int(n));
        if sample_size == 0 {
            atom.elements.insert("Sample_size_table", Element::List(p.read_list(n, 4)?));
        }
        Ok(())
    }
}

// ---------- Default registry ----------
pub fn default_registry() -> Registry {
    use VersionFlags::{Absent, Present};

    let cc = |s: &[u8; 4]| FourCC(*s);

    let mut reg = Registry::new()
        .with_decoder(cc(b"ftyp"), "File Type", Absent, Box::new(FtypDecoder))
        .with_decoder(cc(b"moov"), "Movie", Absent, Box::new(MoovDecoder))
        .with_decoder(cc(b"mvhd"), "Movie Header", Present, Box::new(MvhdDecoder))
        .with_decoder(cc(b"tkhd"), "Track Header", Present, Box::new(TkhdDecoder))
        .with_decoder(cc(b"mdhd"), "Media Header", Present, Box::new(MdhdDecoder))
        .with_decoder(cc(b"elst"), "Edit List", Present, Box::new(ElstDecoder))
        .with_decoder(cc(b"dref"), "Data Reference", Present, Box::new(EntryListDecoder))
        .with_decoder(cc(b"vmhd"), "Video Media Information Header", Present, Box::new(VmhdDecoder))
        .with_decoder(cc(b"smhd"), "Sound Media Information Header", Present, Box::new(SmhdDecoder))
        .with_decoder(cc(b"hdlr"), "Handler Reference", Present, Box::new(HdlrDecoder))
        .with_decoder(cc(b"url "), "Data Entry URL", Present, Box::new(UrlDecoder))
        .with_decoder(cc(b"stsd"), "Sample Description", Present, Box::new(EntryListDecoder))
        .with_decoder(cc(b"mp4a"), "MPEG-4 Audio Sample Entry", Absent, Box::new(Mp4aDecoder))
        .with_decoder(cc(b"esds"), "Elementary Stream Descriptor", Absent, Box::new(EsdsDecoder))
        .with_decoder(
            cc(b"stts"),
            "Time-to-Sample",
            Present,
            Box::new(SampleTableDecoder { table: "Time_to_sample_table", widths: &[4, 4] }),
        )
        .with_decoder(
            cc(b"ctts"),
            "Composition Offset",
            Present,
            Box::new(SampleTableDecoder { table: "Composition_offset_table", widths: &[4, 4] }),
        )
        .with_decoder(
            cc(b"stsc"),
            "Sample-to-Chunk",
            Present,
            Box::new(SampleTableDecoder { table: "Sample_to_chunk_table", widths: &[4, 4, 4] }),
        )
        .with_decoder(
            cc(b"stss"),
            "Sync Sample",
            Present,
            Box::new(SampleListDecoder { list: "Sync_sample_table", width: 4 }),
        )
        .with_decoder(
            cc(b"stco"),
            "Chunk Offset",
            Present,
            Box::new(SampleListDecoder { list: "Chunk_offset_table", width: 4 }),
        )
        .with_decoder(
            cc(b"co64"),
            "64-bit Chunk Offset",
            Present,
            Box::new(SampleListDecoder { list: "Chunk_offset_table", width: 8 }),
        )
        .with_decoder(cc(b"stsz"), "Sample Size", Present, Box::new(StszDecoder));

    for (typ, name) in [
        (b"avc1", "AVC Video Sample Entry"),
        (b"hvc1", "HEVC Video Sample Entry"),
        (b"hev1", "HEVC Video Sample Entry"),
        (b"mp4v", "MPEG-4 Video Sample Entry"),
    ] {
        reg = reg.with_decoder(cc(typ), name, Absent, Box::new(VisualSampleEntryDecoder));
    }

    for (typ, name) in [
        (b"trak", "Track"),
        (b"edts", "Edit"),
        (b"mdia", "Media"),
        (b"minf", "Media Information"),
        (b"stbl", "Sample Table"),
        (b"dinf", "Data Information"),
        (b"mvex", "Movie Extends"),
        (b"moof", "Movie Fragment"),
        (b"traf", "Track Fragment"),
        (b"mfra", "Movie Fragment Random Access"),
    ] {
        reg = reg.with_container(cc(typ), name);
    }

    reg
}
