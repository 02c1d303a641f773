//! Reads the atom tree of MP4/QuickTime files into [`Atom`] nodes with
//! decoded header fields.

pub mod api;
pub mod boxes;
pub mod parser;
pub mod registry;
pub mod util;
pub mod values;

pub use api::{analyze_file, get_atoms, payload_hex, read_payload, HexDump};
pub use boxes::{find_all, Atom, AtomHeader, Element, Elements, FourCC};
pub use parser::{parse_all, parse_all_with, read_header, revalidate_header, AtomParser, ParseError, ParseOptions};
pub use registry::{default_registry, AtomDecoder, Dispatch, Registry, VersionFlags};
pub use values::{Language, Matrix, Timestamp, ValueError};
