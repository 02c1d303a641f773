use anyhow::Context;
use atomseeker::{
    boxes::{Atom, FourCC},
    get_atoms, payload_hex,
    registry::{default_registry, Registry},
    util::ReadSeek,
    ParseOptions,
};
use clap::{ArgAction, Parser};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};

#[derive(Parser, Debug)]
#[command(version, about = "Show the atom tree of an MP4/QuickTime file")]
struct Args {
    /// Input file; standard input when omitted
    path: Option<String>,

    /// Only print subtree(s) matching a dotted path (e.g. moov.trak[0].mdia)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Hex-dump the payload of every atom with this tag (e.g. --raw stsd)
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Bytes to dump per atom with --raw (0 means entire payload)
    #[arg(long, default_value_t = 0)]
    bytes: u64,

    /// Reject container nesting deeper than this
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Reject any atom declaring more bytes than this
    #[arg(long)]
    max_atom_size: Option<u64>,

    /// Emit JSON instead of the text tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Log parser progress to stderr
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins, otherwise the verbose flag picks the level
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "atomseeker=debug".to_string()
        } else {
            "atomseeker=warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(io::stderr)
        .init();

    let mut input: Box<dyn ReadSeek> = match &args.path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path))?,
        )),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Box::new(Cursor::new(buf))
        }
    };

    let mut options = ParseOptions::default().with_max_depth(args.max_depth);
    if let Some(max) = args.max_atom_size {
        options = options.with_max_atom_size(max);
    }
    let top = get_atoms(&mut input, options, |reg| reg)?;

    let targets: Vec<&Atom> = if let Some(path) = &args.filter {
        select_by_path(&top, path)
    } else {
        top.iter().collect()
    };

    // JSON mode: output JSON and exit (no tree or raw to keep output clean)
    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    let reg = default_registry();
    for a in &targets {
        print_atom(a, 0, &reg);
    }

    if let Some(sel) = &args.raw {
        let typ = FourCC::from_str(sel)
            .with_context(|| format!("--raw expects a 4-character tag, got {:?}", sel))?;
        let mut matches = Vec::new();
        select_atoms(&top, typ, &mut matches);
        for (i, a) in matches.into_iter().enumerate() {
            let dump = payload_hex(&mut input, a, args.bytes)?;
            println!(
                "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
                i, a.typ, dump.offset, dump.length
            );
            print!("{}", dump.hex);
        }
    }

    Ok(())
}

// ---------- Human-readable tree ----------

fn print_atom(a: &Atom, depth: usize, reg: &Registry) {
    let indent = " ".repeat(depth);
    let name = reg.name(a.typ).map(|n| format!(" [{}]", n)).unwrap_or_default();
    match (a.version, a.flags) {
        (Some(version), Some(flags)) => println!(
            "{indent}{}: {:08x} {:08x}{name} (ver={}, flags=0x{:06x})",
            a.typ, a.size, a.offset, version, flags
        ),
        _ => println!("{indent}{}: {:08x} {:08x}{name}", a.typ, a.size, a.offset),
    }
    for (k, v) in a.elements.iter() {
        println!(" {indent}| '{}' = {}", k, v);
    }
    for c in a.children() {
        print_atom(c, depth + 1, reg);
    }
}

// ---------- Selection ----------

fn select_atoms<'a>(list: &'a [Atom], typ: FourCC, out: &mut Vec<&'a Atom>) {
    for a in list {
        if a.typ == typ {
            out.push(a);
        }
        select_atoms(a.children(), typ, out);
    }
}

// Filter path: moov.trak[0].mdia.minf.stbl
fn select_by_path<'a>(roots: &'a [Atom], path: &str) -> Vec<&'a Atom> {
    let mut current: Vec<&'a Atom> = Vec::new();

    for (depth, seg) in path.split('.').enumerate() {
        let (name, idx) = parse_segment(seg);
        let fourcc = FourCC::from_str(name).unwrap_or(FourCC(*b"????"));

        let candidates: Vec<&'a [Atom]> = if depth == 0 {
            vec![roots]
        } else {
            current.iter().map(|&a| a.children()).collect()
        };

        let mut next = Vec::new();
        for list in candidates {
            let matches: Vec<&Atom> = list.iter().filter(|a| a.typ == fourcc).collect();
            match idx {
                Some(i) => next.extend(matches.get(i).copied()),
                None => next.extend(matches),
            }
        }

        current = next;
        if current.is_empty() {
            break;
        }
    }

    current
}

fn parse_segment(seg: &str) -> (&str, Option<usize>) {
    match seg.split_once('[') {
        Some((name, rest)) => (name, rest.strip_suffix(']').and_then(|i| i.parse().ok())),
        None => (seg, None),
    }
}
