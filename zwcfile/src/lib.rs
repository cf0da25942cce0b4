//! Persistent dumps of compiled function bodies.
//!
//! A dump file concatenates word-code programs with a name directory, and
//! carries the whole image twice, once per byte order. The first word of
//! the file decides: a reader seeing the magic in its own order uses the
//! copy in front of it; a reader seeing the swapped magic seeks to the
//! other copy, whose words were swapped at write time and are therefore
//! native to it. Flag and offset fields in the prelude are stored as
//! individual bytes so either reader can navigate.
//!
//! File layout per copy:
//!
//!   word 0      magic
//!   word 1      flags byte, then a 24-bit byte offset to the other copy
//!   words 2-11  version string, NUL padded
//!   then, per function: a six-word record { start, len, npats, strs,
//!   hlen, tail } followed by the NUL-terminated name padded to a word
//!   boundary; the first record's start doubles as the header length
//!   after that: the function bodies (code words, then pool bytes,
//!   padded to a word boundary)
//!
//! Loading either reads a body into fresh memory or maps the file; maps
//! are shared process-wide and released when the last program referring
//! into them is dropped.

use byteorder::{ReadBytesExt, WriteBytesExt};
use memmap::Mmap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use util::{swap_word, Endian};
use zwc::program::Backing;
use zwc::{parse_string, Alloc, Eprog};

/// Extension of dump files.
pub const FD_EXT: &str = ".zwc";

const FD_MAGIC: u32 = 0x0102_0304;
const FD_OMAGIC: u32 = 0x0403_0201;
/// Prelude length in words: magic, flags word, version string.
const FD_PRELEN: u32 = 12;
/// Smallest total body size worth mapping, in bytes.
const FD_MINMAP: u32 = 4096;

const FDF_MAP: u8 = 1;
const FDF_OTHER: u8 = 2;

const VERSION_BYTES: usize = 40;
const HEAD_WORDS: u32 = 6;

fn version() -> [u8; VERSION_BYTES] {
    let mut v = [0u8; VERSION_BYTES];
    let s = concat!("zwc-", env!("CARGO_PKG_VERSION"));
    v[..s.len()].copy_from_slice(s.as_bytes());
    v
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error, PathBuf),
    Parse(zwc::ParseError, PathBuf),
    /// Not a dump file, or a truncated one.
    BadDump(PathBuf),
    /// A dump from another version.
    Version(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "{}: {}", path.display(), err),
            Error::Parse(err, path) => write!(f, "{}: {}", path.display(), err),
            Error::BadDump(path) => write!(f, "invalid dump file: {}", path.display()),
            Error::Version(path) => {
                write!(f, "dump file version mismatch: {}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {}

/// How a dump should be loaded, recorded in its header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapChoice {
    /// Always read bodies into fresh memory.
    Read,
    /// Map when the total body size reaches the threshold.
    Auto,
    /// Always map.
    Map,
}

/// One function's directory record.
#[derive(Clone, Debug, PartialEq)]
pub struct FdEntry {
    /// Source path the body was compiled from.
    pub name: Vec<u8>,
    /// Offset of the base name within `name`.
    pub tail: u32,
    /// Word offset of the body from the copy start.
    pub start: u32,
    /// Byte length of the body (code plus pool, unpadded).
    pub len: u32,
    pub npats: u32,
    /// Byte offset of the pool within the body.
    pub strs: u32,
}

impl FdEntry {
    pub fn tail_name(&self) -> &[u8] {
        &self.name[self.tail as usize..]
    }

    fn nwords(&self) -> usize {
        (self.strs / 4) as usize
    }

    fn strs_len(&self) -> usize {
        (self.len - self.strs) as usize
    }
}

/// A parsed dump header: the copy the reader picked plus its directory.
#[derive(Debug)]
pub struct DumpHeader {
    pub mapped: bool,
    pub version: Vec<u8>,
    pub entries: Vec<FdEntry>,
    /// Byte offset of the picked copy within the file.
    base: u64,
}

impl DumpHeader {
    /// Finds a function by base name, by linear scan.
    pub fn find(&self, name: &[u8]) -> Option<&FdEntry> {
        self.entries.iter().find(|e| e.tail_name() == name)
    }
}

fn read_prelude(f: &mut File) -> io::Result<(u32, u8, u32, [u8; VERSION_BYTES])> {
    let magic = f.read_u32::<Endian>()?;
    let mut packed = [0u8; 4];
    f.read_exact(&mut packed)?;
    let flags = packed[0];
    let other =
        packed[1] as u32 | ((packed[2] as u32) << 8) | ((packed[3] as u32) << 16);
    let mut ver = [0u8; VERSION_BYTES];
    f.read_exact(&mut ver)?;
    Ok((magic, flags, other, ver))
}

/// Reads and validates the header of a dump file, following the
/// other-order pointer when the first copy is foreign.
pub fn load_dump_header(path: &Path) -> Result<DumpHeader, Error> {
    let mut f = File::open(path).map_err(|e| Error::Io(e, path.to_owned()))?;
    let (magic, mut flags, other, mut ver) = read_prelude(&mut f)
        .map_err(|_| Error::BadDump(path.to_owned()))?;

    let base = match magic {
        FD_MAGIC => 0u64,
        FD_OMAGIC => {
            f.seek(SeekFrom::Start(other as u64))
                .map_err(|e| Error::Io(e, path.to_owned()))?;
            let pre = read_prelude(&mut f).map_err(|_| Error::BadDump(path.to_owned()))?;
            flags = pre.1;
            ver = pre.3;
            other as u64
        }
        _ => return Err(Error::BadDump(path.to_owned())),
    };
    if ver != version() {
        return Err(Error::Version(path.to_owned()));
    }

    // The first record's start field is the total header length.
    let hlen = f
        .read_u32::<Endian>()
        .map_err(|_| Error::BadDump(path.to_owned()))?;
    if hlen <= FD_PRELEN {
        return Err(Error::BadDump(path.to_owned()));
    }
    let mut rest = vec![0u8; ((hlen - FD_PRELEN) as usize) * 4 - 4];
    f.read_exact(&mut rest)
        .map_err(|_| Error::BadDump(path.to_owned()))?;
    let mut dir = hlen.to_ne_bytes().to_vec();
    dir.extend_from_slice(&rest);

    let words = util::bytes_to_words(&dir);
    let mut entries = Vec::new();
    let mut i = 0usize;
    while i < words.len() {
        if i + HEAD_WORDS as usize > words.len() {
            return Err(Error::BadDump(path.to_owned()));
        }
        let (start, len, npats, strs, ehlen, tail) = (
            words[i],
            words[i + 1],
            words[i + 2],
            words[i + 3],
            words[i + 4],
            words[i + 5],
        );
        if ehlen <= HEAD_WORDS || i + ehlen as usize > words.len() {
            return Err(Error::BadDump(path.to_owned()));
        }
        let name_bytes = &dir[(i + HEAD_WORDS as usize) * 4..(i + ehlen as usize) * 4];
        let name_end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        entries.push(FdEntry {
            name: name_bytes[..name_end].to_vec(),
            tail,
            start,
            len,
            npats,
            strs,
        });
        i += ehlen as usize;
    }

    let ver_end = ver.iter().position(|&b| b == 0).unwrap_or(VERSION_BYTES);
    Ok(DumpHeader {
        mapped: flags & FDF_MAP != 0,
        version: ver[..ver_end].to_vec(),
        entries,
        base,
    })
}

fn body_words(prog: &Eprog) -> u32 {
    prog.prog().len() as u32 + (prog.strs().len() as u32 + 3) / 4
}

fn name_words(name: &str) -> u32 {
    (name.len() as u32 + 4) / 4
}

fn tail_offset(name: &str) -> u32 {
    match name.rfind('/') {
        Some(i) => i as u32 + 1,
        None => 0,
    }
}

/// Writes `progs` to a dump file, both byte orders. `swap_first` writes
/// the foreign-order copy first, producing the file a host of the other
/// byte order would have written; readers then take the seek-to-other
/// path.
pub fn write_progs(
    dump: &Path,
    progs: &[(String, Eprog)],
    map: MapChoice,
    swap_first: bool,
) -> Result<(), Error> {
    let io_err = |e| Error::Io(e, dump.to_owned());

    let mut hlen = FD_PRELEN;
    let mut tlen = 0u32;
    for (name, prog) in progs {
        hlen += HEAD_WORDS + name_words(name);
        tlen += body_words(prog);
    }
    let other_off = (hlen + tlen) * 4;
    let map_flag = match map {
        MapChoice::Read => false,
        MapChoice::Map => true,
        MapChoice::Auto => tlen * 4 >= FD_MINMAP,
    };

    let file = File::create(dump).map_err(io_err)?;
    let mut w = BufWriter::new(file);

    for copy in 0..2u32 {
        let swapped = (copy == 0) == swap_first;
        let magic = if swapped { FD_OMAGIC } else { FD_MAGIC };
        w.write_u32::<Endian>(magic).map_err(io_err)?;
        let mut flags = if map_flag { FDF_MAP } else { 0 };
        if copy == 1 {
            flags |= FDF_OTHER;
        }
        let packed = [
            flags,
            (other_off & 0xff) as u8,
            ((other_off >> 8) & 0xff) as u8,
            ((other_off >> 16) & 0xff) as u8,
        ];
        w.write_all(&packed).map_err(io_err)?;
        w.write_all(&version()).map_err(io_err)?;

        let put = |w: &mut BufWriter<File>, word: u32| {
            w.write_u32::<Endian>(if swapped { swap_word(word) } else { word })
        };

        let mut start = hlen;
        for (name, prog) in progs {
            let ehlen = HEAD_WORDS + name_words(name);
            let len = prog.prog().len() as u32 * 4 + prog.strs().len() as u32;
            put(&mut w, start).map_err(io_err)?;
            put(&mut w, len).map_err(io_err)?;
            put(&mut w, prog.npats() as u32).map_err(io_err)?;
            put(&mut w, prog.prog().len() as u32 * 4).map_err(io_err)?;
            put(&mut w, ehlen).map_err(io_err)?;
            put(&mut w, tail_offset(name)).map_err(io_err)?;
            w.write_all(name.as_bytes()).map_err(io_err)?;
            let pad = name_words(name) as usize * 4 - name.len();
            w.write_all(&vec![0u8; pad]).map_err(io_err)?;
            start += body_words(prog);
        }
        for (_, prog) in progs {
            for &word in prog.prog() {
                put(&mut w, word).map_err(io_err)?;
            }
            w.write_all(prog.strs()).map_err(io_err)?;
            let pad = (4 - prog.strs().len() % 4) % 4;
            w.write_all(&vec![0u8; pad]).map_err(io_err)?;
        }
    }
    w.flush().map_err(io_err)?;
    Ok(())
}

/// Parses each source file and writes the dump.
pub fn build_dump(
    dump: &Path,
    files: &[PathBuf],
    aliases: bool,
    map: MapChoice,
) -> Result<(), Error> {
    let mut progs = Vec::new();
    for f in files {
        let src = std::fs::read(f).map_err(|e| Error::Io(e, f.clone()))?;
        let prog = parse_string(&src, aliases).map_err(|e| Error::Parse(e, f.clone()))?;
        progs.push((f.to_string_lossy().into_owned(), prog));
    }
    write_progs(dump, &progs, map, false)
}

/// One live mapping of a dump file. Programs loaded from it share this
/// through a reference count; the mapping is released when the last of
/// them goes away.
pub struct FuncDump {
    path: PathBuf,
    map: Mmap,
    base: usize,
    entries: Vec<FdEntry>,
}

impl Backing for FuncDump {
    fn bytes(&self) -> &[u8] {
        &self.map[self.base..]
    }
}

static DUMPS: Mutex<Vec<Weak<FuncDump>>> = Mutex::new(Vec::new());

fn find_mapping(path: &Path) -> Option<Arc<FuncDump>> {
    let mut dumps = DUMPS.lock().unwrap();
    dumps.retain(|w| w.strong_count() > 0);
    dumps
        .iter()
        .filter_map(|w| w.upgrade())
        .find(|d| d.path == path)
}

fn map_dump(path: &Path, hdr: &DumpHeader) -> Option<Arc<FuncDump>> {
    let file = File::open(path).ok()?;
    // The map is read-only and the file is never truncated while dumps
    // are live.
    let map = unsafe { Mmap::map(&file).ok()? };
    let dump = Arc::new(FuncDump {
        path: path.to_owned(),
        map,
        base: hdr.base as usize,
        entries: hdr.entries.clone(),
    });
    DUMPS.lock().unwrap().push(Arc::downgrade(&dump));
    Some(dump)
}

fn prog_from_mapping(dump: &Arc<FuncDump>, name: &[u8]) -> Option<Eprog> {
    let e = dump.entries.iter().find(|e| e.tail_name() == name)?;
    let backing: Arc<dyn Backing> = dump.clone();
    Some(Eprog::mapped(
        backing,
        e.start as usize,
        e.nwords(),
        e.strs_len(),
        e.npats as usize,
    ))
}

fn read_body(path: &Path, hdr: &DumpHeader, e: &FdEntry) -> Option<Eprog> {
    let mut f = File::open(path).ok()?;
    f.seek(SeekFrom::Start(hdr.base + e.start as u64 * 4)).ok()?;
    let mut body = vec![0u8; e.len as usize];
    f.read_exact(&mut body).ok()?;
    let words = util::bytes_to_words(&body[..e.strs as usize]);
    let strs = body[e.strs as usize..].to_vec();
    Some(Eprog::from_parts(words, strs, e.npats as usize, Alloc::Real))
}

fn newer_than(a: &Path, b: &Path) -> bool {
    match (
        std::fs::metadata(a).and_then(|m| m.modified()),
        std::fs::metadata(b).and_then(|m| m.modified()),
    ) {
        (Ok(ma), Ok(mb)) => ma > mb,
        _ => false,
    }
}

/// Serves `name` from a dump file if it is present and not older than
/// `source`. `dump` may also be a directory holding `<name>.zwc`. The
/// result is `None` when the dump is missing, stale, foreign, or lacks
/// the function.
pub fn try_dump_file(dump: &Path, name: &str, source: Option<&Path>) -> Option<Eprog> {
    if let Some(mapping) = find_mapping(dump) {
        return prog_from_mapping(&mapping, name.as_bytes());
    }

    let mut path = dump.to_owned();
    let hdr = match load_dump_header(&path) {
        Ok(hdr) => hdr,
        Err(_) => {
            // Directory of per-function dumps.
            path = dump.join(format!("{}{}", name, FD_EXT));
            load_dump_header(&path).ok()?
        }
    };
    if let Some(source) = source {
        if newer_than(source, &path) {
            return None;
        }
    }
    let entry = hdr.find(name.as_bytes())?;

    if hdr.mapped {
        let mapping = if let Some(m) = find_mapping(&path) {
            m
        } else {
            map_dump(&path, &hdr)?
        };
        prog_from_mapping(&mapping, name.as_bytes())
    } else {
        read_body(&path, &hdr, entry)
    }
}

/// Number of programs currently referring into the mapping of `path`.
pub fn dump_ref_count(path: &Path) -> usize {
    match find_mapping(path) {
        // One reference is the probe itself.
        Some(d) => Arc::strong_count(&d) - 1,
        None => 0,
    }
}
