//! Shared test utilities for integration tests.
//!
//! The engine is format-agnostic, so the tests drive it through a tiny
//! fixture container ("FXAR") whose parser is registered like any other
//! format. Builders here produce single-volume, multi-volume and solid
//! FXAR archives in memory.
//!
//! Volume layout:
//!
//! ```text
//! "FXAR" flags:u8                      flags: 1 solid, 2 multi-volume, 4 first volume
//! ( 'F' name_len:u16 name entry_flags:u8 method:u8
//!       size:u64 packed:u64 crc:u32 mtime:i64 data[packed] )*
//! 'Z'                                  end of volume
//! ```
//!
//! Entry flags: 1 directory, 2 split before, 4 split after, 8 encrypted,
//! 16 not raw-skippable, 32 AES-256 (with 8). All integers are little-endian.
//!
//! Methods: 0 stored, 1 deflate, 2 bzip2, 3 raw LZMA without end marker,
//! 4 LZMA2, 5 PPMd. Codec properties are fixed per method, so the record
//! does not carry them. AES entries are encrypted with [`PASSWORD`] after
//! compression and zero-padded to the cipher block size; a solid stream is
//! encrypted as a whole.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use volread::codec::CompressionKind;
use volread::format::{ArchiveFormat, FormatDescriptor, FormatRegistry, HeaderParser};
use volread::{
    Encryption, Error, FileHeader, ReaderOptions, Result, Source, SourceCursor, Timestamp,
    VolumeInfo,
};

pub const MAGIC: &[u8; 4] = b"FXAR";

pub const VOLUME_SOLID: u8 = 1;
pub const VOLUME_MULTI: u8 = 2;
pub const VOLUME_FIRST: u8 = 4;

pub const ENTRY_DIR: u8 = 1;
pub const ENTRY_SPLIT_BEFORE: u8 = 2;
pub const ENTRY_SPLIT_AFTER: u8 = 4;
pub const ENTRY_ENCRYPTED: u8 = 8;
pub const ENTRY_OPAQUE: u8 = 16;
pub const ENTRY_AES: u8 = 32;

pub const METHOD_STORED: u8 = 0;
pub const METHOD_DEFLATE: u8 = 1;
pub const METHOD_BZIP2: u8 = 2;
pub const METHOD_LZMA: u8 = 3;
pub const METHOD_LZMA2: u8 = 4;
pub const METHOD_PPMD: u8 = 5;
pub const METHOD_UNKNOWN: u8 = 9;

/// Password of every AES fixture entry.
pub const PASSWORD: &str = "fixture password";

const AES_CYCLES_POWER: u8 = 4;
const AES_SALT: [u8; 8] = *b"fxarsalt";
const AES_IV: [u8; 16] = [0x24; 16];
const AES_BLOCK: usize = 16;

/// LZMA2 dictionary size property byte for 64 KiB.
const LZMA2_DICT_PROP: u8 = 8;
const PPMD_ORDER: u32 = 6;
const PPMD_MEM_SIZE: u32 = 1 << 20;

/// Fixed modification time written for every entry.
pub const MTIME: i64 = 1_700_000_000;

// ============================================================================
// Parser
// ============================================================================

/// Header parser for FXAR volumes.
#[derive(Debug, Default)]
pub struct FxarParser;

fn read_field(cursor: &mut SourceCursor<'_>, buf: &mut [u8]) -> Result<()> {
    let offset = cursor.position();
    if cursor.read_exact_or_eof(buf)? {
        Ok(())
    } else {
        Err(Error::corrupt_header(offset, "record ends early"))
    }
}

fn read_u64(cursor: &mut SourceCursor<'_>) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_field(cursor, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

impl HeaderParser for FxarParser {
    fn open_volume(
        &mut self,
        cursor: &mut SourceCursor<'_>,
        _options: &ReaderOptions,
    ) -> Result<VolumeInfo> {
        let mut head = [0u8; 5];
        if !cursor.read_exact_or_eof(&mut head)? || &head[..4] != MAGIC {
            return Err(Error::InvalidFormat("not an FXAR volume".into()));
        }
        Ok(VolumeInfo {
            is_solid: head[4] & VOLUME_SOLID != 0,
            is_multi_volume: head[4] & VOLUME_MULTI != 0,
            is_first_volume: head[4] & VOLUME_FIRST != 0,
            headers_encrypted: false,
        })
    }

    fn next_header(&mut self, cursor: &mut SourceCursor<'_>) -> Result<Option<FileHeader>> {
        let offset = cursor.position();
        let mut tag = [0u8; 1];
        if !cursor.read_exact_or_eof(&mut tag)? || tag[0] == b'Z' {
            return Ok(None);
        }
        if tag[0] != b'F' {
            return Err(Error::corrupt_header(offset, "unknown record tag"));
        }

        let mut len = [0u8; 2];
        read_field(cursor, &mut len)?;
        let mut name = vec![0u8; u16::from_le_bytes(len) as usize];
        read_field(cursor, &mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| Error::corrupt_header(offset, "entry name is not UTF-8"))?;

        let mut flags_method = [0u8; 2];
        read_field(cursor, &mut flags_method)?;
        let [flags, method] = flags_method;
        let size = read_u64(cursor)?;
        let packed = read_u64(cursor)?;
        let mut crc = [0u8; 4];
        read_field(cursor, &mut crc)?;
        let mtime = read_u64(cursor)? as i64;

        let kind = match method {
            METHOD_STORED => CompressionKind::Stored,
            METHOD_DEFLATE => CompressionKind::Deflate,
            METHOD_BZIP2 => CompressionKind::BZip2,
            METHOD_LZMA => CompressionKind::Lzma,
            METHOD_LZMA2 => CompressionKind::Lzma2,
            METHOD_PPMD => CompressionKind::PPMd,
            other => CompressionKind::Unknown(u32::from(other)),
        };
        let mut header = FileHeader::new(name, kind);
        header.compression_properties = method_properties(method);
        header.flags.is_directory = flags & ENTRY_DIR != 0;
        header.flags.split_before = flags & ENTRY_SPLIT_BEFORE != 0;
        header.flags.split_after = flags & ENTRY_SPLIT_AFTER != 0;
        header.flags.is_encrypted = flags & ENTRY_ENCRYPTED != 0;
        if header.flags.is_encrypted {
            header.encryption = Some(if flags & ENTRY_AES != 0 {
                Encryption::Aes256Sha256 {
                    properties: aes_properties(),
                }
            } else {
                Encryption::ZipCrypto
            });
        }
        header.raw_skip = flags & ENTRY_OPAQUE == 0;
        header.size = size;
        header.compressed_size = packed;
        header.crc = (!header.flags.split_after && !header.flags.is_directory)
            .then(|| u32::from_le_bytes(crc));
        header.modified = Timestamp::from_unix_secs(mtime);
        header.raw_flags = u32::from(flags);
        Ok(Some(header))
    }
}

fn lzma_options() -> lzma_rust2::LzmaOptions {
    let mut options = lzma_rust2::LzmaOptions::with_preset(1);
    options.dict_size = 1 << 16;
    options
}

/// Codec properties the parser reports for each method.
fn method_properties(method: u8) -> Vec<u8> {
    match method {
        METHOD_LZMA => {
            let options = lzma_options();
            let mut props = vec![options.get_props()];
            props.extend_from_slice(&options.dict_size.to_le_bytes());
            props
        }
        METHOD_LZMA2 => vec![LZMA2_DICT_PROP],
        METHOD_PPMD => {
            let mut props = vec![PPMD_ORDER as u8];
            props.extend_from_slice(&PPMD_MEM_SIZE.to_le_bytes());
            props
        }
        _ => Vec::new(),
    }
}

/// AES properties: salt and IV present, sizes stored minus one.
fn aes_properties() -> Vec<u8> {
    let mut props = vec![
        0xC0 | AES_CYCLES_POWER,
        (((AES_SALT.len() - 1) as u8) << 4) | (AES_IV.len() - 1) as u8,
    ];
    props.extend_from_slice(&AES_SALT);
    props.extend_from_slice(&AES_IV);
    props
}

fn sniff_fxar(prefix: &[u8]) -> bool {
    prefix.starts_with(MAGIC)
}

fn new_fxar_parser() -> Box<dyn HeaderParser> {
    Box::new(FxarParser)
}

/// Registration record for FXAR.
pub fn fxar_descriptor() -> FormatDescriptor {
    FormatDescriptor {
        format: ArchiveFormat::Other("fxar"),
        matches: sniff_fxar,
        sniff_len: MAGIC.len(),
        factory: new_fxar_parser,
    }
}

/// A registry containing only FXAR.
pub fn formats() -> FormatRegistry {
    FormatRegistry::new().register(fxar_descriptor())
}

// ============================================================================
// Builders
// ============================================================================

/// One entry to be written into a fixture archive.
#[derive(Debug, Clone)]
pub struct FixtureEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub method: u8,
    pub flags: u8,
    /// Overrides the CRC written to the header.
    pub crc: Option<u32>,
    /// Overrides the size written to the header.
    pub size: Option<u64>,
}

impl FixtureEntry {
    pub fn file(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            method: METHOD_STORED,
            flags: 0,
            crc: None,
            size: None,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            flags: ENTRY_DIR,
            ..Self::file(name, b"")
        }
    }

    pub fn method(mut self, method: u8) -> Self {
        self.method = method;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    pub fn crc(mut self, crc: u32) -> Self {
        self.crc = Some(crc);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Encrypts the entry with AES-256 under [`PASSWORD`].
    pub fn aes(self) -> Self {
        self.flags(ENTRY_ENCRYPTED | ENTRY_AES)
    }

    fn is_aes(&self) -> bool {
        self.flags & ENTRY_AES != 0
    }
}

pub fn compress(method: u8, data: &[u8]) -> Vec<u8> {
    match method {
        METHOD_DEFLATE => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        METHOD_BZIP2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        METHOD_LZMA => {
            let mut writer =
                lzma_rust2::LzmaWriter::new_no_header(Vec::new(), &lzma_options(), false)
                    .unwrap();
            writer.write_all(data).unwrap();
            writer.finish().unwrap()
        }
        METHOD_LZMA2 => {
            let mut options = lzma_rust2::Lzma2Options::with_preset(1);
            options.lzma_options.dict_size = 1 << 16;
            let mut writer = lzma_rust2::Lzma2Writer::new(Vec::new(), options);
            writer.write_all(data).unwrap();
            writer.finish().unwrap()
        }
        METHOD_PPMD => {
            let mut encoder =
                ppmd_rust::Ppmd7Encoder::new(Vec::new(), PPMD_ORDER, PPMD_MEM_SIZE).unwrap();
            encoder.write_all(data).unwrap();
            encoder.finish(false).unwrap()
        }
        _ => data.to_vec(),
    }
}

/// Encrypts packed bytes the way AES fixture entries are stored.
#[cfg(feature = "aes")]
pub fn encrypt(packed: &[u8]) -> Vec<u8> {
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};

    let key = volread::crypto::derive_key(
        &volread::Password::new(PASSWORD),
        &AES_SALT,
        AES_CYCLES_POWER,
    )
    .unwrap();
    let mut buf = packed.to_vec();
    buf.resize(packed.len().div_ceil(AES_BLOCK) * AES_BLOCK, 0);
    let len = buf.len();
    cbc::Encryptor::<aes::Aes256>::new(&key.into(), &AES_IV.into())
        .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
        .unwrap();
    buf
}

#[cfg(not(feature = "aes"))]
pub fn encrypt(_packed: &[u8]) -> Vec<u8> {
    panic!("AES fixtures need the aes feature")
}

/// Reader options carrying the fixture password.
pub fn with_password() -> ReaderOptions {
    ReaderOptions::default().password(PASSWORD)
}

fn write_record(
    out: &mut Vec<u8>,
    entry: &FixtureEntry,
    flags: u8,
    size: u64,
    crc: u32,
    packed: &[u8],
) {
    out.push(b'F');
    out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    out.extend_from_slice(entry.name.as_bytes());
    out.push(flags);
    out.push(entry.method);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&(packed.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&MTIME.to_le_bytes());
    out.extend_from_slice(packed);
}

fn volume_header(flags: u8) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.push(flags);
    out
}

/// Builds FXAR archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    entries: Vec<FixtureEntry>,
    solid: bool,
    solid_method: u8,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.entry(FixtureEntry::file(name, data))
    }

    pub fn dir(self, name: &str) -> Self {
        self.entry(FixtureEntry::dir(name))
    }

    /// Compresses every entry into one continuous stream.
    pub fn solid(mut self, method: u8) -> Self {
        self.solid = true;
        self.solid_method = method;
        self
    }

    /// Returns the packed bytes of each entry.
    fn packed_entries(&self) -> Vec<Vec<u8>> {
        if !self.solid {
            return self
                .entries
                .iter()
                .map(|e| {
                    let packed = compress(e.method, &e.data);
                    if e.is_aes() { encrypt(&packed) } else { packed }
                })
                .collect();
        }

        let packed = self.solid_chunks();
        if !self.entries.iter().any(FixtureEntry::is_aes) {
            return packed;
        }

        // Encrypt the stream as a whole and cut it where the entries were cut;
        // the padding ends up in the last entry
        let joined: Vec<u8> = packed.concat();
        let mut encrypted = encrypt(&joined);
        let mut chunks = Vec::with_capacity(packed.len());
        for (index, chunk) in packed.iter().enumerate() {
            if index + 1 == packed.len() {
                chunks.push(std::mem::take(&mut encrypted));
            } else {
                let rest = encrypted.split_off(chunk.len());
                chunks.push(std::mem::replace(&mut encrypted, rest));
            }
        }
        chunks
    }

    /// Returns each entry's share of the solid stream.
    fn solid_chunks(&self) -> Vec<Vec<u8>> {
        match self.solid_method {
            METHOD_DEFLATE => {
                // A sync flush after each entry keeps entry boundaries on
                // byte boundaries of the shared stream.
                let mut encoder =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                let mut packed = Vec::new();
                let mut emitted = 0;
                let last = self.entries.len().saturating_sub(1);
                for (index, entry) in self.entries.iter().enumerate() {
                    encoder.write_all(&entry.data).unwrap();
                    if index == last {
                        break;
                    }
                    encoder.flush().unwrap();
                    let total = encoder.get_ref().len();
                    packed.push(encoder.get_ref()[emitted..total].to_vec());
                    emitted = total;
                }
                if !self.entries.is_empty() {
                    let out = encoder.finish().unwrap();
                    packed.push(out[emitted..].to_vec());
                }
                packed
            }
            _ => self.entries.iter().map(|e| e.data.clone()).collect(),
        }
    }

    fn method_of(&self, entry: &FixtureEntry) -> u8 {
        if self.solid {
            self.solid_method
        } else {
            entry.method
        }
    }

    fn header_values(entry: &FixtureEntry) -> (u64, u32) {
        (
            entry.size.unwrap_or(entry.data.len() as u64),
            entry.crc.unwrap_or_else(|| crc32fast::hash(&entry.data)),
        )
    }

    /// Builds a single-volume archive.
    pub fn build(&self) -> Vec<u8> {
        let mut flags = VOLUME_FIRST;
        if self.solid {
            flags |= VOLUME_SOLID;
        }
        let mut out = volume_header(flags);
        for (entry, packed) in self.entries.iter().zip(self.packed_entries()) {
            let (size, crc) = Self::header_values(entry);
            let mut record = entry.clone();
            record.method = self.method_of(entry);
            write_record(&mut out, &record, entry.flags, size, crc, &packed);
        }
        out.push(b'Z');
        out
    }

    /// Builds a multi-volume archive where each volume carries at most
    /// `capacity` bytes of entry data. Entries that do not fit are split.
    pub fn build_volumes(&self, capacity: usize) -> Vec<Vec<u8>> {
        assert!(capacity > 0);
        let mut base = VOLUME_MULTI;
        if self.solid {
            base |= VOLUME_SOLID;
        }

        let mut volumes = vec![volume_header(base | VOLUME_FIRST)];
        let mut used = 0usize;
        for (entry, packed) in self.entries.iter().zip(self.packed_entries()) {
            let (size, crc) = Self::header_values(entry);
            let mut record = entry.clone();
            record.method = self.method_of(entry);

            if used == capacity && !packed.is_empty() {
                close_volume(&mut volumes, base);
                used = 0;
            }
            let mut rest: &[u8] = &packed;
            let mut first = true;
            loop {
                let take = rest.len().min(capacity - used);
                let (chunk, tail) = rest.split_at(take);
                let mut flags = entry.flags;
                if !first {
                    flags |= ENTRY_SPLIT_BEFORE;
                }
                let (part_size, part_crc) = if tail.is_empty() {
                    (size, crc)
                } else {
                    flags |= ENTRY_SPLIT_AFTER;
                    (0, 0)
                };
                let volume = volumes.last_mut().unwrap();
                write_record(volume, &record, flags, part_size, part_crc, chunk);
                used += take;
                rest = tail;
                first = false;
                if rest.is_empty() {
                    break;
                }
                close_volume(&mut volumes, base);
                used = 0;
            }
        }
        volumes.last_mut().unwrap().push(b'Z');
        volumes
    }
}

fn close_volume(volumes: &mut Vec<Vec<u8>>, flags: u8) {
    volumes.last_mut().unwrap().push(b'Z');
    volumes.push(volume_header(flags));
}

// ============================================================================
// Sources
// ============================================================================

/// Wraps bytes as a forward-only source.
pub fn stream(data: Vec<u8>) -> Source {
    Source::stream(Cursor::new(data))
}

/// Wraps bytes as a seekable source.
pub fn seekable(data: Vec<u8>) -> Source {
    Source::seekable(Cursor::new(data))
}

/// Deterministic, poorly compressible test data.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}
