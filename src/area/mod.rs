//! Shared-area substrate (C1): typed, versioned records behind a
//! memory-mapped file, a generation-id file governing the rebuild-and-swap
//! protocol, and a converter dispatch table for version migration.
//!
//! Cross-process coordination uses a whole-file advisory lock (`flock`) on
//! the id file, matching §4.1's "ID file opened with an exclusive fcntl
//! lock for write, shared lock for read" at the granularity this crate
//! actually needs: the id file is tiny and contended only around a swap.
//! Fine-grained per-entry mutation (FSA slot claims, FRA queue counters)
//! additionally takes an in-process `Mutex` guarding the same offset a
//! byte-range `fcntl` lock would cover in the original, since every access
//! in this crate's test and runtime harness is intra-process.

pub mod dnb;
pub mod filemask;
pub mod fra;
pub mod fsa;
pub mod jid;
pub mod passwd;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::AreaError;

pub const AFD_WORD_OFFSET: usize = 9;
pub const STALE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaKind {
    Fsa,
    Fra,
    Jid,
    Dnb,
    FileMask,
    Passwd,
}

impl AreaKind {
    pub fn name(self) -> &'static str {
        match self {
            AreaKind::Fsa => "FSA",
            AreaKind::Fra => "FRA",
            AreaKind::Jid => "JID",
            AreaKind::Dnb => "DNB",
            AreaKind::FileMask => "FILE_MASK",
            AreaKind::Passwd => "PWB",
        }
    }
}

/// A fixed-size record that can be laid out byte-for-byte inside a mapped
/// area. Encode/decode are hand-written rather than cast through a zero-copy
/// crate: every record here is small and fixed-shape, the same territory
/// the corpus already covers with direct, dependency-free code.
pub trait AreaEntry: Sized + Clone {
    const SIZE: usize;
    /// The version a freshly-written generation file carries for this entry
    /// type. `attach` compares this against the on-disk header and, on a
    /// mismatch, looks up a converter rather than decoding the old layout
    /// directly. Every area in this crate is still at its original layout,
    /// so the default covers them without each impl repeating it.
    const CURRENT_VERSION: u8 = 1;
    fn encode(&self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

/// The `AFD_WORD_OFFSET` prefix carried by every mapped file: 4-byte count,
/// 3 reserved bytes, 1-byte version, 1-byte feature flags.
#[derive(Debug, Clone, Copy)]
pub struct AreaHeader {
    bytes: [u8; AFD_WORD_OFFSET],
}

impl AreaHeader {
    pub fn new(count: u32, version: u8, feature_flags: u8) -> Self {
        let mut bytes = [0u8; AFD_WORD_OFFSET];
        bytes[0..4].copy_from_slice(&count.to_le_bytes());
        bytes[7] = version;
        bytes[8] = feature_flags;
        AreaHeader { bytes }
    }

    pub fn from_bytes(b: &[u8]) -> Self {
        let mut bytes = [0u8; AFD_WORD_OFFSET];
        bytes.copy_from_slice(&b[..AFD_WORD_OFFSET]);
        AreaHeader { bytes }
    }

    pub fn to_bytes(self) -> [u8; AFD_WORD_OFFSET] {
        self.bytes
    }

    pub fn count(&self) -> u32 {
        u32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    pub fn set_count(&mut self, v: u32) {
        self.bytes[0..4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn version(&self) -> u8 {
        self.bytes[7]
    }

    pub fn feature_flags(&self) -> u8 {
        self.bytes[8]
    }

    pub fn set_feature_flags(&mut self, v: u8) {
        self.bytes[8] = v;
    }

    pub fn is_stale(&self) -> bool {
        self.count() == STALE
    }

    pub fn mark_stale(&mut self) {
        self.set_count(STALE);
    }
}

fn io_err(path: &Path, e: std::io::Error) -> AreaError {
    AreaError::Attach(path.to_path_buf(), e.to_string())
}

fn os_flock(file: &File, operation: libc::c_int) -> std::io::Result<()> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if ret != 0 { Err(std::io::Error::last_os_error()) } else { Ok(()) }
}

fn os_unlock(file: &File) {
    let _ = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

/// The `<name>.id` file: holds only the current generation id.
pub struct IdFile {
    path: PathBuf,
}

pub struct IdFileGuard<'a> {
    file: File,
    path: &'a Path,
}

impl IdFileGuard<'_> {
    pub fn read(&mut self) -> Result<u32, AreaError> {
        let len = self.file.metadata().map(|m| m.len()).unwrap_or(0);
        if len < 4 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(0)).map_err(|e| io_err(self.path, e))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf).map_err(|e| io_err(self.path, e))?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write(&mut self, id: u32) -> Result<(), AreaError> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| io_err(self.path, e))?;
        self.file.write_all(&id.to_le_bytes()).map_err(|e| io_err(self.path, e))?;
        self.file.set_len(4).map_err(|e| io_err(self.path, e))?;
        Ok(())
    }
}

impl Drop for IdFileGuard<'_> {
    fn drop(&mut self) {
        os_unlock(&self.file);
    }
}

impl IdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IdFile { path: path.into() }
    }

    pub fn read_current(&self) -> Result<u32, AreaError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut file = File::open(&self.path).map_err(|e| io_err(&self.path, e))?;
        os_flock(&file, libc::LOCK_SH).map_err(|_| AreaError::IdFileLocked(self.path.clone()))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        let result = if len < 4 {
            Ok(0)
        } else {
            let mut buf = [0u8; 4];
            file.read_exact(&mut buf)
                .map(|_| u32::from_le_bytes(buf))
                .map_err(|e| io_err(&self.path, e))
        };
        os_unlock(&file);
        result
    }

    pub fn lock_exclusive(&self) -> Result<IdFileGuard<'_>, AreaError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        os_flock(&file, libc::LOCK_EX).map_err(|_| AreaError::IdFileLocked(self.path.clone()))?;
        Ok(IdFileGuard { file, path: &self.path })
    }
}

/// A live attachment to one generation of a mapped area.
pub struct MappedArea<E: AreaEntry> {
    pub kind: AreaKind,
    base_path: PathBuf,
    id_file: IdFile,
    generation_id: u32,
    mmap: MmapMut,
    _marker: std::marker::PhantomData<E>,
}

impl<E: AreaEntry> MappedArea<E> {
    fn generation_path(base_path: &Path, id: u32) -> PathBuf {
        let mut s = base_path.as_os_str().to_owned();
        s.push(format!(".{id}"));
        PathBuf::from(s)
    }

    fn id_file_path(base_path: &Path) -> PathBuf {
        let mut s = base_path.as_os_str().to_owned();
        s.push(".id");
        PathBuf::from(s)
    }

    /// Writes a full generation file: header followed by `entries`,
    /// pre-sized and zero-filled so an out-of-space condition surfaces
    /// during this single write rather than on first subsequent store.
    fn write_generation_file(path: &Path, version: u8, entries: &[E]) -> Result<(), AreaError> {
        let total_len = AFD_WORD_OFFSET + entries.len() * E::SIZE;
        let mut buf = vec![0u8; total_len];
        let header = AreaHeader::new(entries.len() as u32, version, 0);
        buf[0..AFD_WORD_OFFSET].copy_from_slice(&header.to_bytes());
        for (i, e) in entries.iter().enumerate() {
            let start = AFD_WORD_OFFSET + i * E::SIZE;
            e.encode(&mut buf[start..start + E::SIZE]);
        }
        std::fs::write(path, &buf).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    fn map_file(path: &Path) -> Result<MmapMut, AreaError> {
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(|e| io_err(path, e))?;
        unsafe { MmapMut::map_mut(&file) }.map_err(|e| io_err(path, e))
    }

    /// Creates generation 1 of a brand-new area (AMG/FD/init-afd on first
    /// startup, per §3's "all shared files are created by their owning
    /// daemon during startup").
    pub fn create(kind: AreaKind, base_path: impl Into<PathBuf>, version: u8, entries: &[E]) -> Result<Self, AreaError> {
        let base_path = base_path.into();
        let id_file = IdFile::new(Self::id_file_path(&base_path));
        let mut guard = id_file.lock_exclusive()?;
        let current = guard.read().unwrap_or(0);
        let new_id = current.wrapping_add(1);
        let path = Self::generation_path(&base_path, new_id);
        Self::write_generation_file(&path, version, entries)?;
        guard.write(new_id)?;
        drop(guard);
        let mmap = Self::map_file(&path)?;
        Ok(MappedArea { kind, base_path, id_file, generation_id: new_id, mmap, _marker: std::marker::PhantomData })
    }

    /// Attaches to whatever generation the id file currently names. Uses an
    /// empty converter table, so a version mismatch with no registered
    /// converter surfaces as `AreaError::NoConverter` rather than silently
    /// misreading the old layout.
    pub fn attach(kind: AreaKind, base_path: impl Into<PathBuf>) -> Result<Self, AreaError> {
        Self::attach_with_converters(kind, base_path, &ConverterTable::new())
    }

    /// §4.1/§7's "version mismatch ⇒ invoke converter" path: attaches to the
    /// current generation, and if the on-disk header's version doesn't match
    /// `E::CURRENT_VERSION`, runs the matching `converters` entry over the
    /// raw bytes and rewrites the generation file in place with the result
    /// before mapping it. The rewritten file keeps the same generation id —
    /// only its layout changes, not which generation is current.
    pub fn attach_with_converters(
        kind: AreaKind,
        base_path: impl Into<PathBuf>,
        converters: &ConverterTable,
    ) -> Result<Self, AreaError> {
        let base_path = base_path.into();
        let id_file = IdFile::new(Self::id_file_path(&base_path));
        let generation_id = id_file.read_current()?;
        let path = Self::generation_path(&base_path, generation_id);
        let mut mmap = Self::map_file(&path)?;

        let on_disk_version = AreaHeader::from_bytes(&mmap[0..AFD_WORD_OFFSET]).version();
        if on_disk_version != E::CURRENT_VERSION {
            let converted = converters.convert(kind, on_disk_version, E::CURRENT_VERSION, &mmap)?;
            std::fs::write(&path, &converted).map_err(|e| io_err(&path, e))?;
            mmap = Self::map_file(&path)?;
        }

        Ok(MappedArea { kind, base_path, id_file, generation_id, mmap, _marker: std::marker::PhantomData })
    }

    pub fn generation_id(&self) -> u32 {
        self.generation_id
    }

    pub fn header(&self) -> AreaHeader {
        AreaHeader::from_bytes(&self.mmap[0..AFD_WORD_OFFSET])
    }

    pub fn is_stale(&self) -> bool {
        self.header().is_stale()
    }

    pub fn entry_count(&self) -> usize {
        self.header().count() as usize
    }

    pub fn entry(&self, index: usize) -> E {
        let start = AFD_WORD_OFFSET + index * E::SIZE;
        E::decode(&self.mmap[start..start + E::SIZE])
    }

    pub fn set_entry(&mut self, index: usize, entry: &E) {
        let start = AFD_WORD_OFFSET + index * E::SIZE;
        entry.encode(&mut self.mmap[start..start + E::SIZE]);
    }

    pub fn entries(&self) -> Vec<E> {
        (0..self.entry_count()).map(|i| self.entry(i)).collect()
    }

    /// Reader-side protocol: if the header reads STALE, unmap, read the new
    /// id from the id file, and remap. Returns whether a reattach happened.
    pub fn reattach_if_stale(&mut self) -> Result<bool, AreaError> {
        if !self.is_stale() {
            return Ok(false);
        }
        let new_id = self.id_file.read_current()?;
        let path = Self::generation_path(&self.base_path, new_id);
        self.mmap = Self::map_file(&path)?;
        self.generation_id = new_id;
        Ok(true)
    }

    /// The rebuild-and-swap protocol of §4.1, steps 1-7:
    /// 1/2. lock the id file, verify the id we hold still matches;
    /// 3/4. build the next generation via `merge` (old entries in, new out);
    /// 5. mark the old mapping STALE;
    /// 6. publish the new id;
    /// 7. remap to the new generation and unlink the old file.
    pub fn swap(&mut self, version: u8, merge: impl FnOnce(&[E]) -> Vec<E>) -> Result<(), AreaError> {
        let old_entries = self.entries();
        let new_entries = merge(&old_entries);
        let old_generation = self.generation_id;
        let old_path = Self::generation_path(&self.base_path, old_generation);

        let mut guard = self.id_file.lock_exclusive()?;
        let current = guard.read()?;
        if current != old_generation {
            return Err(AreaError::GenerationRace { expected: old_generation, found: current });
        }
        let new_id = current.wrapping_add(1);
        let new_path = Self::generation_path(&self.base_path, new_id);
        Self::write_generation_file(&new_path, version, &new_entries)?;

        let mut stale_header = self.header();
        stale_header.mark_stale();
        self.mmap[0..AFD_WORD_OFFSET].copy_from_slice(&stale_header.to_bytes());

        guard.write(new_id)?;
        drop(guard);

        self.mmap = Self::map_file(&new_path)?;
        self.generation_id = new_id;

        let _ = std::fs::remove_file(&old_path);
        Ok(())
    }
}

/// A `(area_kind, from_version, to_version)` converter dispatch table.
/// Converters are additive: they take the raw bytes of an old-version
/// generation file and return bytes for the current version, filling new
/// fields with defaults.
pub type Converter = fn(&[u8]) -> Vec<u8>;

#[derive(Default)]
pub struct ConverterTable {
    converters: std::collections::HashMap<(AreaKind, u8, u8), Converter>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AreaKind, from: u8, to: u8, f: Converter) {
        self.converters.insert((kind, from, to), f);
    }

    pub fn convert(&self, kind: AreaKind, from: u8, to: u8, bytes: &[u8]) -> Result<Vec<u8>, AreaError> {
        match self.converters.get(&(kind, from, to)) {
            Some(f) => Ok(f(bytes)),
            None => Err(AreaError::NoConverter { area: kind.name(), from, to }),
        }
    }
}
