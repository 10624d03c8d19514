//! Storage media that hold queue files.
//!
//! A [`Volume`] is a mountable namespace of stores (a directory, a flash
//! partition, a map in memory). Each store it hands out is a [`Medium`]: a
//! fixed-size, byte-addressable region with positional reads and writes.
//! The queue engine only ever talks to these two traits.
//!
//! Two implementations ship with the crate:
//!
//! - [`DirVolume`] / [`FileMedium`]: one pre-allocated, memory-mapped file
//!   per queue inside a directory.
//! - [`MemVolume`] / [`MemMedium`]: heap buffers shared by name, so a
//!   queue can be dropped and reopened within one process. A write budget
//!   makes writes come up short, for exercising failure paths.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use memmap2::MmapMut;

/// Kind of medium a queue was created on, persisted in the control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumKind {
    /// A file on a mounted filesystem.
    File,
    /// Volatile memory.
    Memory,
}

impl MediumKind {
    /// The 4-bit tag stored in the high nibble of the flags byte.
    pub fn nibble(self) -> u8 {
        match self {
            MediumKind::File => 0,
            MediumKind::Memory => 4,
        }
    }

    /// Decodes a tag written by [`MediumKind::nibble`].
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(MediumKind::File),
            4 => Some(MediumKind::Memory),
            _ => None,
        }
    }
}

/// A fixed-size, randomly addressable byte store.
///
/// Reads and writes report how many bytes they moved. Transfers that run
/// past the end of the store are truncated rather than extending it.
pub trait Medium {
    /// Reads into `buf` starting at `offset`, returning the bytes read.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the read fails.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes `data` starting at `offset`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the write fails.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize>;

    /// Size of the store in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the store has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes written bytes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the flush fails.
    fn sync(&mut self) -> io::Result<()>;
}

/// A mountable namespace of named stores.
pub trait Volume {
    /// The store type this volume opens.
    type Medium: Medium;

    /// Makes the volume available.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the volume cannot be mounted.
    fn mount(&mut self) -> io::Result<()>;

    /// Releases the volume. Stores must be reopened after a new mount.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the volume cannot be released.
    fn unmount(&mut self) -> io::Result<()>;

    /// Whether the volume is currently mounted.
    fn is_mounted(&self) -> bool;

    /// Size of the named store, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is unmounted or the lookup fails.
    fn stat(&self, name: &str) -> io::Result<Option<u64>>;

    /// Creates (or replaces) a zero-filled store of exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is unmounted or allocation fails.
    fn create(&mut self, name: &str, len: u64) -> io::Result<Self::Medium>;

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is unmounted or the store is missing.
    fn open(&mut self, name: &str) -> io::Result<Self::Medium>;

    /// Deletes a store and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume is unmounted or the store is missing.
    fn remove(&mut self, name: &str) -> io::Result<()>;

    /// The medium kind recorded in control blocks created on this volume.
    fn kind(&self) -> MediumKind;
}

fn not_mounted() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "volume is not mounted")
}

/// Copies as much of `src[offset..]` into `buf` as fits.
fn copy_out(src: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= src.len() {
        return 0;
    }
    let n = buf.len().min(src.len() - start);
    buf[..n].copy_from_slice(&src[start..start + n]);
    n
}

/// Copies as much of `data` into `dst[offset..]` as fits, up to `limit` bytes.
fn copy_in(dst: &mut [u8], offset: u64, data: &[u8], limit: usize) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= dst.len() {
        return 0;
    }
    let n = data.len().min(dst.len() - start).min(limit);
    dst[start..start + n].copy_from_slice(&data[..n]);
    n
}

/// A directory acting as a volume, with one file per queue.
#[derive(Debug, Clone)]
pub struct DirVolume {
    /// Directory holding the queue files.
    root: PathBuf,
    /// Whether [`Volume::mount`] has been called.
    mounted: bool,
}

impl DirVolume {
    /// Creates an unmounted volume rooted at `root`.
    ///
    /// The directory is created on [`Volume::mount`].
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mounted: false,
        }
    }

    /// Returns the volume's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a store name to its file path.
    fn path(&self, name: &str) -> io::Result<PathBuf> {
        if !self.mounted {
            return Err(not_mounted());
        }
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store name '{name}'"),
            ));
        }
        Ok(self.root.join(name))
    }
}

impl Volume for DirVolume {
    type Medium = FileMedium;

    fn mount(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> io::Result<()> {
        self.mounted = false;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn stat(&self, name: &str) -> io::Result<Option<u64>> {
        match fs::metadata(self.path(name)?) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&mut self, name: &str, len: u64) -> io::Result<FileMedium> {
        FileMedium::create(self.path(name)?, len)
    }

    fn open(&mut self, name: &str) -> io::Result<FileMedium> {
        FileMedium::open(self.path(name)?)
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name)?)
    }

    fn kind(&self) -> MediumKind {
        MediumKind::File
    }
}

/// A memory-mapped queue file.
///
/// The file is allocated to its full size when created and never grows,
/// so every offset in `0..len` is backed by the mapping.
#[derive(Debug)]
pub struct FileMedium {
    /// Mapping of the whole file; `None` for a zero-length file, which
    /// cannot be mapped.
    mmap: Option<MmapMut>,
    /// Path to the file (for logging).
    path: PathBuf,
}

impl FileMedium {
    /// Creates a zero-filled file of exactly `len` bytes and maps it.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be created,
    /// sized, or mapped.
    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(len)?;
        Self::map(file, path)
    }

    /// Opens and maps an existing file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::map(file, path)
    }

    fn map(file: fs::File, path: &Path) -> io::Result<Self> {
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is open read/write and owned by this medium for
            // its lifetime. Queue files are exclusively owned by one queue, so
            // no other mapping truncates or resizes it underneath us.
            Some(unsafe { MmapMut::map_mut(&file)? })
        };

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the mapped file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Medium for FileMedium {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.mmap.as_ref().map_or(0, |m| copy_out(m, offset, buf)))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        Ok(self
            .mmap
            .as_mut()
            .map_or(0, |m| copy_in(m, offset, data, usize::MAX)))
    }

    fn len(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        match &self.mmap {
            Some(m) => m.flush(),
            None => Ok(()),
        }
    }
}

/// Shared state behind a [`MemVolume`] and the media it hands out.
#[derive(Debug, Default)]
struct MemShared {
    /// Bytes that may still be written before writes come up short.
    write_budget: Cell<Option<usize>>,
}

/// A volume whose stores live on the heap.
///
/// Stores are shared by name: dropping a queue and reopening it on the same
/// volume sees everything the first queue wrote, which models a device
/// restart without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemVolume {
    /// Store contents by name.
    stores: HashMap<String, Rc<RefCell<Vec<u8>>>>,
    /// Whether the volume is mounted.
    mounted: bool,
    /// When set, [`Volume::mount`] fails.
    fail_mount: bool,
    /// State shared with every medium opened from this volume.
    shared: Rc<MemShared>,
}

impl MemVolume {
    /// Creates an empty, unmounted volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the total bytes all media may write from now on.
    ///
    /// Once the budget is spent, writes transfer fewer bytes than
    /// requested. `None` removes the limit.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.shared.write_budget.set(budget);
    }

    /// Makes subsequent mounts fail.
    pub fn set_mount_failure(&mut self, fail: bool) {
        self.fail_mount = fail;
    }

    /// Returns a copy of a store's bytes.
    pub fn snapshot(&self, name: &str) -> Option<Vec<u8>> {
        self.stores.get(name).map(|s| s.borrow().clone())
    }

    fn medium(&self, name: &str) -> io::Result<MemMedium> {
        if !self.mounted {
            return Err(not_mounted());
        }
        let data = self.stores.get(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no store named '{name}'"))
        })?;
        Ok(MemMedium {
            data: Rc::clone(data),
            shared: Rc::clone(&self.shared),
        })
    }
}

impl Volume for MemVolume {
    type Medium = MemMedium;

    fn mount(&mut self) -> io::Result<()> {
        if self.fail_mount {
            return Err(io::Error::other("mount refused"));
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> io::Result<()> {
        self.mounted = false;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn stat(&self, name: &str) -> io::Result<Option<u64>> {
        if !self.mounted {
            return Err(not_mounted());
        }
        Ok(self.stores.get(name).map(|s| s.borrow().len() as u64))
    }

    fn create(&mut self, name: &str, len: u64) -> io::Result<MemMedium> {
        if !self.mounted {
            return Err(not_mounted());
        }
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "store too large"))?;
        self.stores
            .insert(name.to_string(), Rc::new(RefCell::new(vec![0; len])));
        self.medium(name)
    }

    fn open(&mut self, name: &str) -> io::Result<MemMedium> {
        self.medium(name)
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        if !self.mounted {
            return Err(not_mounted());
        }
        self.stores.remove(name).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no store named '{name}'"))
        })
    }

    fn kind(&self) -> MediumKind {
        MediumKind::Memory
    }
}

/// A heap-backed store handed out by [`MemVolume`].
#[derive(Debug, Clone)]
pub struct MemMedium {
    data: Rc<RefCell<Vec<u8>>>,
    shared: Rc<MemShared>,
}

impl Medium for MemMedium {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_out(&self.data.borrow(), offset, buf))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        let budget = self.shared.write_budget.get();
        let n = copy_in(
            &mut self.data.borrow_mut(),
            offset,
            data,
            budget.unwrap_or(usize::MAX),
        );
        if let Some(left) = budget {
            self.shared.write_budget.set(Some(left - n));
        }
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.borrow().len() as u64
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medium_kind_nibbles() {
        for kind in [MediumKind::File, MediumKind::Memory] {
            assert_eq!(MediumKind::from_nibble(kind.nibble()), Some(kind));
        }
        assert_eq!(MediumKind::from_nibble(7), None);
    }

    #[test]
    fn test_file_medium_create_and_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("queue.bin");

        {
            let mut medium = FileMedium::create(&path, 32).unwrap();
            assert_eq!(medium.len(), 32);
            assert_eq!(medium.write_at(4, b"abcd").unwrap(), 4);
            medium.sync().unwrap();
        }

        let medium = FileMedium::open(&path).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(medium.read_at(4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_file_medium_truncates_at_end() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("queue.bin");
        let mut medium = FileMedium::create(&path, 8).unwrap();

        assert_eq!(medium.write_at(6, b"xyz").unwrap(), 2);
        assert_eq!(medium.write_at(8, b"x").unwrap(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(medium.read_at(6, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"xy");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn test_empty_file_reads_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let medium = FileMedium::open(&path).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(medium.read_at(0, &mut buf).unwrap(), 0);
        assert!(medium.is_empty());
    }

    #[test]
    fn test_dir_volume_requires_mount() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut volume = DirVolume::new(temp_dir.path().join("vol"));

        let err = volume.create("q", 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        volume.mount().unwrap();
        assert!(volume.is_mounted());
        assert_eq!(volume.stat("q").unwrap(), None);
        volume.create("q", 16).unwrap();
        assert_eq!(volume.stat("q").unwrap(), Some(16));
        volume.remove("q").unwrap();
        assert_eq!(volume.stat("q").unwrap(), None);

        assert!(volume.stat("../escape").is_err());
    }

    #[test]
    fn test_mem_volume_shares_stores() {
        let mut volume = MemVolume::new();
        volume.mount().unwrap();

        let mut first = volume.create("q", 8).unwrap();
        first.write_at(0, b"hi").unwrap();

        let second = volume.open("q").unwrap();
        let mut buf = [0u8; 2];
        second.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hi");
        assert_eq!(volume.snapshot("q").unwrap()[..2], *b"hi");
    }

    #[test]
    fn test_mem_volume_write_budget() {
        let mut volume = MemVolume::new();
        volume.mount().unwrap();
        let mut medium = volume.create("q", 16).unwrap();

        volume.set_write_budget(Some(3));
        assert_eq!(medium.write_at(0, b"ab").unwrap(), 2);
        assert_eq!(medium.write_at(2, b"cd").unwrap(), 1);
        assert_eq!(medium.write_at(4, b"ef").unwrap(), 0);

        volume.set_write_budget(None);
        assert_eq!(medium.write_at(4, b"ef").unwrap(), 2);
    }

    #[test]
    fn test_mem_volume_mount_failure() {
        let mut volume = MemVolume::new();
        volume.set_mount_failure(true);
        assert!(volume.mount().is_err());
        assert!(!volume.is_mounted());
    }
}
