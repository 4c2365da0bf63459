//! Entry catalog
//!
//! A [`Catalog`] is one worker's shard of the entries a run operates on.
//! Catalogs come from a fresh walk ([`crate::walker`]) or from a SQLite
//! cache written by an earlier run ([`cache`]), and are split across
//! workers with [`Catalog::partition`].
//!
//! ```text
//!   walk / read_cache ──▶ Catalog ──partition(n)──▶ [shard 0, shard 1, ... shard n-1]
//!                                                        │
//!                                   array_by_depth ◀─────┘  (per worker, collective)
//! ```

pub mod cache;

pub use cache::{read_cache, write_cache};

use crate::collective::{ReduceOp, WorkerGroup};
use crate::mode::ModeBits;
use std::path::{Path, PathBuf};

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Regular file
    Regular = 0,
    /// Directory
    Directory = 1,
    /// Symbolic link
    Symlink = 2,
    /// Devices, fifos, sockets
    Other = 3,
}

impl EntryType {
    /// Convert from the integer stored in the cache
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => EntryType::Regular,
            1 => EntryType::Directory,
            2 => EntryType::Symlink,
            _ => EntryType::Other,
        }
    }

    /// Convert from the type bits of a raw `st_mode`
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o100000 => EntryType::Regular,
            0o040000 => EntryType::Directory,
            0o120000 => EntryType::Symlink,
            _ => EntryType::Other,
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        *self == EntryType::Symlink
    }

    /// Integer representation for the cache
    pub fn as_db_int(&self) -> i64 {
        *self as i64
    }
}

impl From<std::fs::FileType> for EntryType {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryType::Symlink
        } else if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_file() {
            EntryType::Regular
        } else {
            EntryType::Other
        }
    }
}

/// One filesystem entry as recorded at walk time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path
    pub path: PathBuf,

    /// Owner user ID (0 when stat was not collected)
    pub uid: u32,

    /// Owner group ID (0 when stat was not collected)
    pub gid: u32,

    /// Permission bits (empty when stat was not collected)
    pub mode: ModeBits,

    /// Entry type
    pub entry_type: EntryType,

    /// Distance from the walk root (roots are 0)
    pub depth: u32,
}

impl FileEntry {
    /// Final path component, or the whole path if there is none (e.g. `/`)
    pub fn base_name(&self) -> &Path {
        self.path
            .file_name()
            .map(Path::new)
            .unwrap_or(self.path.as_path())
    }
}

/// A worker's shard of entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<FileEntry>,
}

/// A catalog split by depth, shallowest first
#[derive(Debug, Clone, Default)]
pub struct DepthLevels {
    /// Depth of `levels[0]`
    pub min_depth: u32,

    /// `levels[i]` holds this worker's entries at depth `min_depth + i`
    pub levels: Vec<Catalog>,
}

impl DepthLevels {
    /// Depth of the level at `index`
    pub fn depth_of(&self, index: usize) -> u32 {
        self.min_depth + index as u32
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    /// Number of entries in this shard
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Copy the entries `keep` accepts into a new catalog
    pub fn subset<F>(&self, mut keep: F) -> Catalog
    where
        F: FnMut(&FileEntry) -> bool,
    {
        Catalog {
            entries: self.entries.iter().filter(|e| keep(e)).cloned().collect(),
        }
    }

    /// Deal entries round-robin into `n` disjoint shards covering the catalog
    pub fn partition(self, n: usize) -> Vec<Catalog> {
        let n = n.max(1);
        let mut shards = vec![Catalog::new(); n];
        for (idx, entry) in self.entries.into_iter().enumerate() {
            shards[idx % n].push(entry);
        }
        shards
    }

    /// Total entries across every worker's shard (collective)
    pub fn global_len<G: WorkerGroup>(&self, group: &G) -> u64 {
        group.all_reduce(self.len() as u64, ReduceOp::Sum)
    }

    /// Split this shard by depth (collective).
    ///
    /// The depth range is agreed across the whole group, so every worker gets
    /// the same number of levels even when some of its levels are empty. An
    /// empty group-wide catalog yields no levels.
    pub fn array_by_depth<G: WorkerGroup>(&self, group: &G) -> DepthLevels {
        let local_min = self.entries.iter().map(|e| e.depth).min();
        let local_max = self.entries.iter().map(|e| e.depth).max();

        let min = group.all_reduce(local_min.map_or(u64::MAX, u64::from), ReduceOp::Min);
        let max = group.all_reduce(local_max.map_or(0, u64::from), ReduceOp::Max);

        if min == u64::MAX {
            return DepthLevels::default();
        }

        let min_depth = min as u32;
        let count = (max - min) as usize + 1;
        let mut levels = vec![Catalog::new(); count];
        for entry in &self.entries {
            levels[(entry.depth - min_depth) as usize].push(entry.clone());
        }

        DepthLevels { min_depth, levels }
    }
}

impl FromIterator<FileEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
