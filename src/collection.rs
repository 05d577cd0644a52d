//! The ordered cover collection the loader reads from.
//!
//! The collection is owned elsewhere; the loader only needs its size, a
//! generation number that changes whenever the collection is replaced or
//! reloaded, and a (possibly slow) decode of the cover at a rank.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use walkdir::WalkDir;

use crate::texture::DecodedImage;

/// A position in a specific generation of a collection.
///
/// Positions from different generations never compare equal, even at the
/// same rank, so moving the center into a reloaded collection restarts the scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPos {
    generation: u64,
    rank: usize,
}

impl CollectionPos {
    pub fn new(generation: u64, rank: usize) -> Self {
        CollectionPos { generation, rank }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn next(&self) -> CollectionPos {
        CollectionPos::new(self.generation, self.rank + 1)
    }

    /// The preceding position, or None at the beginning.
    pub fn prev(&self) -> Option<CollectionPos> {
        self.rank
            .checked_sub(1)
            .map(|rank| CollectionPos::new(self.generation, rank))
    }
}

pub trait CoverCollection: Send + Sync {
    fn generation(&self) -> u64;

    fn count(&self) -> usize;

    /// Decode the cover at `rank`. None means the position has no cover.
    /// May block on disk I/O.
    fn load_cover(&self, rank: usize, max_size: u32) -> Option<DecodedImage>;

    fn begin(&self) -> CollectionPos {
        CollectionPos::new(self.generation(), 0)
    }

    /// One past the last position.
    fn end(&self) -> CollectionPos {
        CollectionPos::new(self.generation(), self.count())
    }

    fn pos(&self, rank: usize) -> CollectionPos {
        CollectionPos::new(self.generation(), rank)
    }
}

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "ico"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files under a directory, sorted by path; each file is its own cover.
pub struct DirCollection {
    root: PathBuf,
    files: RwLock<Vec<PathBuf>>,
    generation: AtomicU64,
}

impl DirCollection {
    pub fn open(root: &Path) -> Self {
        let files = discover(root);
        tracing::debug!("collection: {} covers in {}", files.len(), root.display());
        DirCollection {
            root: root.to_path_buf(),
            files: RwLock::new(files),
            generation: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the directory. Starts a new generation.
    pub fn reload(&self) -> usize {
        let files = discover(&self.root);
        let n = files.len();
        *self.files.write().unwrap_or_else(|e| e.into_inner()) = files;
        self.generation.fetch_add(1, Ordering::AcqRel);
        n
    }

    pub fn path(&self, rank: usize) -> Option<PathBuf> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(rank)
            .cloned()
    }
}

impl CoverCollection for DirCollection {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn count(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn load_cover(&self, rank: usize, max_size: u32) -> Option<DecodedImage> {
        let path = self.path(rank)?;
        DecodedImage::from_file(&path, max_size)
    }
}

fn discover(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
