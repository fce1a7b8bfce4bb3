//! Local scratch copies of fetched and written blobs.
//!
//! Layout under the scratch directory:
//!
//! ```text
//! objects/<object hex>          loose object bodies, no header
//! packs/pack-<pack hex>.pack    pack bodies
//! packs/pack-<pack hex>.idx     pack indexes
//! ```
//!
//! The directory is a cache, not a store of record: it is created with the
//! backend and removed at teardown.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use stratus_pack::PackFile;
use stratus_types::{ObjectId, PackId};
use tempfile::TempDir;

#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    objects_dir: PathBuf,
    packs_dir: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

/// Write `data` to `path` through a uniquely named sibling staging file.
///
/// Concurrent writers of the same path each persist their own complete
/// file; the last rename wins.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staging = tempfile::Builder::new().prefix(".staging-").tempfile_in(dir)?;
    staging.write_all(data)?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl DiskCache {
    /// Create a fresh `stratus-*` scratch directory, under `parent` if given.
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("stratus-");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let root = dir.path().to_path_buf();
        let objects_dir = root.join("objects");
        let packs_dir = root.join("packs");
        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(&packs_dir)?;
        tracing::debug!(root = %root.display(), "created scratch directory");
        Ok(Self {
            root,
            objects_dir,
            packs_dir,
            dir: Mutex::new(Some(dir)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn loose_path(&self, id: &ObjectId) -> PathBuf {
        self.objects_dir.join(id.to_hex())
    }

    /// Persist a loose object body and return its path.
    pub fn store_loose(&self, id: &ObjectId, body: &[u8]) -> io::Result<PathBuf> {
        let path = self.loose_path(id);
        write_atomic(&path, body)?;
        Ok(path)
    }

    pub fn read_loose(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    /// Where a pack and its index live (or would live) in the cache.
    pub fn pack_paths(&self, pack: &PackId) -> (PathBuf, PathBuf) {
        PackFile::paths_in(&self.packs_dir, pack)
    }

    /// Whether both halves of a pack are present.
    pub fn has_pack(&self, pack: &PackId) -> bool {
        let (pack_path, index_path) = self.pack_paths(pack);
        pack_path.is_file() && index_path.is_file()
    }

    /// Persist a pack and its index. The index is written last, so a present
    /// index implies a complete pack body.
    pub fn store_pack(&self, pack: &PackId, body: &[u8], index: &[u8]) -> io::Result<(PathBuf, PathBuf)> {
        let (pack_path, index_path) = self.pack_paths(pack);
        write_atomic(&pack_path, body)?;
        write_atomic(&index_path, index)?;
        Ok((pack_path, index_path))
    }

    pub fn is_closed(&self) -> bool {
        self.dir.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Delete the scratch directory. Later calls are no-ops.
    pub fn close(&self) -> io::Result<()> {
        let dir = self.dir.lock().unwrap_or_else(PoisonError::into_inner).take();
        match dir {
            Some(dir) => {
                tracing::debug!(root = %self.root.display(), "removing scratch directory");
                dir.close()
            }
            None => Ok(()),
        }
    }
}
