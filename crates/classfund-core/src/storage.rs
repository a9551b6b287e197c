//! Proof and receipt image storage.
//!
//! The rest of the system only needs "store bytes, get back a retrievable
//! reference" and "resolve a reference to a readable path". References are
//! store-relative (`proofs/ab12….jpg`) so the root can move without
//! rewriting payment rows. Filenames are content-addressed: re-uploading the
//! same screenshot lands on the same file.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

/// Filesystem-backed image store
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default store location: `<data dir>/classfund/images`, falling back
    /// to `./images` when the platform has no data dir.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("classfund").join("images"))
            .unwrap_or_else(|| PathBuf::from("images"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store image bytes under a category ("proofs", "receipts").
    /// Returns the store-relative reference.
    pub fn store(&self, bytes: &[u8], category: &str) -> Result<String> {
        if bytes.is_empty() {
            return Err(Error::Storage("no image data".into()));
        }
        if category.is_empty() || !category.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Storage(format!("bad category '{}'", category)));
        }

        let dir = self.root.join(category);
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))?;
        }

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hex::encode(hasher.finalize());
        let filename = format!("{}.jpg", &digest[..16]);

        let path = dir.join(&filename);
        fs::write(&path, bytes)
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", path.display(), e)))?;

        Ok(format!("{}/{}", category, filename))
    }

    /// Resolve a reference to an absolute readable path.
    ///
    /// Rejects references escaping the store root (path traversal) and
    /// references whose file no longer exists.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let candidate = self.root.join(reference);

        let canonical = fs::canonicalize(&candidate)
            .map_err(|_| Error::NotFound(format!("image '{}' not found", reference)))?;
        let canonical_root = fs::canonicalize(&self.root)
            .map_err(|_| Error::NotFound("image store root missing".into()))?;

        if !canonical.starts_with(&canonical_root) {
            return Err(Error::Storage(format!(
                "reference '{}' escapes the image store",
                reference
            )));
        }
        Ok(canonical)
    }

    /// Remove a stored image; missing files and traversal attempts are
    /// logged, not fatal
    pub fn delete(&self, reference: &str) {
        match self.resolve(reference) {
            Ok(path) => {
                let _ = fs::remove_file(path);
            }
            Err(e) => warn!(reference, error = %e, "skipping image delete"),
        }
    }
}
