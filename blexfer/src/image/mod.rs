//! Reading transfer images from disk.
//!
//! Configuration files are sent as-is; firmware images are shipped inside a
//! ZIP update package and the payload is the package's file entry. The
//! [`ImageSource`] trait is the seam the session loads through, so tests can
//! hand it canned bytes and failures.

pub mod archive;

use crate::error::Result;
use crate::transfer::FileType;
use log::debug;
use std::fs;
use std::path::Path;

pub use archive::{ArchiveEntry, list_entries, read_entry};

/// Where session loads get their bytes from.
pub trait ImageSource {
    /// Read a whole plain file.
    fn read_all(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read the payload out of a ZIP update package.
    ///
    /// `entry` selects a file by name; `None` takes the first regular file.
    fn read_from_archive(&self, path: &Path, entry: Option<&str>) -> Result<Vec<u8>>;

    /// Read `path` the way files of `file_type` are shipped.
    fn read_for_type(&self, path: &Path, file_type: FileType) -> Result<Vec<u8>> {
        if file_type.is_archived() {
            self.read_from_archive(path, None)
        } else {
            self.read_all(path)
        }
    }
}

/// [`ImageSource`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl ImageSource for FsSource {
    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        debug!("Reading {}", path.display());
        Ok(fs::read(path)?)
    }

    fn read_from_archive(&self, path: &Path, entry: Option<&str>) -> Result<Vec<u8>> {
        debug!("Opening update package {}", path.display());
        let file = fs::File::open(path)?;
        read_entry(std::io::BufReader::new(file), entry)
    }
}
