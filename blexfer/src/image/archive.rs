//! ZIP update packages.
//!
//! A package normally holds a single image; when it holds several, callers
//! pick one by name.

use crate::error::{Error, Result};
use log::{debug, trace};
use std::io::{Read, Seek};
use zip::ZipArchive;
use zip::result::ZipError;

/// One file entry of an update package.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveEntry {
    /// Path inside the archive.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

fn archive_err(err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => Error::Io(e),
        other => Error::Archive(other.to_string()),
    }
}

/// List the regular file entries of a package, in archive order.
pub fn list_entries<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(reader).map_err(archive_err)?;
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(archive_err)?;
        if file.is_file() {
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size(),
            });
        }
    }
    Ok(entries)
}

/// Extract one entry of a package.
///
/// With `name == None` the first regular file is taken; directories are
/// skipped.
pub fn read_entry<R: Read + Seek>(reader: R, name: Option<&str>) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(reader).map_err(archive_err)?;
    trace!("Update package has {} entries", archive.len());

    let index = match name {
        Some(name) => archive
            .index_for_name(name)
            .ok_or_else(|| Error::Archive(format!("no entry named {name}")))?,
        None => (0..archive.len())
            .find(|&i| archive.by_index(i).is_ok_and(|f| f.is_file()))
            .ok_or_else(|| Error::Archive("update package has no file entry".into()))?,
    };

    let mut file = archive.by_index(index).map_err(archive_err)?;
    if !file.is_file() {
        return Err(Error::Archive(format!("{} is not a file", file.name())));
    }
    debug!("Extracting {} ({} bytes)", file.name(), file.size());

    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn package(entries: &[(&str, &[u8])], dirs: &[&str]) -> Cursor<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for dir in dirs {
            zip.add_directory(*dir, options).unwrap();
        }
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_first_file_skips_directories() {
        let pkg = package(&[("images/app.bin", b"app")], &["images/"]);
        assert_eq!(read_entry(pkg, None).unwrap(), b"app");
    }

    #[test]
    fn test_named_entry() {
        let pkg = package(&[("a.bin", b"a"), ("b.bin", b"bb")], &[]);
        assert_eq!(read_entry(pkg, Some("b.bin")).unwrap(), b"bb");
    }

    #[test]
    fn test_missing_entry() {
        let pkg = package(&[("a.bin", b"a")], &[]);
        assert!(matches!(
            read_entry(pkg, Some("c.bin")),
            Err(Error::Archive(_))
        ));
    }

    #[test]
    fn test_empty_package() {
        let pkg = package(&[], &["only-a-dir/"]);
        assert!(matches!(read_entry(pkg, None), Err(Error::Archive(_))));
    }

    #[test]
    fn test_list_entries() {
        let pkg = package(&[("a.bin", b"a"), ("b.bin", b"bbb")], &["d/"]);
        let entries = list_entries(pkg).unwrap();
        assert_eq!(
            entries,
            vec![
                ArchiveEntry {
                    name: "a.bin".into(),
                    size: 1
                },
                ArchiveEntry {
                    name: "b.bin".into(),
                    size: 3
                },
            ]
        );
    }

    #[test]
    fn test_garbage_is_archive_error() {
        let garbage = Cursor::new(vec![0x55u8; 64]);
        assert!(matches!(read_entry(garbage, None), Err(Error::Archive(_))));
    }
}
