//! Companion media archive
//!
//! Media is shipped as a gzip-compressed tar of the configured media
//! subdirectories plus any loose files at the top of the media root. Paths in
//! the archive are relative to the media root so extraction restores them in
//! place.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};

pub const MEDIA_CONTENT_TYPE: &str = "application/gzip";

/// Pack the media root into a tar.gz held in memory
pub fn pack(media_root: &Path, subdirs: &[String]) -> VaultResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    for subdir in subdirs {
        let path = media_root.join(subdir);
        if !path.is_dir() {
            debug!(subdir = %subdir, "Media subdirectory missing, skipping");
            continue;
        }
        builder
            .append_dir_all(subdir, &path)
            .map_err(|e| VaultError::Io(format!("Failed to archive {}: {}", subdir, e)))?;
    }

    if media_root.is_dir() {
        let entries = fs::read_dir(media_root)
            .map_err(|e| VaultError::Io(format!("Failed to read media directory: {}", e)))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| VaultError::Io(format!("Failed to read media entry: {}", e)))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            builder
                .append_path_with_name(&path, &name)
                .map_err(|e| {
                    VaultError::Io(format!("Failed to archive {}: {}", name.to_string_lossy(), e))
                })?;
        }
    } else {
        warn!(path = %media_root.display(), "Media root does not exist, archive will be empty");
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| VaultError::Io(format!("Failed to finish media archive: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| VaultError::Io(format!("Failed to compress media archive: {}", e)))
}

/// Extract a media archive into `media_root`; returns the number of files.
///
/// Entries that would escape the media root are skipped.
pub fn unpack(bytes: &[u8], media_root: &Path) -> VaultResult<usize> {
    fs::create_dir_all(media_root)
        .map_err(|e| VaultError::Io(format!("Failed to create media directory: {}", e)))?;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let entries = archive
        .entries()
        .map_err(|e| VaultError::SnapshotCorrupt(format!("invalid media archive: {}", e)))?;

    let mut files = 0;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| VaultError::SnapshotCorrupt(format!("invalid media archive: {}", e)))?;
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(media_root)
            .map_err(|e| VaultError::Io(format!("Failed to extract media file: {}", e)))?;
        if unpacked && is_file {
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, body: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_pack_and_unpack_preserves_paths() {
        let source = TempDir::new().unwrap();
        write(source.path(), "centers/a.png", b"a");
        write(source.path(), "centers/nested/b.png", b"b");
        write(source.path(), "therapists/c.jpg", b"c");
        write(source.path(), "other/skipped.txt", b"x");
        write(source.path(), "logo.svg", b"svg");

        let archive = pack(
            source.path(),
            &["centers".to_string(), "therapists".to_string(), "missing".to_string()],
        )
        .unwrap();

        let target = TempDir::new().unwrap();
        let files = unpack(&archive, target.path()).unwrap();
        assert_eq!(files, 4);
        assert_eq!(fs::read(target.path().join("centers/nested/b.png")).unwrap(), b"b");
        assert!(target.path().join("logo.svg").exists());
        assert!(!target.path().join("other").exists());
    }

    #[test]
    fn test_missing_root_packs_empty_archive() {
        let temp = TempDir::new().unwrap();
        let archive = pack(&temp.path().join("nope"), &["centers".to_string()]).unwrap();
        let target = TempDir::new().unwrap();
        assert_eq!(unpack(&archive, target.path()).unwrap(), 0);
    }

    #[test]
    fn test_garbage_archive_is_corrupt() {
        let target = TempDir::new().unwrap();
        assert!(unpack(b"not a tarball", target.path()).is_err());
    }
}
