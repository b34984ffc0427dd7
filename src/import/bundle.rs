//! Image bundles uploaded alongside an import file

use std::collections::HashMap;
use std::io::{Cursor, Read};

use tracing::debug;
use zip::ZipArchive;

use crate::error::{VaultError, VaultResult};

/// Largest single image accepted from a bundle
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Decoded images from a zip bundle, keyed by bare filename
#[derive(Debug, Default)]
pub struct ImageBundle {
    images: HashMap<String, Vec<u8>>,
}

impl ImageBundle {
    /// Read a zip archive and keep only entries that decode as images.
    ///
    /// Directory prefixes are stripped so rows reference files by name alone.
    /// Folders, `__MACOSX` metadata and dotfiles are ignored.
    pub fn from_zip(bytes: &[u8]) -> VaultResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            VaultError::Validation(format!("Image bundle is not a zip archive: {}", e))
        })?;

        let mut images = HashMap::new();
        for index in 0..archive.len() {
            let entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(index, error = %e, "Skipping unreadable bundle entry");
                    continue;
                }
            };

            if entry.is_dir() {
                continue;
            }
            let path = entry.name().replace('\\', "/");
            if path.split('/').any(|part| part == "__MACOSX") {
                continue;
            }
            let Some(name) = path.rsplit('/').next().map(str::to_string) else {
                continue;
            };
            if name.is_empty() || name.starts_with('.') {
                continue;
            }

            // Header sizes are untrusted; read at most one byte past the cap
            let mut data = Vec::new();
            if let Err(e) = entry.take(MAX_IMAGE_BYTES + 1).read_to_end(&mut data) {
                debug!(file = %name, error = %e, "Skipping unreadable bundle entry");
                continue;
            }
            if data.len() as u64 > MAX_IMAGE_BYTES {
                debug!(file = %name, "Skipping oversized bundle entry");
                continue;
            }

            if image::load_from_memory(&data).is_err() {
                debug!(file = %name, "Skipping bundle entry that is not an image");
                continue;
            }
            images.insert(name, data);
        }

        debug!(images = images.len(), "Loaded image bundle");
        Ok(Self { images })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.images.get(name.trim()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
