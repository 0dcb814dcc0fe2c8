//! tar/gzip handling for job inputs and results, plus the base64 transport
//! encoding the remote API uses for archives.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::StorageError;
use crate::model::{MIME_GZIP, MIME_TAR};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Container format sniffed from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    Tar,
    Unknown,
}

impl ArchiveFormat {
    pub fn detect(raw: &[u8]) -> Self {
        if raw.starts_with(&GZIP_MAGIC) {
            ArchiveFormat::Gzip
        } else if raw.len() > USTAR_OFFSET + USTAR_MAGIC.len()
            && &raw[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
        {
            ArchiveFormat::Tar
        } else {
            ArchiveFormat::Unknown
        }
    }

    /// Content type recorded for the stored archive file.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => MIME_TAR,
            ArchiveFormat::Gzip | ArchiveFormat::Unknown => MIME_GZIP,
        }
    }
}

/// Unpacks a tar (optionally gzip-compressed) held in memory into `dest`.
///
/// Entries that would land outside `dest` are skipped by the tar crate.
/// Returns the number of entries written.
pub fn extract_archive(raw: &[u8], dest: &Path) -> io::Result<usize> {
    match ArchiveFormat::detect(raw) {
        ArchiveFormat::Gzip => unpack(GzDecoder::new(raw), dest),
        ArchiveFormat::Tar | ArchiveFormat::Unknown => unpack(raw, dest),
    }
}

fn unpack<R: Read>(reader: R, dest: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut written = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.unpack_in(dest)? {
            written += 1;
        }
    }
    Ok(written)
}

/// Packs `paths` into a gzip-compressed tar at `archive_path`, each under
/// its own file name.
pub fn build_archive(paths: &[PathBuf], archive_path: &Path) -> Result<PathBuf, StorageError> {
    let to_error = |source: io::Error| StorageError::BuildArchive {
        path: archive_path.to_path_buf(),
        source,
    };

    if let Some(parent) = archive_path.parent() {
        super::layout::ensure_directory(parent)?;
    }

    let file = File::create(archive_path).map_err(to_error)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for path in paths {
        let name = super::layout::file_component(&path.to_string_lossy());
        builder.append_path_with_name(path, name).map_err(to_error)?;
    }
    let encoder = builder.into_inner().map_err(to_error)?;
    encoder.finish().map_err(to_error)?;

    Ok(archive_path.to_path_buf())
}

/// Reads a file and returns it base64-encoded.
pub fn archive_to_base64(path: &Path) -> Result<String, StorageError> {
    let data = std::fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(STANDARD.encode(data))
}

/// Decodes standard base64, ignoring embedded whitespace.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
