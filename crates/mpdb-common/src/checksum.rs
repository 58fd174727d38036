//! Checksum utilities for curated output files
//!
//! Sidecars use the `sha256sum` line format (`<hex>  <file name>`), so they can be
//! checked with standard tooling as well as [`verify_sidecar`].

use crate::error::{MpdbError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// File extension appended to the checksummed file's name
pub const SIDECAR_EXTENSION: &str = "sha256";

/// Compute the SHA-256 checksum of a file
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file)
}

/// Compute the SHA-256 checksum of any readable source
pub fn compute_checksum<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 checksum of an in-memory buffer
pub fn compute_bytes_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Sidecar line for a file named `file_name` with the given checksum
pub fn sidecar_line(checksum: &str, file_name: &str) -> String {
    format!("{checksum}  {file_name}\n")
}

/// Path of the sidecar for `path` (`data.json` -> `data.json.sha256`)
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    path.with_file_name(name)
}

/// Write a checksum sidecar next to `path` and return its location
pub fn write_sidecar(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let checksum = compute_file_checksum(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let sidecar = sidecar_path(path);
    std::fs::write(&sidecar, sidecar_line(&checksum, &file_name))?;
    Ok(sidecar)
}

/// Verify a file against its sidecar
pub fn verify_sidecar(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let recorded = std::fs::read_to_string(sidecar_path(path))?;
    let expected = recorded.split_whitespace().next().unwrap_or_default().to_string();
    let actual = compute_file_checksum(path)?;

    if actual == expected {
        Ok(())
    } else {
        Err(MpdbError::ChecksumMismatch {
            path: path.display().to_string(),
            expected,
            actual,
        })
    }
}
