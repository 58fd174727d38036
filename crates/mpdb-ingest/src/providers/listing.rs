//! Directory listing as the record of what was materialized

use crate::providers::FileListing;
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use std::path::Path;
use tracing::debug;

/// Lists a local directory with `tokio::fs`
///
/// A missing directory lists as empty; any other read error is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectory;

#[async_trait]
impl FileListing for LocalDirectory {
    async fn list(&self, dir: &Path, suffix: &str) -> std::io::Result<IdentifierSet> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IdentifierSet::new()),
            Err(e) => return Err(e),
        };

        let mut ids = IdentifierSet::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|name| Identifier::from_file_name(name, suffix)) {
                ids.insert(id);
            }
        }

        debug!(dir = %dir.display(), suffix, files = ids.len(), "Listed structure directory");
        Ok(ids)
    }
}
