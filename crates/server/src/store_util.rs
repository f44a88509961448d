//! Shared on-disk helpers for the JSON document stores.

use std::path::Path;

/// Full-file atomic replace: write to a sibling temp file, then rename over
/// the target. Readers never observe a partial document.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
