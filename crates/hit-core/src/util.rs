use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` atomically: write a sibling temp file, fsync, rename over.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("missing parent for {}", path.display()))?;
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    sync_dir(parent)?;
    Ok(())
}

pub fn sync_dir(path: &Path) -> anyhow::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}
