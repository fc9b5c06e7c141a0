//! Moving processed files into the done or error folder

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Move `source` into `destination_dir`, keeping its file name
///
/// A file of the same name already in the destination is deleted first.
/// Returns the new path of the file.
pub async fn relocate(source: &Path, destination_dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::NoFileName(source.to_path_buf()))?;
    let dest = destination_dir.join(file_name);

    if dest == source {
        return Ok(dest);
    }

    let wrap = |e: std::io::Error| Error::Relocate {
        from: source.to_path_buf(),
        to: dest.clone(),
        source: e,
    };

    fs::create_dir_all(destination_dir).await.map_err(wrap)?;

    match fs::remove_file(&dest).await {
        Ok(()) => debug!(path = %dest.display(), "Replaced existing file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(wrap(e)),
    }

    move_file(source, &dest).await.map_err(wrap)?;
    Ok(dest)
}

/// Rename, falling back to copy and delete for cross-filesystem moves
async fn move_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    if let Err(e) = fs::rename(source, dest).await {
        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(e);
        }
        debug!(error = %e, "Rename failed, copying instead");
        fs::copy(source, dest).await?;
        fs::remove_file(source).await?;
    }
    Ok(())
}
