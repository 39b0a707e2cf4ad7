use std::path::{Path, PathBuf};
use tokio::fs;
use crate::utils::{PressError, PressResult};

/// Suffix for in-progress writes; renamed into place once complete.
const PARTIAL_SUFFIX: &str = "part";

/// Path of `path` relative to `root`, or the file name when `path` lies outside it.
pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}

/// Mirror `source` from `src_root` under `dest_root`, optionally swapping the extension.
pub fn mirror_path(source: &Path, src_root: &Path, dest_root: &Path, extension: Option<&str>) -> PathBuf {
    let rel = relative_to(source, src_root);
    let mirrored = dest_root.join(rel);
    match extension {
        Some(ext) => mirrored.with_extension(ext),
        None => mirrored,
    }
}

pub async fn ensure_parent_dir(path: impl AsRef<Path>) -> PressResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PressError::io(parent, format!("Failed to create directory: {}", e)))?;
        }
    }
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Write `bytes` next to `path` and rename into place, so a failed write
/// never leaves a truncated file at the destination.
pub async fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> PressResult<()> {
    let path = path.as_ref();
    ensure_parent_dir(path).await?;

    let partial = partial_path(path);
    if let Err(e) = fs::write(&partial, bytes).await {
        let _ = fs::remove_file(&partial).await;
        return Err(PressError::io(path, format!("Failed to write output: {}", e)));
    }
    fs::rename(&partial, path)
        .await
        .map_err(|e| PressError::io(path, format!("Failed to move output into place: {}", e)))
}

/// Blocking twin of [`write_atomic`] for callers already on a blocking thread.
pub fn write_atomic_blocking(path: &Path, write: impl FnOnce(std::fs::File) -> PressResult<()>) -> PressResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PressError::io(parent, format!("Failed to create directory: {}", e)))?;
        }
    }

    let partial = partial_path(path);
    let file = std::fs::File::create(&partial)
        .map_err(|e| PressError::io(path, format!("Failed to create output: {}", e)))?;
    if let Err(e) = write(file) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, path)
        .map_err(|e| PressError::io(path, format!("Failed to move output into place: {}", e)))
}
