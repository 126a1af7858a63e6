//! File Operation Service
//!
//! Stateless filesystem operations. Every call goes back to the disk;
//! nothing is cached and concurrent calls on the same path are not
//! coordinated.

use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use super::error::{FileError, FileResult};
use super::info::{listing_order, FileInfo};

/// Filesystem operations exposed to the UI
#[derive(Debug, Clone, Copy, Default)]
pub struct FileService;

impl FileService {
    pub fn new() -> Self {
        Self
    }

    /// Read a file as UTF-8 text
    pub async fn read(&self, path: impl AsRef<Path>) -> FileResult<String> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .await
            .map_err(|source| FileError::Read {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write text, creating missing parent directories first
    pub async fn write(&self, path: impl AsRef<Path>, content: &str) -> FileResult<()> {
        let path = path.as_ref();
        let to_error = |source| FileError::Write {
            path: path.to_path_buf(),
            source,
        };

        ensure_parent(path).await.map_err(to_error)?;
        fs::write(path, content).await.map_err(to_error)?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    /// Delete a file, or a directory with everything in it
    pub async fn delete(&self, path: impl AsRef<Path>) -> FileResult<()> {
        let path = path.as_ref();
        let to_error = |source| FileError::Delete {
            path: path.to_path_buf(),
            source,
        };

        // symlink_metadata: a link to a directory is removed, not its target
        let metadata = fs::symlink_metadata(path).await.map_err(to_error)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).await.map_err(to_error)?;
        } else {
            fs::remove_file(path).await.map_err(to_error)?;
        }

        info!("Deleted {}", path.display());
        Ok(())
    }

    /// Create a directory and any missing ancestors
    pub async fn create_directory(&self, path: impl AsRef<Path>) -> FileResult<()> {
        let path = path.as_ref();
        fs::create_dir_all(path)
            .await
            .map_err(|source| FileError::CreateDirectory {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Metadata for each direct child, directories first then by name
    pub async fn list(&self, path: impl AsRef<Path>) -> FileResult<Vec<FileInfo>> {
        let path = path.as_ref();
        let to_error = |source| FileError::ListDirectory {
            path: path.to_path_buf(),
            source,
        };

        let dir = std::path::absolute(path).map_err(to_error)?;
        let mut entries = fs::read_dir(&dir).await.map_err(to_error)?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(to_error)? {
            let entry_path = entry.path();
            let file_type = entry.file_type().await.map_err(to_error)?;

            // follow links for size/mtime, fall back to the link itself when dangling
            let metadata = match fs::metadata(&entry_path).await {
                Ok(metadata) => Some(metadata),
                Err(_) => fs::symlink_metadata(&entry_path).await.ok(),
            };

            files.push(FileInfo::new(
                entry.file_name().to_string_lossy().into_owned(),
                &entry_path,
                file_type,
                metadata.as_ref(),
            ));
        }

        files.sort_by(listing_order);
        Ok(files)
    }

    /// Copy a file or directory tree, creating the destination's parents
    pub async fn copy(&self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> FileResult<()> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        let to_error = |source| FileError::Copy {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        };

        check_destination(src, dst).await.map_err(to_error)?;
        ensure_parent(dst).await.map_err(to_error)?;
        copy_entry(src, dst).await.map_err(to_error)?;
        info!("Copied {} to {}", src.display(), dst.display());
        Ok(())
    }

    /// Rename `src` to `dst`, creating the destination's parents.
    ///
    /// Falls back to copy + delete when the two paths live on different
    /// filesystems; any other rename failure is returned as is.
    pub async fn rename(&self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> FileResult<()> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        let to_error = |source| FileError::Move {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        };

        ensure_parent(dst).await.map_err(to_error)?;

        match fs::rename(src, dst).await {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                info!(
                    "{} and {} are on different filesystems, copying instead",
                    src.display(),
                    dst.display()
                );
                check_destination(src, dst).await.map_err(to_error)?;
                copy_entry(src, dst).await.map_err(to_error)?;
                remove_entry(src).await.map_err(to_error)?;
            }
            Err(e) => return Err(to_error(e)),
        }

        info!("Moved {} to {}", src.display(), dst.display());
        Ok(())
    }

    /// Whether `path` exists; any access failure counts as "no"
    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        fs::try_exists(path.as_ref()).await.unwrap_or(false)
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Refuse to copy a path onto itself or a directory into its own subtree
async fn check_destination(src: &Path, dst: &Path) -> std::io::Result<()> {
    let is_dir = fs::symlink_metadata(src).await?.is_dir();
    let src = fs::canonicalize(src).await?;
    let dst = resolve_partial(dst).await?;

    if dst == src || (is_dir && dst.starts_with(&src)) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "destination is inside the source",
        ));
    }
    Ok(())
}

/// Canonicalize the longest existing prefix of `path` and append the rest
async fn resolve_partial(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        match fs::canonicalize(existing).await {
            Ok(resolved) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(resolved, |acc: PathBuf, name| acc.join(name)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn copy_entry(src: &Path, dst: &Path) -> std::io::Result<()> {
    let file_type = fs::symlink_metadata(src).await?.file_type();
    if file_type.is_dir() {
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
            .await
            .map_err(std::io::Error::other)?
    } else if file_type.is_symlink() {
        copy_symlink(src, dst)
    } else {
        fs::copy(src, dst).await.map(|_| ())
    }
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path).await?.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

/// Recursive directory copy. Symlinks are recreated, never followed.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target: PathBuf = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Recreate the link at `dst` with the same (possibly dangling) target
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> std::io::Result<()> {
    log::warn!("Skipping symlink {} during copy", src.display());
    Ok(())
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(windows)]
fn is_cross_device(err: &std::io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}
