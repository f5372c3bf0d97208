//! Path sandbox
//!
//! Every filesystem-touching command maps its client argument to a host path
//! with [`resolve`] and certifies it with [`validate`] before any I/O happens.
//! A certified path is canonical (symlinks and `..` resolved), exists, and
//! equals the session root or lies below it.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::SandboxError;

/// Computes the target path for a client argument.
///
/// - empty argument: the current path
/// - argument starting with `/`: appended to the root
/// - anything else: appended to the current path after a `/`
pub fn resolve(root: &Path, current: &Path, arg: &str) -> PathBuf {
    if arg.is_empty() {
        return current.to_path_buf();
    }

    let (base, sep) = if arg.starts_with('/') {
        (root, "")
    } else {
        (current, "/")
    };

    let mut joined = OsString::from(base.as_os_str());
    joined.push(sep);
    joined.push(arg);
    PathBuf::from(joined)
}

/// Returns true when `path` is `root` or a descendant of it. Both must be canonical.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

/// Canonicalizes `path` and checks it exists inside `root`.
///
/// `root` must already be canonical. Returns the canonical path on success.
pub async fn validate(root: &Path, path: &Path) -> Result<PathBuf, SandboxError> {
    let canonical = fs::canonicalize(path)
        .await
        .map_err(|_| SandboxError::NotFound(path.to_path_buf()))?;

    if is_within(root, &canonical) {
        Ok(canonical)
    } else {
        Err(SandboxError::OutsideRoot(canonical))
    }
}

/// Like [`validate`], additionally requiring a directory.
pub async fn validate_dir(root: &Path, path: &Path) -> Result<PathBuf, SandboxError> {
    let canonical = validate(root, path).await?;
    if is_dir(&canonical).await {
        Ok(canonical)
    } else {
        Err(SandboxError::NotADirectory(canonical))
    }
}

/// Like [`validate`], additionally requiring a regular file.
pub async fn validate_file(root: &Path, path: &Path) -> Result<PathBuf, SandboxError> {
    let canonical = validate(root, path).await?;
    let is_file = matches!(fs::metadata(&canonical).await, Ok(m) if m.is_file());
    if is_file {
        Ok(canonical)
    } else {
        Err(SandboxError::NotAFile(canonical))
    }
}

/// Resolves the destination of an upload.
///
/// The file itself need not exist, but its parent must validate as a
/// directory inside the sandbox. Writing directly below the root is allowed.
/// An existing target must be a regular file (after following links) that
/// also stays inside the sandbox.
pub async fn resolve_upload(
    root: &Path,
    current: &Path,
    arg: &str,
) -> Result<PathBuf, SandboxError> {
    let raw = resolve(root, current, arg);

    let name = match raw.components().next_back() {
        Some(Component::Normal(name)) => name.to_owned(),
        _ => return Err(SandboxError::InvalidName(arg.to_string())),
    };
    let parent = raw
        .parent()
        .ok_or_else(|| SandboxError::InvalidName(arg.to_string()))?;

    let parent = validate_dir(root, parent).await?;
    let target = parent.join(&name);

    match fs::symlink_metadata(&target).await {
        Err(_) => Ok(target),
        Ok(_) => {
            let existing = validate(root, &target).await?;
            if is_dir(&existing).await {
                Err(SandboxError::NotAFile(existing))
            } else {
                Ok(existing)
            }
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(m) if m.is_dir())
}

/// Client-facing form of a certified path: the root prefix stripped, `/` for the root itself.
pub fn display_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(Path::new(""));

    let mut shown = String::new();
    for part in relative.components() {
        if let Component::Normal(part) = part {
            shown.push('/');
            shown.push_str(&part.to_string_lossy());
        }
    }

    if shown.is_empty() {
        shown.push('/');
    }
    shown
}
