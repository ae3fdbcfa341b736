//! Symbolic link primitives shared by the deployer and the backup manager.
use std::io;
use std::path::{Path, PathBuf};

/// Create a symlink at `link` pointing to `target`.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] if `link` is occupied.  On
/// Windows the file or directory flavour is chosen from the target.
///
/// # Errors
///
/// Returns the OS error from the link call.
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        // Relative targets are resolved against the link's directory
        let resolved = link
            .parent()
            .map_or_else(|| target.to_path_buf(), |p| p.join(target));
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

/// Whether `link` is a symlink whose stored target equals `source`.
///
/// Compares the raw link text, so a link that reaches `source` through a
/// chain of other links is not considered a match.
#[must_use]
pub fn points_to(link: &Path, source: &Path) -> bool {
    std::fs::read_link(link).is_ok_and(|existing| paths_equal(&existing, source))
}

/// Remove whatever occupies `path`: a file, a symlink (including a dangling
/// or directory symlink), or a whole directory tree.
///
/// Does nothing if `path` is absent.  Directory symlinks are unlinked, never
/// recursed into.
///
/// # Errors
///
/// Returns the OS error from the removal call.
pub fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.file_type().is_symlink() {
        if is_dir_like(&meta) {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        }
    } else if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Check if metadata represents a directory-like entry.
/// On Windows, `symlink_metadata().is_dir()` returns `false` for directory symlinks,
/// so we check the raw `FILE_ATTRIBUTE_DIRECTORY` bit instead.
fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

/// Compare two paths for equality, handling UNC prefix normalization on Windows.
#[must_use]
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    let normalize = |p: &Path| -> PathBuf {
        #[cfg(windows)]
        {
            let s = p.to_string_lossy();
            if let Some(stripped) = s.strip_prefix(r"\\?\") {
                return PathBuf::from(stripped);
            }
        }
        p.to_path_buf()
    };

    normalize(a) == normalize(b)
}
