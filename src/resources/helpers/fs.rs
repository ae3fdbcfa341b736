//! File-system resource helpers.
use std::io;
use std::path::{Path, PathBuf};

use crate::resources::symlink;

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Check, without creating anything, that [`ensure_parent_dir`] would not
/// be blocked by an existing non-directory on the way to `path`'s parent.
///
/// # Errors
///
/// Returns an error if the nearest existing ancestor is not a directory.
pub fn check_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => check_dir_creatable(parent),
        _ => Ok(()),
    }
}

/// Check, without creating anything, that `create_dir_all(dir)` would find
/// a directory at the nearest existing ancestor of `dir`.
///
/// # Errors
///
/// Returns [`io::ErrorKind::NotADirectory`] naming the blocking entry, or
/// the error from reading its metadata.
pub fn check_dir_creatable(dir: &Path) -> io::Result<()> {
    let mut current = Some(dir);
    while let Some(path) = current.filter(|p| !p.as_os_str().is_empty()) {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} exists and is not a directory", path.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => current = path.parent(),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// A unique sibling path for staging writes to `path`.
///
/// Staying in the same directory keeps the final rename on one filesystem.
#[must_use]
pub fn temp_sibling(path: &Path, label: &str) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "entry".into(), |n| n.to_string_lossy().into_owned());
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    path.with_file_name(format!(
        ".{name}.{label}-{}-{nanos}.tmp",
        std::process::id()
    ))
}

/// Recursively copy a directory tree.
///
/// When `skip_git` is `true`, `.git` directories are skipped, which is
/// useful when copying from a cloned repository where Git metadata is
/// unwanted.
///
/// Symlinks within the source tree are *followed*: the function uses
/// [`Path::is_dir`] (which follows symlinks) so directory symlinks are
/// recursed into and their contents materialised rather than copying the
/// link itself.
///
/// # Errors
///
/// Returns an error if the destination directory cannot be created, a source
/// entry cannot be read, or a file cannot be copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path, skip_git: bool) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            if skip_git && entry.file_name() == ".git" {
                continue;
            }
            copy_dir_recursive(&src_path, &dst_path, skip_git)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Copy the tree at `src` into the existing empty directory `dst`, recreating
/// symlinks as links instead of following them.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn copy_tree_preserving_links(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if file_type.is_symlink() {
            symlink::create_symlink(&std::fs::read_link(&src_path)?, &dst_path)?;
        } else if file_type.is_dir() {
            std::fs::create_dir(&dst_path)?;
            copy_tree_preserving_links(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Whether the trees at `a` and `b` hold the same relative files with the
/// same bytes.
///
/// `b` is compared as it would have been produced by
/// [`copy_dir_recursive`] with `skip_git`: links in `a` are followed and
/// `.git` directories in `a` are ignored.  Any read error counts as a
/// mismatch.
#[must_use]
pub fn trees_equal(a: &Path, b: &Path) -> bool {
    fn walk(a: &Path, b: &Path) -> io::Result<bool> {
        let mut expected = 0usize;
        for entry in std::fs::read_dir(a)? {
            let entry = entry?;
            let a_path = entry.path();
            let b_path = b.join(entry.file_name());
            if a_path.is_dir() {
                if entry.file_name() == ".git" {
                    continue;
                }
                if !b_path.symlink_metadata()?.is_dir() || !walk(&a_path, &b_path)? {
                    return Ok(false);
                }
            } else {
                let b_meta = b_path.symlink_metadata()?;
                if !b_meta.is_file() || std::fs::read(&a_path)? != std::fs::read(&b_path)? {
                    return Ok(false);
                }
            }
            expected += 1;
        }
        Ok(std::fs::read_dir(b)?.count() == expected)
    }
    walk(a, b).unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_chain_under_a_directory_is_creatable() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        check_dir_creatable(&deep).unwrap();
        check_parent_dir(&deep.join("file")).unwrap();
        assert!(!dir.path().join("a").exists(), "nothing created");
    }

    #[test]
    fn file_in_the_chain_blocks_creation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("backups");
        std::fs::write(&blocker, "x").unwrap();

        let err = check_dir_creatable(&blocker).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);
        let err = check_parent_dir(&blocker.join("sub/target")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);
        assert!(std::fs::create_dir_all(blocker.join("sub")).is_err());
    }

    #[test]
    fn copies_files_and_subdirectories() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        std::fs::write(src.path().join("a.txt"), b"aaa").unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/b.txt"), b"bbb").unwrap();

        let target = dst.path().join("out");
        copy_dir_recursive(src.path(), &target, false).unwrap();

        assert_eq!(std::fs::read(target.join("a.txt")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(target.join("sub/b.txt")).unwrap(), b"bbb");
    }

    #[test]
    fn skips_git_directory_when_flag_set() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        std::fs::write(src.path().join("file.txt"), b"content").unwrap();
        std::fs::create_dir(src.path().join(".git")).unwrap();
        std::fs::write(src.path().join(".git/HEAD"), b"ref: refs/heads/main").unwrap();

        let target = dst.path().join("out");
        copy_dir_recursive(src.path(), &target, true).unwrap();

        assert!(target.join("file.txt").exists());
        assert!(
            !target.join(".git").exists(),
            ".git directory should be skipped"
        );
    }

    // -----------------------------------------------------------------------
    // ensure_parent_dir / temp_sibling
    // -----------------------------------------------------------------------

    #[test]
    fn ensure_parent_dir_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("file.txt");
        ensure_parent_dir(&nested).unwrap();
        assert!(dir.path().join("a").join("b").exists());
    }

    #[test]
    fn temp_sibling_stays_in_parent() {
        let target = Path::new("/home/u/.config/git/config");
        let tmp = temp_sibling(target, "deploy");
        assert_eq!(tmp.parent(), target.parent());
        assert_ne!(tmp, target);
        assert!(tmp.file_name().unwrap().to_string_lossy().starts_with(".config."));
    }

    // -----------------------------------------------------------------------
    // copy_tree_preserving_links
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn preserving_copy_recreates_links() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("real.txt"), "r").unwrap();
        std::os::unix::fs::symlink("/nonexistent/elsewhere", src.path().join("link")).unwrap();

        copy_tree_preserving_links(src.path(), dst.path()).unwrap();

        assert_eq!(
            std::fs::read_link(dst.path().join("link")).unwrap(),
            PathBuf::from("/nonexistent/elsewhere")
        );
        assert_eq!(std::fs::read_to_string(dst.path().join("real.txt")).unwrap(), "r");
    }

    // -----------------------------------------------------------------------
    // trees_equal
    // -----------------------------------------------------------------------

    #[test]
    fn trees_equal_after_copy() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/x"), "x").unwrap();
        let out = dst.path().join("out");
        copy_dir_recursive(src.path(), &out, true).unwrap();

        assert!(trees_equal(src.path(), &out));
    }

    #[test]
    fn trees_differ_on_content_or_extra_entries() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("x"), "x").unwrap();
        let out = dst.path().join("out");
        copy_dir_recursive(src.path(), &out, true).unwrap();

        std::fs::write(out.join("extra"), "e").unwrap();
        assert!(!trees_equal(src.path(), &out), "extra entry");

        std::fs::remove_file(out.join("extra")).unwrap();
        std::fs::write(out.join("x"), "changed").unwrap();
        assert!(!trees_equal(src.path(), &out), "changed content");
    }
}
