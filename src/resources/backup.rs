//! Pre-mutation snapshots of existing targets.
//!
//! A backup is always written *next to nothing*: timestamped names are
//! reserved with create-new semantics and a numeric suffix on collision, and
//! simple names are staged to a temp sibling before replacing the previous
//! backup.  A failed snapshot is removed and the original is never touched.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::conflict::{ExistingState, inspect};
use super::error::ReconcileError;
use super::helpers::fs::{check_dir_creatable, copy_tree_preserving_links, temp_sibling};
use super::symlink::{create_symlink, remove_entry};
use super::{BackupFormat, BackupPolicy};

/// Attempts at finding a free timestamped name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Proof that a snapshot exists on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    /// Path that was backed up.
    pub original_path: PathBuf,
    /// Where the copy was written.
    pub backup_path: PathBuf,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Naming scheme used.
    pub format: BackupFormat,
    /// Whether the copy is gzipped.
    pub compressed: bool,
}

/// A successful backup plus any degradations that happened along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// The written backup.
    pub record: BackupRecord,
    /// Non-fatal problems, such as a failed compression.
    pub warnings: Vec<String>,
}

/// Writes backups into a default directory unless a policy overrides it.
#[derive(Debug, Clone)]
pub struct BackupManager {
    default_dir: PathBuf,
}

impl BackupManager {
    /// Manager falling back to `default_dir` when a policy names no directory.
    #[must_use]
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
        }
    }

    /// Directory a backup under `policy` lands in.
    #[must_use]
    pub fn directory<'a>(&'a self, policy: &'a BackupPolicy) -> &'a Path {
        policy.directory.as_deref().unwrap_or(&self.default_dir)
    }

    /// Where a backup of `path` would be written, before collision handling.
    #[must_use]
    pub fn planned_path(&self, path: &Path, policy: &BackupPolicy, resource_id: &str) -> PathBuf {
        let base = match policy.format {
            BackupFormat::Timestamped => timestamped_stem(path, resource_id, Utc::now()),
            BackupFormat::Simple => simple_stem(path, resource_id),
        };
        self.directory(policy).join(format!("{base}.bak"))
    }

    /// Warnings a backup of a `state` entry under `policy` will carry
    /// regardless of how the copy goes.
    #[must_use]
    pub fn expected_warnings(state: ExistingState, policy: &BackupPolicy) -> Vec<String> {
        if policy.compress && state != ExistingState::RegularFile {
            vec![format!(
                "compression applies to regular files only; the {state} backup is stored uncompressed"
            )]
        } else {
            Vec::new()
        }
    }

    /// Snapshot whatever occupies `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Backup`] if the path is absent, the backup
    /// directory cannot be created, or the snapshot cannot be written.  The
    /// partial snapshot is removed before returning.
    pub fn backup(
        &self,
        path: &Path,
        policy: &BackupPolicy,
        resource_id: &str,
    ) -> Result<BackupOutcome, ReconcileError> {
        let fail = |reason: String| ReconcileError::Backup {
            path: path.display().to_string(),
            reason,
        };

        let state = inspect(path).map_err(|e| fail(format!("cannot inspect: {e}")))?;
        if state == ExistingState::Absent {
            return Err(fail("nothing exists at this path".to_string()));
        }

        let dir = self.directory(policy);
        check_dir_creatable(dir)
            .and_then(|()| std::fs::create_dir_all(dir))
            .map_err(|e| fail(format!("cannot create {}: {e}", dir.display())))?;

        let timestamp = Utc::now();
        let raw_path = match policy.format {
            BackupFormat::Timestamped => {
                let stem = timestamped_stem(path, resource_id, timestamp);
                write_unique(path, state, dir, &stem, policy.compress).map_err(&fail)?
            }
            BackupFormat::Simple => {
                let stem = simple_stem(path, resource_id);
                write_replacing(path, state, &dir.join(format!("{stem}.bak"))).map_err(&fail)?
            }
        };

        let mut warnings = Self::expected_warnings(state, policy);
        let (backup_path, compressed) = if policy.compress && state == ExistingState::RegularFile {
            compress_or_keep(raw_path, &mut warnings)
        } else {
            (raw_path, false)
        };

        tracing::debug!(
            original = %path.display(),
            backup = %backup_path.display(),
            compressed,
            "backup written"
        );
        Ok(BackupOutcome {
            record: BackupRecord {
                original_path: path.to_path_buf(),
                backup_path,
                timestamp,
                format: policy.format,
                compressed,
            },
            warnings,
        })
    }
}

/// First twelve hex digits of SHA-256 over the resource id and target path.
fn backup_ident(path: &Path, resource_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(path.to_string_lossy().as_bytes());
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn display_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().trim_start_matches('.').to_string())
        .unwrap_or_default();
    if name.is_empty() {
        "root".to_string()
    } else {
        name
    }
}

fn timestamped_stem(path: &Path, resource_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}.{}.{}",
        display_name(path),
        at.format("%Y%m%dT%H%M%S%.6fZ"),
        backup_ident(path, resource_id)
    )
}

fn simple_stem(path: &Path, resource_id: &str) -> String {
    format!("{}.{}", display_name(path), backup_ident(path, resource_id))
}

fn with_gz(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".gz");
    PathBuf::from(s)
}

/// Write a snapshot at the first free `<stem>[-N].bak` name.
fn write_unique(
    source: &Path,
    state: ExistingState,
    dir: &Path,
    stem: &str,
    compress: bool,
) -> Result<PathBuf, String> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.bak")
        } else {
            format!("{stem}-{attempt}.bak")
        };
        let candidate = dir.join(name);
        if compress && with_gz(&candidate).symlink_metadata().is_ok() {
            continue;
        }
        match snapshot(source, state, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(SnapshotError::Occupied) => {}
            Err(SnapshotError::Io(e)) => return Err(format!("writing {}: {e}", candidate.display())),
        }
    }
    Err(format!(
        "no free backup name for {stem} after {MAX_NAME_ATTEMPTS} attempts"
    ))
}

/// Stage a snapshot next to `dest`, then swap it in for any previous backup.
fn write_replacing(source: &Path, state: ExistingState, dest: &Path) -> Result<PathBuf, String> {
    let staged = temp_sibling(dest, "backup");
    match snapshot(source, state, &staged) {
        Ok(()) => {}
        Err(SnapshotError::Occupied) => {
            return Err(format!("staging path {} is occupied", staged.display()));
        }
        Err(SnapshotError::Io(e)) => return Err(format!("writing {}: {e}", staged.display())),
    }
    let replace = || -> io::Result<()> {
        remove_entry(dest)?;
        remove_entry(&with_gz(dest))?;
        std::fs::rename(&staged, dest)
    };
    if let Err(e) = replace() {
        let _ = remove_entry(&staged);
        return Err(format!("replacing {}: {e}", dest.display()));
    }
    Ok(dest.to_path_buf())
}

enum SnapshotError {
    /// `dest` already existed; nothing was written.
    Occupied,
    Io(io::Error),
}

/// Copy the entry at `source` to the non-existent `dest`.
fn snapshot(source: &Path, state: ExistingState, dest: &Path) -> Result<(), SnapshotError> {
    let created = match state {
        ExistingState::RegularFile => OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .map(Some),
        ExistingState::Symlink => {
            let link = std::fs::read_link(source).map_err(SnapshotError::Io)?;
            create_symlink(&link, dest).map(|()| None)
        }
        ExistingState::Directory => std::fs::create_dir(dest).map(|()| None),
        ExistingState::Absent => return Err(SnapshotError::Io(io::ErrorKind::NotFound.into())),
    };
    let file = match created {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(SnapshotError::Occupied),
        Err(e) => return Err(SnapshotError::Io(e)),
    };

    let filled = match (state, file) {
        (ExistingState::RegularFile, Some(out)) => copy_file_contents(source, out, dest),
        (ExistingState::Directory, _) => copy_tree_preserving_links(source, dest),
        _ => Ok(()),
    };
    filled.map_err(|e| {
        let _ = remove_entry(dest);
        SnapshotError::Io(e)
    })
}

fn copy_file_contents(source: &Path, out: File, dest: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut writer = BufWriter::new(out);
    io::copy(&mut input, &mut writer)?;
    let out = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    out.sync_all()?;
    std::fs::set_permissions(dest, input.metadata()?.permissions())
}

/// Gzip a regular-file backup, keeping the raw copy when compression fails.
fn compress_or_keep(raw: PathBuf, warnings: &mut Vec<String>) -> (PathBuf, bool) {
    match compress_in_place(&raw) {
        Ok(gz) => (gz, true),
        Err(e) => {
            warnings.push(format!(
                "compression failed ({e}); keeping uncompressed backup {}",
                raw.display()
            ));
            (raw, false)
        }
    }
}

/// Gzip `raw` into `raw.gz` and remove `raw`.  An existing `raw.gz` is an
/// error and is left untouched.
fn compress_in_place(raw: &Path) -> io::Result<PathBuf> {
    let gz = with_gz(raw);
    let out = OpenOptions::new().write(true).create_new(true).open(&gz)?;
    if let Err(e) = gzip_file(raw, out) {
        let _ = std::fs::remove_file(&gz);
        return Err(e);
    }
    if let Err(e) = std::fs::remove_file(raw) {
        let _ = std::fs::remove_file(&gz);
        return Err(e);
    }
    Ok(gz)
}

fn gzip_file(raw: &Path, out: File) -> io::Result<()> {
    let mut input = BufReader::new(File::open(raw)?);
    let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder
        .finish()?
        .into_inner()
        .map_err(io::IntoInnerError::into_error)?
        .sync_all()
}
