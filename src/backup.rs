//! Timestamped copies of repository configuration, taken before it is rewritten.

use crate::misc;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tempfile::{Builder, TempDir};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{} has no parent directory", _0.display())]
    NoParent(PathBuf),
    #[error("backup already exists at {}", _0.display())]
    Exists(PathBuf),
    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy { from: PathBuf, to: PathBuf, #[source] why: io::Error },
    #[error("failed to move {} into place at {}", from.display(), to.display())]
    Rename { from: PathBuf, to: PathBuf, #[source] why: io::Error },
    #[error("failed to remove {}", _0.display())]
    Remove(PathBuf, #[source] io::Error),
    #[error("backup at {} is missing", _0.display())]
    Missing(PathBuf),
}

/// The pre-upgrade state of a configuration path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub timestamp: String,
    /// When false, there was nothing to copy, and restoring removes whatever
    /// the upgrade wrote at `original`.
    pub original_existed: bool,
}

impl BackupRecord {
    /// Whether this record can stand in for the pre-upgrade state of `path`.
    pub fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.original) && (!self.original_existed || self.backup.exists())
    }
}

/// Backups of every path an upgrade may rewrite, taken with one timestamp.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackupSet {
    pub records: Vec<BackupRecord>,
}

impl BackupSet {
    pub fn covers(&self, path: &Path) -> bool { self.records.iter().any(|r| r.covers(path)) }
}

/// Backs up each of `originals`, stopping at the first failure.
pub fn backup_all<P: AsRef<Path>>(originals: &[P], timestamp: &str) -> Result<BackupSet, BackupError> {
    let records = originals
        .iter()
        .map(|original| backup(original.as_ref(), timestamp))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BackupSet { records })
}

/// Restores every record in the set. A failed restore does not stop the others;
/// the first failure is returned.
pub fn restore_all(set: &BackupSet) -> Result<(), BackupError> {
    let mut first = None;
    for record in &set.records {
        if let Err(why) = restore(record) {
            error!("{}", misc::format_error(&why));
            first.get_or_insert(why);
        }
    }

    first.map_or(Ok(()), Err)
}

/// `<original>.bak.<timestamp>`
pub fn backup_path(original: &Path, timestamp: &str) -> Option<PathBuf> {
    let mut name = original.file_name()?.to_os_string();
    name.push(".bak.");
    name.push(timestamp);
    Some(original.with_file_name(name))
}

/// Copies `original` to its timestamped sibling.
///
/// The copy is assembled under a temporary name and renamed into place, so the
/// backup path either does not exist or holds a complete copy.
pub fn backup(original: &Path, timestamp: &str) -> Result<BackupRecord, BackupError> {
    let backup =
        backup_path(original, timestamp).ok_or_else(|| BackupError::NoParent(original.into()))?;

    if backup.exists() {
        return Err(BackupError::Exists(backup));
    }

    let original_existed = fs::symlink_metadata(original).is_ok();
    if original_existed {
        info!("backing up {} to {}", original.display(), backup.display());
        let staging = stage(original, original)?;
        let staged = staging.path().join("copy");
        fs::rename(&staged, &backup)
            .map_err(|why| BackupError::Rename { from: staged, to: backup.clone(), why })?;
    } else {
        info!("{} does not exist; nothing to back up", original.display());
    }

    Ok(BackupRecord {
        original: original.to_path_buf(),
        backup,
        timestamp: timestamp.to_owned(),
        original_existed,
    })
}

/// Puts the recorded pre-upgrade state back at the original path.
///
/// The backup itself is left in place.
pub fn restore(record: &BackupRecord) -> Result<(), BackupError> {
    let original = &record.original;

    if !record.original_existed {
        info!("removing {}, which did not exist before the upgrade", original.display());
        return remove(original);
    }

    if fs::symlink_metadata(&record.backup).is_err() {
        return Err(BackupError::Missing(record.backup.clone()));
    }

    info!("restoring {} from {}", original.display(), record.backup.display());
    let staging = stage(&record.backup, original)?;
    let staged = staging.path().join("copy");

    remove(original)?;
    fs::rename(&staged, original)
        .map_err(|why| BackupError::Rename { from: staged, to: original.clone(), why })
}

/// Copies `source` into a temporary directory beside `beside`, returning the
/// directory, which holds the copy at `copy`.
fn stage(source: &Path, beside: &Path) -> Result<TempDir, BackupError> {
    let parent = beside.parent().ok_or_else(|| BackupError::NoParent(beside.into()))?;
    let staging = Builder::new()
        .prefix(".distro-upgrade")
        .tempdir_in(parent)
        .map_err(|why| BackupError::Copy { from: source.into(), to: parent.into(), why })?;

    let target = staging.path().join("copy");
    copy_tree(source, &target)
        .map_err(|why| BackupError::Copy { from: source.into(), to: target, why })?;

    Ok(staging)
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        std::os::unix::fs::symlink(fs::read_link(source)?, target)
    } else if file_type.is_dir() {
        fs::create_dir(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &target.join(entry.file_name()))?;
        }
        fs::set_permissions(target, metadata.permissions())
    } else {
        fs::copy(source, target).map(|_| ())
    }
}

fn remove(path: &Path) -> Result<(), BackupError> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(ref why) if why.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(why) => Err(why),
    };

    result.map_err(|why| BackupError::Remove(path.into(), why))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = "deb http://deb.debian.org/debian bookworm main\n";

    #[test]
    fn naming() {
        assert_eq!(
            backup_path(Path::new("/etc/apt/sources.list"), "20261019-101500").unwrap(),
            Path::new("/etc/apt/sources.list.bak.20261019-101500")
        );
        assert_eq!(backup_path(Path::new("/"), "x"), None);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("sources.list");
        fs::write(&original, SOURCES).unwrap();

        let record = backup(&original, "1").unwrap();
        assert!(record.original_existed);
        assert!(record.covers(&original));
        assert_eq!(fs::read_to_string(&record.backup).unwrap(), SOURCES);

        fs::write(&original, "deb http://deb.debian.org/debian trixie main\n").unwrap();
        restore(&record).unwrap();

        assert_eq!(fs::read(&original).unwrap(), SOURCES.as_bytes());
        assert!(record.backup.exists());

        // No staging directories are left behind.
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with(".distro"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repos = dir.path().join("repos.d");
        fs::create_dir(&repos).unwrap();
        fs::write(repos.join("repo-oss.repo"), "[repo-oss]\n").unwrap();
        fs::write(repos.join("packman.repo"), "[packman]\n").unwrap();

        let record = backup(&repos, "1").unwrap();
        assert!(record.covers(&repos.join("repo-oss.repo")));

        fs::remove_file(repos.join("repo-oss.repo")).unwrap();
        fs::write(repos.join("repo-new.repo"), "[new]\n").unwrap();
        restore(&record).unwrap();

        let mut names: Vec<_> = fs::read_dir(&repos)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["packman.repo", "repo-oss.repo"]);
    }

    #[test]
    fn missing_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("repositories");

        let record = backup(&original, "1").unwrap();
        assert!(!record.original_existed);
        assert!(!record.backup.exists());

        fs::write(&original, "written by the upgrade\n").unwrap();
        restore(&record).unwrap();
        assert!(!original.exists());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("mirrorlist");
        fs::write(&original, "Server = x\n").unwrap();

        backup(&original, "1").unwrap();
        assert!(matches!(backup(&original, "1"), Err(BackupError::Exists(_))));
    }

    #[test]
    fn missing_backup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("mirrorlist");
        fs::write(&original, "Server = x\n").unwrap();

        let record = backup(&original, "1").unwrap();
        fs::remove_file(&record.backup).unwrap();
        assert!(!record.covers(&original));
        assert!(matches!(restore(&record), Err(BackupError::Missing(_))));
        assert!(original.exists());
    }

    #[test]
    fn set_restores_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources.list");
        let parts = dir.path().join("sources.list.d");
        let missing = dir.path().join("release-upgrades");
        fs::write(&sources, SOURCES).unwrap();
        fs::create_dir(&parts).unwrap();
        fs::write(parts.join("ubuntu.sources"), "Suites: jammy\n").unwrap();

        let set = backup_all(&[&sources, &parts, &missing], "1").unwrap();
        assert_eq!(set.records.len(), 3);
        assert!(set.covers(&parts.join("ubuntu.sources")));
        assert!(!set.covers(&dir.path().join("preferences")));

        fs::write(&sources, "deb http://archive.ubuntu.com/ubuntu noble main\n").unwrap();
        fs::write(parts.join("ubuntu.sources"), "Suites: noble\n").unwrap();
        fs::write(parts.join("third-party.sources"), "Suites: noble\n").unwrap();
        fs::write(&missing, "[DEFAULT]\n").unwrap();
        restore_all(&set).unwrap();

        assert_eq!(fs::read_to_string(&sources).unwrap(), SOURCES);
        assert_eq!(fs::read_to_string(parts.join("ubuntu.sources")).unwrap(), "Suites: jammy\n");
        assert!(!parts.join("third-party.sources").exists());
        assert!(!missing.exists());
    }

    #[test]
    fn set_restore_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("mirrorlist");
        let second = dir.path().join("repositories");
        fs::write(&first, "Server = a\n").unwrap();
        fs::write(&second, "main\n").unwrap();

        let set = backup_all(&[&first, &second], "1").unwrap();
        fs::remove_file(&set.records[0].backup).unwrap();
        fs::write(&second, "edge\n").unwrap();

        assert!(matches!(restore_all(&set), Err(BackupError::Missing(_))));
        assert_eq!(fs::read_to_string(&second).unwrap(), "main\n");
    }
}
