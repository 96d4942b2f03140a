//! Optional filesystem snapshots taken before anything is changed.
//!
//! The snapshot is informational: its identifier is recorded so that it can be
//! found later, but no rollback to it is ever attempted.

use crate::{
    config::Config,
    executor::{CommandRunner, Invocation},
    misc,
};
use proc_mounts::MountIter;
use regex::Regex;
use std::{
    fmt::{self, Display, Formatter},
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Where btrfs snapshots of the root subvolume are placed.
const BTRFS_SNAPSHOTS: &str = "/.snapshots/distro-upgrade";
const LVM_SNAPSHOT_SIZE: &str = "10G";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Timeshift,
    Snapper,
    Btrfs,
    Lvm,
}

impl From<SnapshotKind> for &'static str {
    fn from(kind: SnapshotKind) -> Self {
        match kind {
            SnapshotKind::Timeshift => "timeshift",
            SnapshotKind::Snapper => "snapper",
            SnapshotKind::Btrfs => "btrfs",
            SnapshotKind::Lvm => "lvm",
        }
    }
}

impl Display for SnapshotKind {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(<&'static str>::from(*self)) }
}

/// A snapshot tool that is usable on this system.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotTool {
    Timeshift,
    Snapper,
    Btrfs,
    /// The logical volume mounted at `/`.
    Lvm { volume: PathBuf },
}

impl SnapshotTool {
    pub fn kind(&self) -> SnapshotKind {
        match self {
            SnapshotTool::Timeshift => SnapshotKind::Timeshift,
            SnapshotTool::Snapper => SnapshotKind::Snapper,
            SnapshotTool::Btrfs => SnapshotKind::Btrfs,
            SnapshotTool::Lvm { .. } => SnapshotKind::Lvm,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SnapshotHandle {
    pub tool: SnapshotKind,
    /// Snapshot number, name, or path, depending on the tool.
    pub identifier: String,
    pub label: String,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{} failed to create a snapshot", _0)]
    Create(SnapshotKind, #[source] io::Error),
    #[error("failed to record the snapshot at {}", _0.display())]
    Persist(PathBuf, #[source] io::Error),
    #[error("failed to serialize the snapshot record")]
    Serialize(#[from] serde_json::Error),
}

/// The first available tool, in order of preference.
pub fn detect(config: &Config) -> Option<SnapshotTool> {
    if misc::which(&config.root, "timeshift").is_some() {
        return Some(SnapshotTool::Timeshift);
    }

    if misc::which(&config.root, "snapper").is_some()
        && config.path("/etc/snapper/configs/root").exists()
    {
        return Some(SnapshotTool::Snapper);
    }

    let (source, fstype) = match root_mount(&config.path("/proc/mounts")) {
        Ok(Some(mount)) => mount,
        Ok(None) => return None,
        Err(why) => {
            warn!("unable to read mounts: {}", why);
            return None;
        }
    };

    if fstype == "btrfs" && misc::which(&config.root, "btrfs").is_some() {
        return Some(SnapshotTool::Btrfs);
    }

    if source.starts_with("/dev/mapper") && misc::which(&config.root, "lvcreate").is_some() {
        return Some(SnapshotTool::Lvm { volume: source });
    }

    None
}

/// Source device and filesystem type of the mount at `/`.
fn root_mount(mounts: &Path) -> io::Result<Option<(PathBuf, String)>> {
    let mut root = None;
    for mount in MountIter::new_from_file(mounts)? {
        let mount = mount?;
        // Later entries shadow earlier ones.
        if mount.dest == Path::new("/") {
            root = Some((mount.source, mount.fstype));
        }
    }

    Ok(root)
}

pub fn label(timestamp: &str) -> String { fomat!("distro-upgrade-" (timestamp)) }

/// Creates a snapshot named `label`.
pub fn create(
    tool: &SnapshotTool,
    label: &str,
    runner: &mut dyn CommandRunner,
) -> Result<SnapshotHandle, SnapshotError> {
    let kind = tool.kind();
    info!("creating {} snapshot {}", kind, label);

    let identifier = match tool {
        SnapshotTool::Timeshift => {
            let output = runner
                .capture(&Invocation::new("timeshift").args(&[
                    "--create",
                    "--scripted",
                    "--comments",
                    label,
                ]))
                .map_err(|why| SnapshotError::Create(kind, why))?;

            timeshift_name(&output).unwrap_or_else(|| label.to_owned())
        }
        SnapshotTool::Snapper => {
            let output = runner
                .capture(&Invocation::new("snapper").args(&[
                    "create",
                    "--type",
                    "single",
                    "--print-number",
                    "--description",
                    label,
                ]))
                .map_err(|why| SnapshotError::Create(kind, why))?;

            let number = output.trim();
            if number.is_empty() {
                label.to_owned()
            } else {
                number.to_owned()
            }
        }
        SnapshotTool::Btrfs => {
            let target = [BTRFS_SNAPSHOTS, "/", label].concat();
            runner
                .run(&Invocation::new("mkdir").args(&["-p", BTRFS_SNAPSHOTS]))
                .map_err(|why| SnapshotError::Create(kind, why))?;
            runner
                .run(&Invocation::new("btrfs").args(&[
                    "subvolume",
                    "snapshot",
                    "-r",
                    "/",
                    target.as_str(),
                ]))
                .map_err(|why| SnapshotError::Create(kind, why))?;
            target
        }
        SnapshotTool::Lvm { volume } => {
            runner
                .run(&Invocation::new("lvcreate").args(&[
                    "--snapshot",
                    "--name",
                    label,
                    "--size",
                    LVM_SNAPSHOT_SIZE,
                    &*volume.to_string_lossy(),
                ]))
                .map_err(|why| SnapshotError::Create(kind, why))?;
            label.to_owned()
        }
    };

    Ok(SnapshotHandle { tool: kind, identifier, label: label.to_owned() })
}

fn timeshift_name(output: &str) -> Option<String> {
    let regex = Regex::new(r"Tagged snapshot '([^']+)'").ok()?;
    regex.captures(output).and_then(|c| c.get(1)).map(|m| m.as_str().to_owned())
}

/// Records `handle` where a later process can find it.
pub fn persist(handle: &SnapshotHandle, path: &Path) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(handle)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|why| SnapshotError::Persist(parent.into(), why))?;
    }

    fs::write(path, json).map_err(|why| SnapshotError::Persist(path.into(), why))
}

pub fn load(path: &Path) -> io::Result<SnapshotHandle> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|why| io::Error::new(io::ErrorKind::InvalidData, why))
}
