//! Repository configuration for an upgrade target, and the guarded write of it.

use crate::{
    backup::BackupSet,
    config::Config,
    distribution::{Distribution, DistributionProfile, UpgradeChannel},
    plan::Target,
};
use std::{
    fs,
    io::{self, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;

const DEBIAN_MIRROR: &str = "http://deb.debian.org/debian";
const DEBIAN_SECURITY: &str = "http://security.debian.org/debian-security";
const DEBIAN_COMPONENTS: &str = "main contrib non-free non-free-firmware";
const KALI_MIRROR: &str = "http://http.kali.org/kali";
const ALPINE_MIRROR: &str = "https://dl-cdn.alpinelinux.org/alpine";
const OPENSUSE_MIRROR: &str = "https://download.opensuse.org";

const ARCH_MIRRORLIST: &str = "\
## Arch Linux repository mirrorlist
## Generated by distro-upgrade
Server = https://geo.mirror.pkgbuild.com/$repo/os/$arch
Server = https://mirror.rackspace.com/archlinux/$repo/os/$arch
Server = https://mirrors.kernel.org/archlinux/$repo/os/$arch
";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{} repositories are derived by its own tooling and are not rewritten", _0)]
    Unmanaged(Distribution),
    #[error("refusing to write {}: no backup of it exists", _0.display())]
    NotBackedUp(PathBuf),
    #[error("failed to write repository configuration to {}", path.display())]
    Write { path: PathBuf, #[source] why: io::Error },
    #[error("failed to remove superseded repository file {}", path.display())]
    Replace { path: PathBuf, #[source] why: io::Error },
}

/// The repository configuration for `target`.
///
/// Returns `None` for distributions whose own upgrade tooling derives the
/// repositories from the release version, so there is nothing to rewrite.
pub fn render(distribution: Distribution, channel: &UpgradeChannel, target: &Target) -> Option<String> {
    let content = match distribution {
        Distribution::Ubuntu => ubuntu(channel),
        Distribution::Debian => debian(target),
        Distribution::Kali => kali(target),
        Distribution::Alpine => alpine(target),
        Distribution::Arch => ARCH_MIRRORLIST.to_owned(),
        Distribution::OpenSuse => opensuse(target),
        Distribution::Fedora | Distribution::RhelClone => return None,
    };

    Some(content)
}

fn ubuntu(channel: &UpgradeChannel) -> String {
    let prompt = if channel.name == "lts" { "lts" } else { "normal" };
    fomat!("[DEFAULT]\nPrompt=" (prompt) "\n")
}

fn suite(target: &Target) -> String {
    match target {
        Target::Rolling(sentinel) => (*sentinel).to_owned(),
        Target::Version(version) => version.to_string(),
    }
}

fn debian(target: &Target) -> String {
    let suite = suite(target);
    if suite == "sid" || suite == "unstable" {
        return fomat!("deb " (DEBIAN_MIRROR) " " (suite) " " (DEBIAN_COMPONENTS) "\n");
    }

    fomat!(
        "deb " (DEBIAN_MIRROR) " " (suite) " " (DEBIAN_COMPONENTS) "\n"
        "deb " (DEBIAN_MIRROR) " " (suite) "-updates " (DEBIAN_COMPONENTS) "\n"
        "deb " (DEBIAN_SECURITY) " " (suite) "-security " (DEBIAN_COMPONENTS) "\n"
    )
}

fn kali(target: &Target) -> String {
    let line = |suite: &str| fomat!("deb " (KALI_MIRROR) " " (suite) " " (DEBIAN_COMPONENTS) "\n");

    match suite(target).as_str() {
        "kali-last-snapshot" => line("kali-last-snapshot"),
        // Overlay suites only carry the packages that differ from rolling.
        overlay @ "kali-bleeding-edge" | overlay @ "kali-experimental" => {
            [line("kali-rolling"), line(overlay)].concat()
        }
        _ => line("kali-rolling"),
    }
}

fn alpine(target: &Target) -> String {
    let branch = match target {
        Target::Version(version) => fomat!("v" (version)),
        Target::Rolling(_) => "edge".to_owned(),
    };

    let mut content = fomat!(
        (ALPINE_MIRROR) "/" (branch) "/main\n"
        (ALPINE_MIRROR) "/" (branch) "/community\n"
    );

    if branch == "edge" {
        content.push_str(&fomat!((ALPINE_MIRROR) "/edge/testing\n"));
    }

    content
}

fn opensuse(target: &Target) -> String {
    let (oss, non_oss, update) = match target {
        Target::Version(version) if version.major() >= 42 => (
            fomat!((OPENSUSE_MIRROR) "/distribution/leap/" (version) "/repo/oss/suse/"),
            fomat!((OPENSUSE_MIRROR) "/distribution/leap/" (version) "/repo/non-oss/suse/"),
            fomat!((OPENSUSE_MIRROR) "/update/leap/" (version) "/oss/"),
        ),
        Target::Version(version) => (
            fomat!((OPENSUSE_MIRROR) "/distribution/leap/" (version) "/repo/oss/"),
            fomat!((OPENSUSE_MIRROR) "/distribution/leap/" (version) "/repo/non-oss/"),
            fomat!((OPENSUSE_MIRROR) "/update/leap/" (version) "/oss/"),
        ),
        Target::Rolling(_) => (
            fomat!((OPENSUSE_MIRROR) "/tumbleweed/repo/oss/"),
            fomat!((OPENSUSE_MIRROR) "/tumbleweed/repo/non-oss/"),
            fomat!((OPENSUSE_MIRROR) "/update/tumbleweed/"),
        ),
    };

    let section = |alias: &str, name: &str, url: &str| {
        fomat!(
            "[" (alias) "]\n"
            "name=" (name) "\n"
            "enabled=1\n"
            "autorefresh=1\n"
            "baseurl=" (url) "\n"
            "type=rpm-md\n"
            "keeppackages=0\n"
        )
    };

    let mut sections = vec![
        section("repo-oss", "Main Repository", &oss),
        section("repo-non-oss", "Non-OSS Repository", &non_oss),
        section("repo-update", "Main Update Repository", &update),
    ];

    // Leap 15.3 onwards shares its binaries with SLE, whose updates arrive
    // through two extra repositories.
    if let Target::Version(version) = target {
        if version.major() == 15 && version.components().get(1).map_or(false, |&minor| minor >= 3) {
            let updates = fomat!((OPENSUSE_MIRROR) "/update/leap/" (version));
            sections.push(section(
                "repo-sle-update",
                "Update repository with updates from SUSE Linux Enterprise",
                &fomat!((updates) "/sle/"),
            ));
            sections.push(section(
                "repo-backports-update",
                "Update repository of openSUSE Backports",
                &fomat!((updates) "/backports/"),
            ));
        }
    }

    sections.join("\n")
}

/// Writes rendered configuration to the profile's managed path.
///
/// `backups` must cover that path with a copy that exists on disk. In a dry
/// run, nothing is written.
pub fn write(
    config: &Config,
    profile: &DistributionProfile,
    content: &str,
    backups: &BackupSet,
) -> Result<PathBuf, RepoError> {
    let managed = profile.repository.managed.ok_or(RepoError::Unmanaged(profile.distribution))?;
    let path = config.path(managed);

    if !backups.covers(&path) {
        return Err(RepoError::NotBackedUp(path));
    }

    if config.dry_run {
        info!("would write {} ({} lines)", path.display(), content.lines().count());
        return Ok(path);
    }

    if let Some(prefix) = profile.repository.replaces {
        remove_superseded(&path, prefix)?;
    }

    info!("writing {}", path.display());
    atomic_write(&path, content).map_err(|why| RepoError::Write { path: path.clone(), why })?;
    Ok(path)
}

/// Removes the distribution-owned siblings of `path` that the rendered file replaces.
fn remove_superseded(path: &Path, prefix: &str) -> Result<(), RepoError> {
    let dir = match path.parent() {
        Some(dir) => dir,
        None => return Ok(()),
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(ref why) if why.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(why) => return Err(RepoError::Replace { path: dir.to_path_buf(), why }),
    };

    for entry in entries.filter_map(Result::ok) {
        let candidate = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if candidate != path && name.starts_with(prefix) && name.ends_with(".repo") {
            info!("removing superseded {}", candidate.display());
            fs::remove_file(&candidate)
                .map_err(|why| RepoError::Replace { path: candidate.clone(), why })?;
        }
    }

    Ok(())
}

fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;
    fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644))?;
    file.persist(path).map_err(|why| why.error)?;
    Ok(())
}
