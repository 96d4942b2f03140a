//! Static descriptions of the supported distributions, and detection of the running one.

use crate::{config::Config, version::ReleaseVersion};
use os_release::OsRelease;
use std::{
    fmt::{self, Display, Formatter},
    fs, io,
    str::FromStr,
};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Distribution {
    Ubuntu,
    Debian,
    Fedora,
    Arch,
    Alpine,
    Kali,
    OpenSuse,
    RhelClone,
}

impl Distribution {
    pub const ALL: [Distribution; 8] = [
        Distribution::Ubuntu,
        Distribution::Debian,
        Distribution::Fedora,
        Distribution::Arch,
        Distribution::Alpine,
        Distribution::Kali,
        Distribution::OpenSuse,
        Distribution::RhelClone,
    ];

    pub fn profile(self) -> &'static DistributionProfile {
        match self {
            Distribution::Ubuntu => &UBUNTU,
            Distribution::Debian => &DEBIAN,
            Distribution::Fedora => &FEDORA,
            Distribution::Arch => &ARCH,
            Distribution::Alpine => &ALPINE,
            Distribution::Kali => &KALI,
            Distribution::OpenSuse => &OPENSUSE,
            Distribution::RhelClone => &RHEL_CLONE,
        }
    }
}

impl From<Distribution> for &'static str {
    fn from(distribution: Distribution) -> Self {
        match distribution {
            Distribution::Ubuntu => "ubuntu",
            Distribution::Debian => "debian",
            Distribution::Fedora => "fedora",
            Distribution::Arch => "arch",
            Distribution::Alpine => "alpine",
            Distribution::Kali => "kali",
            Distribution::OpenSuse => "opensuse",
            Distribution::RhelClone => "rhel-clone",
        }
    }
}

impl Display for Distribution {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(<&'static str>::from(*self)) }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown distribution: {}", _0)]
pub struct UnknownDistribution(pub String);

impl FromStr for Distribution {
    type Err = UnknownDistribution;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let distribution = match input {
            "ubuntu" => Distribution::Ubuntu,
            "debian" => Distribution::Debian,
            "fedora" => Distribution::Fedora,
            "arch" => Distribution::Arch,
            "alpine" => Distribution::Alpine,
            "kali" => Distribution::Kali,
            "opensuse" => Distribution::OpenSuse,
            "rhel" | "rhel-clone" | "rocky" | "alma" => Distribution::RhelClone,
            _ => return Err(UnknownDistribution(input.to_owned())),
        };

        Ok(distribution)
    }
}

/// Which release versions a mirror listing may offer as a target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionFilter {
    Any,
    /// Excludes legacy lines numbered at or above this major version.
    Below(u32),
    /// Only the major release directly after the running one.
    NextMajor,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// A channel with no discrete version, named by its sentinel.
    Fixed(&'static str),
    /// The highest version found in a listing fetched from `url`. The first capture
    /// group of `pattern` is the version token.
    Mirror { url: &'static str, pattern: &'static str, filter: VersionFilter },
}

#[derive(Debug, Eq, PartialEq)]
pub struct UpgradeChannel {
    pub name: &'static str,
    pub resolution: Resolution,
}

impl UpgradeChannel {
    pub fn is_rolling(&self) -> bool {
        matches!(self.resolution, Resolution::Fixed(_))
    }
}

/// The repository configuration a distribution's package manager reads.
#[derive(Debug, Eq, PartialEq)]
pub struct RepositoryConfig {
    /// Files and directories that are backed up before an upgrade.
    pub paths: &'static [&'static str],
    /// File that receives the rendered configuration, if the distribution gets one.
    pub managed: Option<&'static str>,
    /// Within a directory config, prefix of the distribution-owned files that the
    /// managed file replaces.
    pub replaces: Option<&'static str>,
}

#[derive(Debug)]
pub struct DistributionProfile {
    pub distribution: Distribution,
    /// Accepted values of the os-release `ID` field.
    pub ids: &'static [&'static str],
    /// File whose presence identifies the distribution when os-release is absent.
    pub marker: Option<&'static str>,
    pub repository: RepositoryConfig,
    pub channels: &'static [UpgradeChannel],
}

impl DistributionProfile {
    pub fn channel(&self, name: &str) -> Option<&'static UpgradeChannel> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|channel| channel.name).collect()
    }
}

static UBUNTU: DistributionProfile = DistributionProfile {
    distribution: Distribution::Ubuntu,
    ids: &["ubuntu"],
    marker: None,
    repository: RepositoryConfig {
        // do-release-upgrade rewrites the apt sources itself.
        paths: &[
            "/etc/update-manager/release-upgrades",
            "/etc/apt/sources.list",
            "/etc/apt/sources.list.d",
        ],
        managed: Some("/etc/update-manager/release-upgrades"),
        replaces: None,
    },
    channels: &[
        UpgradeChannel {
            name: "lts",
            resolution: Resolution::Mirror {
                url: "https://changelogs.ubuntu.com/meta-release-lts",
                pattern: r"Version: (\d+\.\d+)",
                filter: VersionFilter::Any,
            },
        },
        UpgradeChannel {
            name: "release",
            resolution: Resolution::Mirror {
                url: "https://changelogs.ubuntu.com/meta-release",
                pattern: r"Version: (\d+\.\d+)",
                filter: VersionFilter::Any,
            },
        },
    ],
};

static DEBIAN: DistributionProfile = DistributionProfile {
    distribution: Distribution::Debian,
    ids: &["debian"],
    marker: Some("/etc/debian_version"),
    repository: RepositoryConfig {
        paths: &["/etc/apt/sources.list"],
        managed: Some("/etc/apt/sources.list"),
        replaces: None,
    },
    channels: &[
        UpgradeChannel { name: "stable", resolution: Resolution::Fixed("stable") },
        UpgradeChannel { name: "testing", resolution: Resolution::Fixed("testing") },
        UpgradeChannel { name: "sid", resolution: Resolution::Fixed("sid") },
    ],
};

static FEDORA: DistributionProfile = DistributionProfile {
    distribution: Distribution::Fedora,
    ids: &["fedora"],
    marker: Some("/etc/fedora-release"),
    repository: RepositoryConfig { paths: &["/etc/yum.repos.d"], managed: None, replaces: None },
    channels: &[
        UpgradeChannel {
            name: "stable",
            resolution: Resolution::Mirror {
                url: "https://dl.fedoraproject.org/pub/fedora/linux/releases/",
                pattern: r#"href="(\d+)/""#,
                filter: VersionFilter::Any,
            },
        },
        UpgradeChannel { name: "rawhide", resolution: Resolution::Fixed("rawhide") },
    ],
};

static ARCH: DistributionProfile = DistributionProfile {
    distribution: Distribution::Arch,
    ids: &["arch", "archarm"],
    marker: Some("/etc/arch-release"),
    repository: RepositoryConfig {
        paths: &["/etc/pacman.d/mirrorlist"],
        managed: Some("/etc/pacman.d/mirrorlist"),
        replaces: None,
    },
    channels: &[UpgradeChannel { name: "rolling", resolution: Resolution::Fixed("rolling") }],
};

static ALPINE: DistributionProfile = DistributionProfile {
    distribution: Distribution::Alpine,
    ids: &["alpine"],
    marker: Some("/etc/alpine-release"),
    repository: RepositoryConfig {
        paths: &["/etc/apk/repositories"],
        managed: Some("/etc/apk/repositories"),
        replaces: None,
    },
    channels: &[
        UpgradeChannel {
            name: "stable",
            resolution: Resolution::Mirror {
                url: "https://dl-cdn.alpinelinux.org/alpine/",
                pattern: r#"href="v(\d+\.\d+)/""#,
                filter: VersionFilter::Any,
            },
        },
        UpgradeChannel { name: "edge", resolution: Resolution::Fixed("edge") },
    ],
};

static KALI: DistributionProfile = DistributionProfile {
    distribution: Distribution::Kali,
    ids: &["kali"],
    marker: None,
    repository: RepositoryConfig {
        paths: &["/etc/apt/sources.list"],
        managed: Some("/etc/apt/sources.list"),
        replaces: None,
    },
    channels: &[
        UpgradeChannel { name: "rolling", resolution: Resolution::Fixed("kali-rolling") },
        UpgradeChannel {
            name: "last-snapshot",
            resolution: Resolution::Fixed("kali-last-snapshot"),
        },
        UpgradeChannel {
            name: "bleeding-edge",
            resolution: Resolution::Fixed("kali-bleeding-edge"),
        },
        UpgradeChannel {
            name: "experimental",
            resolution: Resolution::Fixed("kali-experimental"),
        },
    ],
};

static OPENSUSE: DistributionProfile = DistributionProfile {
    distribution: Distribution::OpenSuse,
    ids: &["opensuse-leap", "opensuse-tumbleweed", "opensuse-slowroll", "opensuse"],
    marker: None,
    repository: RepositoryConfig {
        paths: &["/etc/zypp/repos.d"],
        managed: Some("/etc/zypp/repos.d/repo-oss.repo"),
        replaces: Some("repo-"),
    },
    channels: &[
        UpgradeChannel {
            name: "leap",
            resolution: Resolution::Mirror {
                url: "https://download.opensuse.org/distribution/leap/",
                pattern: r#"href="(?:\./)?(\d+\.\d+)/""#,
                filter: VersionFilter::Below(42),
            },
        },
        UpgradeChannel { name: "tumbleweed", resolution: Resolution::Fixed("tumbleweed") },
    ],
};

static RHEL_CLONE: DistributionProfile = DistributionProfile {
    distribution: Distribution::RhelClone,
    ids: &["rocky", "almalinux"],
    marker: Some("/etc/redhat-release"),
    repository: RepositoryConfig { paths: &["/etc/yum.repos.d"], managed: None, replaces: None },
    channels: &[UpgradeChannel {
        name: "next",
        resolution: Resolution::Mirror {
            url: "https://repo.almalinux.org/almalinux/",
            pattern: r#"href="(\d+\.\d+)/""#,
            filter: VersionFilter::NextMajor,
        },
    }],
};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to read /etc/os-release")]
    OsRelease(#[source] io::Error),
    #[error("unsupported distribution: {}", _0)]
    Unsupported(String),
}

/// What detection learned about the running system.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedSystem {
    pub distribution: Distribution,
    /// The os-release `ID`, which tells RHEL clones apart.
    pub id: String,
    pub name: String,
    /// `None` on rolling distributions, which carry no `VERSION_ID`.
    pub version: Option<ReleaseVersion>,
}

pub fn detect(config: &Config) -> Result<DetectedSystem, DetectError> {
    let os_release = config.path("/etc/os-release");
    if os_release.exists() {
        let release = OsRelease::new_from(&os_release).map_err(DetectError::OsRelease)?;
        return from_os_release(&release.id, &release.pretty_name, &release.version_id);
    }

    // Profiles are ordered so that more specific markers are probed first.
    let markers = Distribution::ALL.iter().filter_map(|&d| d.profile().marker.map(|m| (m, d)));
    for (marker, distribution) in markers {
        let path = config.path(marker);
        if !path.exists() {
            continue;
        }

        info!("os-release is missing; identified {} by {}", distribution, marker);
        let version = match distribution {
            Distribution::Alpine | Distribution::Debian => fs::read_to_string(&path)
                .ok()
                .and_then(|contents| contents.trim().parse::<ReleaseVersion>().ok()),
            _ => None,
        };

        return Ok(DetectedSystem {
            distribution,
            id: distribution.to_string(),
            name: distribution.to_string(),
            version,
        });
    }

    Err(DetectError::Unsupported("no os-release or known release marker".into()))
}

fn from_os_release(id: &str, name: &str, version_id: &str) -> Result<DetectedSystem, DetectError> {
    let distribution = Distribution::ALL
        .iter()
        .cloned()
        .find(|d| d.profile().ids.contains(&id))
        .ok_or_else(|| DetectError::Unsupported(id.to_owned()))?;

    Ok(DetectedSystem {
        distribution,
        id: id.to_owned(),
        name: if name.is_empty() { id.to_owned() } else { name.to_owned() },
        version: version_id.parse::<ReleaseVersion>().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn root_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        for (path, contents) in files {
            let path = config.path(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        (dir, config)
    }

    #[test_case("ID=kali\nID_LIKE=debian\nVERSION_ID=\"2024.4\"\n" => Distribution::Kali ; "kali before its debian base")]
    #[test_case("ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"24.04\"\n" => Distribution::Ubuntu ; "ubuntu")]
    #[test_case("ID=\"opensuse-leap\"\nVERSION_ID=\"15.5\"\n" => Distribution::OpenSuse ; "opensuse leap")]
    #[test_case("ID=\"rocky\"\nVERSION_ID=\"8.10\"\n" => Distribution::RhelClone ; "rocky")]
    #[test_case("ID=almalinux\nVERSION_ID=\"9.4\"\n" => Distribution::RhelClone ; "alma")]
    #[test_case("ID=arch\nBUILD_ID=rolling\n" => Distribution::Arch ; "arch")]
    fn detects(os_release: &str) -> Distribution {
        let (_dir, config) = root_with(&[("/etc/os-release", os_release)]);
        detect(&config).unwrap().distribution
    }

    #[test]
    fn version_from_os_release() {
        let (_dir, config) =
            root_with(&[("/etc/os-release", "ID=alpine\nVERSION_ID=3.19.1\nPRETTY_NAME=\"Alpine Linux v3.19\"\n")]);
        let detected = detect(&config).unwrap();
        assert_eq!(detected.version, Some("3.19.1".parse().unwrap()));
        assert_eq!(detected.name, "Alpine Linux v3.19");
    }

    #[test]
    fn rolling_has_no_version() {
        let (_dir, config) = root_with(&[("/etc/os-release", "ID=arch\n")]);
        assert_eq!(detect(&config).unwrap().version, None);
    }

    #[test]
    fn marker_fallback() {
        let (_dir, config) = root_with(&[("/etc/alpine-release", "3.18.4\n")]);
        let detected = detect(&config).unwrap();
        assert_eq!(detected.distribution, Distribution::Alpine);
        assert_eq!(detected.version, Some("3.18.4".parse().unwrap()));
    }

    #[test]
    fn unsupported() {
        let (_dir, config) = root_with(&[("/etc/os-release", "ID=gentoo\n")]);
        assert!(matches!(detect(&config), Err(DetectError::Unsupported(id)) if id == "gentoo"));

        let (_dir, config) = root_with(&[]);
        assert!(matches!(detect(&config), Err(DetectError::Unsupported(_))));
    }

    #[test]
    fn every_profile_matches_its_distribution() {
        for distribution in Distribution::ALL.iter() {
            let profile = distribution.profile();
            assert_eq!(profile.distribution, *distribution);
            assert!(!profile.channels.is_empty());
            let name: &str = (*distribution).into();
            assert_eq!(name.parse::<Distribution>().unwrap(), *distribution);
        }
    }

    #[test]
    fn channel_lookup() {
        let debian = Distribution::Debian.profile();
        assert_eq!(debian.channel_names(), vec!["stable", "testing", "sid"]);
        assert!(debian.channel("sid").unwrap().is_rolling());
        assert!(debian.channel("bullseye").is_none());
        assert!(!Distribution::Alpine.profile().channel("stable").unwrap().is_rolling());
    }
}
