use super::runner::Invocation;
use crate::{
    distribution::Distribution,
    plan::{Target, UpgradePlan},
};

/// The package manager commands that carry out each step of an upgrade.
pub trait PackageManager {
    fn refresh(&self, plan: &UpgradePlan) -> Vec<Invocation>;

    fn upgrade(&self, plan: &UpgradePlan) -> Vec<Invocation>;

    fn cleanup(&self, plan: &UpgradePlan) -> Vec<Invocation>;

    /// Refreshes indices against whatever configuration is currently on disk.
    fn resync(&self) -> Vec<Invocation>;

    fn reboot(&self) -> Invocation { Invocation::new("systemctl").arg("reboot") }
}

/// Selects the adapter for a distribution. `id` is the os-release `ID`.
pub fn adapter(distribution: Distribution, id: &str) -> Box<dyn PackageManager> {
    match distribution {
        Distribution::Ubuntu => Box::new(Ubuntu),
        Distribution::Debian | Distribution::Kali => Box::new(Apt),
        Distribution::Fedora => Box::new(Dnf),
        Distribution::Arch => Box::new(Pacman),
        Distribution::Alpine => Box::new(Apk),
        Distribution::OpenSuse => Box::new(Zypper),
        Distribution::RhelClone => Box::new(Leapp::new(id)),
    }
}

fn apt_get() -> Invocation {
    Invocation::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .args(&["-y", "-o", "Dpkg::Options::=--force-confdef", "-o", "Dpkg::Options::=--force-confold"])
}

/// Debian and Kali: the rewritten sources list is the whole upgrade.
pub struct Apt;

impl PackageManager for Apt {
    fn refresh(&self, _plan: &UpgradePlan) -> Vec<Invocation> { self.resync() }

    fn upgrade(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![
            apt_get().args(&["upgrade", "--without-new-pkgs"]),
            apt_get().arg("full-upgrade"),
        ]
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![apt_get().args(&["autoremove", "--purge"]), apt_get().arg("clean").tolerant()]
    }

    fn resync(&self) -> Vec<Invocation> { vec![apt_get().arg("update")] }
}

/// Ubuntu brings the current release up to date with apt, then hands the
/// release transition to `do-release-upgrade`.
pub struct Ubuntu;

impl PackageManager for Ubuntu {
    fn refresh(&self, plan: &UpgradePlan) -> Vec<Invocation> { Apt.refresh(plan) }

    fn upgrade(&self, plan: &UpgradePlan) -> Vec<Invocation> {
        // The release-upgrades prompt setting decides between LTS and interim releases.
        let mut invocations = Apt.upgrade(plan);
        invocations.push(
            Invocation::new("do-release-upgrade").args(&["-f", "DistUpgradeViewNonInteractive"]),
        );
        invocations
    }

    fn cleanup(&self, plan: &UpgradePlan) -> Vec<Invocation> { Apt.cleanup(plan) }

    fn resync(&self) -> Vec<Invocation> { Apt.resync() }
}

/// Fedora's offline system upgrade.
pub struct Dnf;

impl Dnf {
    fn releasever(plan: &UpgradePlan) -> String {
        match plan.target() {
            Target::Version(version) => version.major().to_string(),
            Target::Rolling(sentinel) => (*sentinel).to_owned(),
        }
    }
}

impl PackageManager for Dnf {
    fn refresh(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![
            Invocation::new("dnf").args(&["makecache", "--refresh"]),
            Invocation::new("dnf").args(&["upgrade", "--refresh", "-y"]),
        ]
    }

    fn upgrade(&self, plan: &UpgradePlan) -> Vec<Invocation> {
        let mut invocations = Vec::new();

        // Releases from 41 onward ship system-upgrade inside dnf5.
        if plan.current().map_or(true, |current| current.major() < 41) {
            invocations.push(
                Invocation::new("dnf").args(&["install", "-y", "dnf-plugin-system-upgrade"]),
            );
        }

        if let Target::Rolling("rawhide") = plan.target() {
            invocations.push(Invocation::new("dnf").args(&["install", "-y", "fedora-repos-rawhide"]));
        }

        invocations.push(Invocation::new("dnf").args(&[
            "system-upgrade".to_owned(),
            "download".to_owned(),
            ["--releasever=", Self::releasever(plan).as_str()].concat(),
            "-y".to_owned(),
        ]));

        invocations
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![
            Invocation::new("dnf").args(&["autoremove", "-y"]),
            Invocation::new("dnf").args(&["clean", "packages"]).tolerant(),
        ]
    }

    fn resync(&self) -> Vec<Invocation> {
        vec![Invocation::new("dnf").args(&["makecache", "--refresh"])]
    }

    fn reboot(&self) -> Invocation { Invocation::new("dnf").args(&["system-upgrade", "reboot"]) }
}

pub struct Pacman;

impl PackageManager for Pacman {
    fn refresh(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![
            Invocation::new("pacman").args(&["-Syy", "--noconfirm"]),
            Invocation::new("pacman")
                .args(&["-S", "--needed", "--noconfirm", "archlinux-keyring"]),
        ]
    }

    fn upgrade(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![Invocation::new("pacman").args(&["-Syu", "--noconfirm"])]
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![Invocation::new("pacman").args(&["-Sc", "--noconfirm"]).tolerant()]
    }

    fn resync(&self) -> Vec<Invocation> {
        vec![Invocation::new("pacman").args(&["-Syy", "--noconfirm"])]
    }
}

pub struct Zypper;

fn zypper() -> Invocation {
    Invocation::new("zypper").args(&["--non-interactive", "--gpg-auto-import-keys"])
}

impl PackageManager for Zypper {
    fn refresh(&self, plan: &UpgradePlan) -> Vec<Invocation> {
        let mut refresh = zypper();
        if let Target::Version(version) = plan.target() {
            refresh = refresh.args(&["--releasever".to_owned(), version.to_string()]);
        }

        vec![refresh.arg("refresh")]
    }

    fn upgrade(&self, plan: &UpgradePlan) -> Vec<Invocation> {
        let mut upgrade = zypper();
        if let Target::Version(version) = plan.target() {
            upgrade = upgrade.args(&["--releasever".to_owned(), version.to_string()]);
        }

        vec![upgrade.args(&["dist-upgrade", "--allow-vendor-change", "--auto-agree-with-licenses"])]
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![zypper().args(&["clean", "--all"]).tolerant()]
    }

    fn resync(&self) -> Vec<Invocation> { vec![zypper().arg("refresh")] }
}

pub struct Apk;

impl PackageManager for Apk {
    fn refresh(&self, _plan: &UpgradePlan) -> Vec<Invocation> { self.resync() }

    fn upgrade(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![Invocation::new("apk").args(&["upgrade", "--available"])]
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        // Fails when no cache directory is configured.
        vec![Invocation::new("apk").args(&["cache", "clean"]).tolerant()]
    }

    fn resync(&self) -> Vec<Invocation> { vec![Invocation::new("apk").arg("update")] }
}

/// In-place major upgrades of RHEL clones through ELevate.
pub struct Leapp {
    /// Suffix of the `leapp-data-*` package describing the target distribution.
    data: &'static str,
}

const ELEVATE_RELEASE: &str = "https://repo.almalinux.org/elevate/elevate-release-latest-el";

impl Leapp {
    pub fn new(id: &str) -> Self {
        let data = match id {
            "rocky" => "rocky",
            _ => "almalinux",
        };

        Leapp { data }
    }
}

impl PackageManager for Leapp {
    fn refresh(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![Invocation::new("dnf").args(&["upgrade", "--refresh", "-y"])]
    }

    fn upgrade(&self, plan: &UpgradePlan) -> Vec<Invocation> {
        let major = plan.current().map_or(0, |current| current.major());

        vec![
            Invocation::new("dnf")
                .args(&["install", "-y"])
                .arg(fomat!((ELEVATE_RELEASE) (major) ".noarch.rpm")),
            Invocation::new("dnf")
                .args(&["install", "-y", "leapp-upgrade"])
                .arg(["leapp-data-", self.data].concat()),
            Invocation::new("leapp").arg("preupgrade"),
            Invocation::new("leapp").arg("upgrade"),
        ]
    }

    fn cleanup(&self, _plan: &UpgradePlan) -> Vec<Invocation> {
        vec![Invocation::new("dnf").args(&["clean", "all"]).tolerant()]
    }

    fn resync(&self) -> Vec<Invocation> {
        vec![Invocation::new("dnf").args(&["makecache", "--refresh"])]
    }
}
