//! Environment checks that gate an upgrade.

use crate::config::Config;
use std::{
    fmt::{self, Display, Formatter},
    fs, io,
    net::{SocketAddr, TcpStream},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Check {
    DiskSpace,
    Network,
    Battery,
}

impl From<Check> for &'static str {
    fn from(check: Check) -> Self {
        match check {
            Check::DiskSpace => "disk space",
            Check::Network => "network",
            Check::Battery => "battery",
        }
    }
}

impl Display for Check {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(<&'static str>::from(*self)) }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    Warn,
    Fail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreflightResult {
    pub check: Check,
    pub status: Status,
    pub message: String,
}

impl PreflightResult {
    fn new(check: Check, status: Status, message: String) -> Self {
        PreflightResult { check, status, message }
    }
}

impl Display for PreflightResult {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { write!(fmt, "{}: {}", self.check, self.message) }
}

/// What the orchestrator does with a set of results.
#[derive(Debug, PartialEq)]
pub enum Verdict {
    Proceed,
    /// Non-blocking warnings that the user must accept.
    Confirm(Vec<PreflightResult>),
    Abort(Vec<PreflightResult>),
}

pub fn verdict(results: &[PreflightResult]) -> Verdict {
    let by_status = |status| -> Vec<PreflightResult> {
        results.iter().filter(|r| r.status == status).cloned().collect()
    };

    let failures = by_status(Status::Fail);
    if !failures.is_empty() {
        return Verdict::Abort(failures);
    }

    let warnings = by_status(Status::Warn);
    if !warnings.is_empty() {
        return Verdict::Confirm(warnings);
    }

    Verdict::Proceed
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerKind {
    Battery,
    Mains,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PowerSupply {
    pub name: String,
    pub kind: PowerKind,
    /// Mains: whether it is plugged in.
    pub online: bool,
    /// Battery: charge percentage.
    pub capacity: Option<u8>,
    /// Battery: the kernel reports it as discharging.
    pub discharging: bool,
}

/// The host facts the checks depend on.
pub trait SystemProbe {
    /// Bytes available to unprivileged users on the filesystem holding `path`.
    fn free_space(&self, path: &Path) -> io::Result<u64>;

    fn reachable(&self, endpoint: &SocketAddr, timeout: Duration) -> bool;

    fn power_supplies(&self) -> io::Result<Vec<PowerSupply>>;

    fn is_root(&self) -> bool;
}

/// Probes the running host.
pub struct HostProbe {
    power_supply: PathBuf,
}

impl HostProbe {
    pub fn new(config: &Config) -> Self {
        HostProbe { power_supply: config.path("/sys/class/power_supply") }
    }
}

impl SystemProbe for HostProbe {
    fn free_space(&self, path: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }

    fn reachable(&self, endpoint: &SocketAddr, timeout: Duration) -> bool {
        match TcpStream::connect_timeout(endpoint, timeout) {
            Ok(_) => true,
            Err(why) => {
                debug!("{} is unreachable: {}", endpoint, why);
                false
            }
        }
    }

    fn power_supplies(&self) -> io::Result<Vec<PowerSupply>> {
        let entries = match fs::read_dir(&self.power_supply) {
            Ok(entries) => entries,
            Err(ref why) if why.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(why) => return Err(why),
        };

        let mut supplies = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let read = |attribute: &str| {
                fs::read_to_string(path.join(attribute)).ok().map(|v| v.trim().to_owned())
            };

            let kind = match read("type").as_deref() {
                Some("Battery") => PowerKind::Battery,
                Some("Mains") => PowerKind::Mains,
                _ => continue,
            };

            supplies.push(PowerSupply {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                online: read("online").as_deref() == Some("1"),
                capacity: read("capacity").and_then(|c| c.parse().ok()),
                discharging: read("status").as_deref() == Some("Discharging"),
            });
        }

        Ok(supplies)
    }

    fn is_root(&self) -> bool { nix::unistd::Uid::effective().is_root() }
}

/// Runs every check that the configuration enables.
pub fn run_checks(config: &Config, probe: &dyn SystemProbe) -> Vec<PreflightResult> {
    let mut results = Vec::new();

    if config.check_disk {
        results.push(disk_space(config, probe));
    }

    if config.check_network {
        results.push(network(config, probe));
    }

    if config.check_battery {
        if let Some(result) = battery(config, probe) {
            results.push(result);
        }
    }

    results
}

fn gib(bytes: u64) -> String { format!("{:.1} GiB", bytes as f64 / (1024 * 1024 * 1024) as f64) }

fn disk_space(config: &Config, probe: &dyn SystemProbe) -> PreflightResult {
    match probe.free_space(&config.root) {
        Ok(free) if free >= config.min_free_space => PreflightResult::new(
            Check::DiskSpace,
            Status::Ok,
            fomat!((gib(free)) " available"),
        ),
        Ok(free) => PreflightResult::new(
            Check::DiskSpace,
            Status::Fail,
            fomat!((gib(free)) " available, but " (gib(config.min_free_space)) " is required"),
        ),
        Err(why) => PreflightResult::new(
            Check::DiskSpace,
            Status::Fail,
            fomat!("unable to determine free space: " (why)),
        ),
    }
}

fn network(config: &Config, probe: &dyn SystemProbe) -> PreflightResult {
    match config.endpoints.iter().find(|e| probe.reachable(e, config.probe_timeout)) {
        Some(endpoint) => {
            PreflightResult::new(Check::Network, Status::Ok, fomat!((endpoint) " is reachable"))
        }
        None => PreflightResult::new(
            Check::Network,
            Status::Fail,
            fomat!("none of " (config.endpoints.len()) " endpoints responded"),
        ),
    }
}

/// `None` when the system has no battery.
fn battery(config: &Config, probe: &dyn SystemProbe) -> Option<PreflightResult> {
    let supplies = match probe.power_supplies() {
        Ok(supplies) => supplies,
        Err(why) => {
            warn!("unable to read power supplies: {}", why);
            return None;
        }
    };

    let battery = supplies.iter().find(|s| s.kind == PowerKind::Battery)?;
    let on_mains = supplies.iter().any(|s| s.kind == PowerKind::Mains && s.online);
    let capacity = battery.capacity.unwrap_or(100);

    let result = if !on_mains && battery.discharging && capacity < config.min_battery {
        PreflightResult::new(
            Check::Battery,
            Status::Warn,
            fomat!(
                (battery.name) " is discharging at " (capacity) "%, below "
                (config.min_battery) "%; connect AC power"
            ),
        )
    } else {
        PreflightResult::new(
            Check::Battery,
            Status::Ok,
            fomat!((battery.name) " at " (capacity) "%" if on_mains { ", on AC power" }),
        )
    };

    Some(result)
}
