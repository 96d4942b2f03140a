//! The context object handed to every component of an upgrade run.

use envfile::EnvFile;
use std::{
    env, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use users::os::unix::UserExt;

pub const CONFIG_FILE: &str = "/etc/distro-upgrade/distro-upgrade.conf";
pub const LOCK_FILE: &str = "/run/distro-upgrade.lock";
pub const SNAPSHOT_STATE: &str = "/run/distro-upgrade/snapshot.json";
pub const SYSTEM_HOOKS: &str = "/etc/distro-upgrade/hooks";
pub const USER_HOOKS: &str = ".config/distro-upgrade/hooks";

const GIB: u64 = 1024 * 1024 * 1024;

const DEFAULT_ENDPOINTS: &[&str] = &["1.1.1.1:53", "8.8.8.8:53", "9.9.9.9:53"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {}", _0.display())]
    Read(PathBuf, #[source] io::Error),
    #[error("invalid value for {}: {:?}", key, value)]
    Invalid { key: &'static str, value: String },
}

/// Phase of the upgrade in which a hook directory is consumed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn dir_name(self) -> &'static str {
        match self {
            Phase::Pre => "pre.d",
            Phase::Post => "post.d",
        }
    }
}

impl From<Phase> for &'static str {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Prefix applied to every system path. `/` outside of tests.
    pub root: PathBuf,
    pub dry_run: bool,
    pub skip_checks: bool,
    pub check_disk: bool,
    pub check_network: bool,
    pub check_battery: bool,
    /// Minimum free bytes on the root filesystem.
    pub min_free_space: u64,
    pub min_battery: u8,
    pub endpoints: Vec<SocketAddr>,
    pub probe_timeout: Duration,
    pub log_dir: PathBuf,
    pub snapshots: bool,
    pub snapshot_state: PathBuf,
    pub lock_file: PathBuf,
    /// Hook directory roots, each containing `pre.d` and `post.d`.
    pub hook_roots: Vec<PathBuf>,
}

impl Config {
    /// Defaults for a system mounted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let endpoints = DEFAULT_ENDPOINTS.iter().filter_map(|e| e.parse().ok()).collect();

        let mut config = Config {
            dry_run: false,
            skip_checks: false,
            check_disk: true,
            check_network: true,
            check_battery: true,
            min_free_space: 5 * GIB,
            min_battery: 50,
            endpoints,
            probe_timeout: Duration::from_secs(3),
            log_dir: PathBuf::from("/var/log/distro-upgrade"),
            snapshots: true,
            snapshot_state: PathBuf::new(),
            lock_file: PathBuf::new(),
            hook_roots: Vec::new(),
            root,
        };

        config.snapshot_state = config.path(SNAPSHOT_STATE);
        config.lock_file = config.path(LOCK_FILE);
        config.log_dir = config.path("/var/log/distro-upgrade");
        config.hook_roots.push(config.path(SYSTEM_HOOKS));
        config
    }

    /// Loads the system configuration, applying overrides from `file` when it exists.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new("/");

        if let Some(home) = invoking_user_home() {
            config.hook_roots.push(home.join(USER_HOOKS));
        }

        let file = file.unwrap_or_else(|| Path::new(CONFIG_FILE));
        if file.exists() {
            let env = EnvFile::new(file).map_err(|why| ConfigError::Read(file.to_path_buf(), why))?;
            config.apply(|key| env.get(key).map(String::from))?;
        }

        Ok(config)
    }

    /// Resolves an absolute system path beneath the configured root.
    pub fn path<P: AsRef<Path>>(&self, absolute: P) -> PathBuf {
        let absolute = absolute.as_ref();
        self.root.join(absolute.strip_prefix("/").unwrap_or(absolute))
    }

    pub fn hook_dirs(&self, phase: Phase) -> Vec<PathBuf> {
        self.hook_roots.iter().map(|root| root.join(phase.dir_name())).collect()
    }

    fn apply(&mut self, get: impl Fn(&'static str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = get("MIN_FREE_SPACE_GIB") {
            self.min_free_space = parse::<u64>("MIN_FREE_SPACE_GIB", &value)? * GIB;
        }

        if let Some(value) = get("MIN_BATTERY_PERCENT") {
            let percent = parse::<u8>("MIN_BATTERY_PERCENT", &value)?;
            if percent > 100 {
                return Err(ConfigError::Invalid { key: "MIN_BATTERY_PERCENT", value });
            }
            self.min_battery = percent;
        }

        if let Some(value) = get("NETWORK_ENDPOINTS") {
            self.endpoints = value
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(|e| parse::<SocketAddr>("NETWORK_ENDPOINTS", e))
                .collect::<Result<_, _>>()?;
        }

        if let Some(value) = get("PROBE_TIMEOUT_SECS") {
            self.probe_timeout = Duration::from_secs(parse("PROBE_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = get("LOG_DIR") {
            self.log_dir = PathBuf::from(value);
        }

        if let Some(value) = get("SNAPSHOTS") {
            self.snapshots = parse_bool("SNAPSHOTS", &value)?;
        }

        for (key, field) in [
            ("CHECK_DISK", &mut self.check_disk),
            ("CHECK_NETWORK", &mut self.check_network),
            ("CHECK_BATTERY", &mut self.check_battery),
        ] {
            if let Some(value) = get(key) {
                *field = parse_bool(key, &value)?;
            }
        }

        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: value.to_owned() })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: value.to_owned() }),
    }
}

/// Home of the user who invoked the tool through sudo, or of the current user.
fn invoking_user_home() -> Option<PathBuf> {
    if let Ok(name) = env::var("SUDO_USER") {
        if let Some(user) = users::get_user_by_name(&name) {
            return Some(user.home_dir().to_path_buf());
        }
    }

    env::var_os("HOME").map(PathBuf::from)
}
