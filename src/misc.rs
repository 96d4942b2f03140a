use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Directories searched for system tools. `PATH` is not consulted, since it
/// is often reset by sudo.
const SYSTEM_PATH: &[&str] =
    &["/usr/local/sbin", "/usr/local/bin", "/usr/sbin", "/usr/bin", "/sbin", "/bin"];

pub fn http_client() -> Result<isahc::HttpClient, isahc::Error> {
    use isahc::config::{Configurable, RedirectPolicy};

    isahc::HttpClient::builder()
        .timeout(Duration::from_secs(30))
        .low_speed_timeout(1, Duration::from_secs(10))
        .redirect_policy(RedirectPolicy::Follow)
        .build()
}

pub fn format_error(source: &(dyn std::error::Error + 'static)) -> String {
    let mut out = fomat!((source));

    let mut source = source.source();
    while let Some(why) = source {
        out.push_str(&fomat!(": "(why)));
        source = why.source();
    }

    out
}

/// Local timestamp used to name backups and snapshots.
pub fn timestamp() -> String { chrono::Local::now().format("%Y%m%d-%H%M%S").to_string() }

/// Searches the system directories within `root` for an executable named `program`.
pub fn which(root: &Path, program: &str) -> Option<PathBuf> {
    SYSTEM_PATH
        .iter()
        .map(|dir| root.join(&dir[1..]).join(program))
        .find(|candidate| is_executable(candidate))
}

/// A regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata().map_or(false, |meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}
