use fern::{Dispatch, InitError};
use log::{Level, LevelFilter, Record};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use yansi::Color;

/// Log target carrying the raw output of external commands.
///
/// Records on this target only reach the log file; the terminal already
/// received the same lines when the command printed them.
pub const OUTPUT_TARGET: &str = "distro_upgrade::output";

/// Name of the per-invocation log file for a distribution.
pub fn log_file_name(distribution: &str, timestamp: &str) -> String {
    fomat!("distro-upgrade-" (distribution) "-" (timestamp) ".log")
}

/// Logs to stderr, and to `log_file` when one is provided.
pub fn setup_logging(filter: LevelFilter, log_file: Option<&Path>) -> Result<(), InitError> {
    let format_level = |record: &Record| match record.level() {
        Level::Trace => Color::Cyan.style().bold().paint(record.level()),
        Level::Debug => Color::Blue.style().bold().paint(record.level()),
        Level::Error => Color::Red.style().bold().paint(record.level()),
        Level::Warn => Color::Yellow.style().bold().paint(record.level()),
        Level::Info => Color::Green.style().bold().paint(record.level()),
    };

    let terminal = Dispatch::new()
        .filter(|metadata| metadata.target() != OUTPUT_TARGET)
        .format(move |out, message, record| {
            out.finish(format_args!(" {} {}", format_level(record), message))
        })
        .chain(io::stderr());

    let mut dispatch = Dispatch::new()
        // Exclude logs for crates that we use
        .level(LevelFilter::Off)
        // Include only the logs for this crate
        .level_for("distro_upgrade", filter)
        .level_for(OUTPUT_TARGET, LevelFilter::Info)
        .chain(terminal);

    if let Some(path) = log_file {
        let file = Dispatch::new()
            .format(|out, message, record| {
                let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                if record.target() == OUTPUT_TARGET {
                    out.finish(format_args!("{} | {}", stamp, message))
                } else {
                    out.finish(format_args!("{} [{:5}] {}", stamp, record.level(), message))
                }
            })
            .chain(fern::log_file(path)?);

        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

/// Creates the log directory and returns the path of this run's log file.
pub fn prepare_log_file(dir: &Path, distribution: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    Ok(dir.join(log_file_name(distribution, &timestamp)))
}

#[cfg(test)]
mod tests {
    #[test]
    fn log_file_name() {
        assert_eq!(
            super::log_file_name("alpine", "20261019-101500"),
            "distro-upgrade-alpine-20261019-101500.log"
        );
    }

    #[test]
    fn prepare_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("var/log/distro-upgrade");
        let path = super::prepare_log_file(&logs, "kali").unwrap();

        assert!(logs.is_dir());
        assert!(path.starts_with(&logs));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("distro-upgrade-kali-"));
    }
}
