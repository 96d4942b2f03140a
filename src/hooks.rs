//! User and system scripts run before and after the upgrade.

use crate::{
    config::Phase,
    distribution::Distribution,
    executor::{CommandRunner, Invocation},
    misc, status,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, PartialEq)]
pub struct HookExecution {
    pub path: PathBuf,
    pub phase: Phase,
    /// `None` when the hook could not be started or was killed by a signal.
    pub exit_code: Option<i32>,
}

impl HookExecution {
    pub fn succeeded(&self) -> bool { self.exit_code == Some(0) }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HookSummary {
    pub count: usize,
    pub failed: usize,
}

/// Executable regular files directly within `dir`, sorted by name.
pub fn discover(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(ref why) if why.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(why) => return Err(why),
    };

    let mut hooks = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if misc::is_executable(&path) {
            hooks.push(path);
        }
    }

    hooks.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(hooks)
}

/// Runs every hook of `phase` found in `dirs`. Failures are counted and logged,
/// but never stop the phase.
pub fn run_phase(
    dirs: &[PathBuf],
    phase: Phase,
    distribution: Distribution,
    runner: &mut dyn CommandRunner,
) -> (HookSummary, Vec<HookExecution>) {
    let phase_name = <&'static str>::from(phase);
    let mut executions = Vec::new();

    'dirs: for dir in dirs {
        let hooks = match discover(dir) {
            Ok(hooks) => hooks,
            Err(why) => {
                warn!("unable to read hook directory {}: {}", dir.display(), why);
                continue;
            }
        };

        for hook in hooks {
            if let Some(signal) = runner.interrupted() {
                warn!("stopping {} hooks: received {} signal", phase_name, signal);
                break 'dirs;
            }

            let invocation = Invocation::new(hook.to_string_lossy())
                .env("DISTRO_UPGRADE_PHASE", phase_name)
                .env("DISTRO_UPGRADE_DISTRIBUTION", <&'static str>::from(distribution));

            let exit_code = match runner.run(&invocation) {
                Ok(()) => Some(0),
                Err(why) => {
                    warn!("{} hook {} failed: {}", phase_name, hook.display(), why);
                    status::exit_code(&why)
                }
            };

            executions.push(HookExecution { path: hook, phase, exit_code });
        }
    }

    let summary = HookSummary {
        count: executions.len(),
        failed: executions.iter().filter(|e| !e.succeeded()).count(),
    };

    if summary.failed != 0 {
        warn!("{} of {} {} hooks failed", summary.failed, summary.count, phase_name);
    } else if summary.count != 0 {
        info!("ran {} {} hooks", summary.count, phase_name);
    }

    (summary, executions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::{DryRunner, SystemRunner},
        signal_handler::Signal,
        testing::Recorder,
    };
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) {
        let path = dir.join(name);
        fs::write(&path, ["#!/bin/sh\n", body, "\n"].concat()).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn hook_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "10-first", "exit 0", 0o755);
        script(dir.path(), "20-broken", "exit 3", 0o755);
        script(dir.path(), "30-last", "test \"$DISTRO_UPGRADE_PHASE\" = pre", 0o755);
        script(dir.path(), "README", "not a hook", 0o644);
        fs::create_dir(dir.path().join("nested.d")).unwrap();
        script(&dir.path().join("nested.d"), "40-nested", "exit 0", 0o755);
        dir
    }

    #[test]
    fn discovers_executables_in_order() {
        let dir = hook_dir();
        let names: Vec<_> = discover(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["10-first", "20-broken", "30-last"]);
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let dir = hook_dir();
        let (summary, executions) = run_phase(
            &[dir.path().to_path_buf()],
            Phase::Pre,
            Distribution::Alpine,
            &mut SystemRunner,
        );

        assert_eq!(summary, HookSummary { count: 3, failed: 1 });
        assert_eq!(executions[1].exit_code, Some(3));
        assert!(executions[2].succeeded());
    }

    #[test]
    fn missing_directories_have_no_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, executions) = run_phase(
            &[dir.path().join("pre.d"), dir.path().join("also-missing")],
            Phase::Post,
            Distribution::Arch,
            &mut SystemRunner,
        );

        assert_eq!(summary, HookSummary::default());
        assert!(executions.is_empty());
    }

    #[test]
    fn dry_run_renders_hooks() {
        let dir = hook_dir();
        let mut runner = DryRunner::default();
        let (summary, _) =
            run_phase(&[dir.path().to_path_buf()], Phase::Post, Distribution::Kali, &mut runner);

        assert_eq!(summary, HookSummary { count: 3, failed: 0 });
        assert_eq!(runner.rendered.len(), 3);
        assert!(runner.rendered[0].env.contains(&("DISTRO_UPGRADE_PHASE".into(), "post".into())));
    }

    #[test]
    fn signal_stops_the_phase() {
        let dir = hook_dir();
        let mut runner = Recorder::default();
        runner.interrupt_after(1, Signal::Hangup);
        let (summary, executions) =
            run_phase(&[dir.path().to_path_buf()], Phase::Pre, Distribution::Alpine, &mut runner);

        assert_eq!(summary, HookSummary { count: 1, failed: 0 });
        assert!(executions[0].path.ends_with("10-first"));
        assert_eq!(runner.invocations.len(), 1);
    }
}
