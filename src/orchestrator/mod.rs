//! The upgrade state machine.
//!
//! ```text
//! Init → Detecting → PreflightChecking → SnapshotPrompting → BackingUp → RunningPreHooks
//!      → Rewriting → Refreshing → Upgrading → CleaningUp → RunningPostHooks → Completed
//! ```
//!
//! Any failure of a mutating step after `BackingUp` passes through `RollingBack`,
//! which restores the backed up configuration and resynchronizes the package
//! indices, before ending in `Aborted`. Rollback is configuration-only: packages
//! that were already upgraded stay upgraded.

mod errors;

pub use self::errors::{ExecutionFailure, RollbackError, UpgradeError, UpgradeResult};

use crate::{
    backup::{self, BackupSet},
    config::{Config, Phase},
    distribution::{self, DetectedSystem, Distribution, UpgradeChannel},
    executor::{self, CommandRunner, Executor, PackageManager, Step},
    hooks::{self, HookSummary},
    misc,
    plan::UpgradePlan,
    preflight::{self, SystemProbe, Verdict},
    prompt::ConfirmationPort,
    repos,
    resolver::{self, MirrorFetch},
    snapshot::{self, SnapshotHandle},
};
use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Init,
    Detecting,
    PreflightChecking,
    SnapshotPrompting,
    BackingUp,
    RunningPreHooks,
    Rewriting,
    Refreshing,
    Upgrading,
    CleaningUp,
    RunningPostHooks,
    Completed,
    RollingBack,
    Aborted,
}

impl From<State> for &'static str {
    fn from(state: State) -> Self {
        match state {
            State::Init => "init",
            State::Detecting => "detecting",
            State::PreflightChecking => "preflight checking",
            State::SnapshotPrompting => "snapshot prompting",
            State::BackingUp => "backing up",
            State::RunningPreHooks => "running pre hooks",
            State::Rewriting => "rewriting",
            State::Refreshing => "refreshing",
            State::Upgrading => "upgrading",
            State::CleaningUp => "cleaning up",
            State::RunningPostHooks => "running post hooks",
            State::Completed => "completed",
            State::RollingBack => "rolling back",
            State::Aborted => "aborted",
        }
    }
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(<&'static str>::from(*self)) }
}

impl From<Step> for State {
    fn from(step: Step) -> Self {
        match step {
            Step::Refresh => State::Refreshing,
            Step::Upgrade => State::Upgrading,
            Step::Cleanup => State::CleaningUp,
        }
    }
}

/// What the user asked for on the command line.
#[derive(Clone, Debug)]
pub struct UpgradeRequest {
    pub distribution: Distribution,
    /// `None` asks the user to pick a channel.
    pub channel: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Upgraded,
    AlreadyCurrent,
    DryRun,
}

#[derive(Debug)]
pub struct Report {
    pub plan: UpgradePlan,
    pub outcome: Outcome,
    pub snapshot: Option<SnapshotHandle>,
    pub pre_hooks: HookSummary,
    pub post_hooks: HookSummary,
    /// `.pacnew` and `.pacsave` files that need a manual merge.
    pub unmerged: Vec<PathBuf>,
}

impl Report {
    fn new(plan: UpgradePlan, outcome: Outcome) -> Self {
        Report {
            plan,
            outcome,
            snapshot: None,
            pre_hooks: HookSummary::default(),
            post_hooks: HookSummary::default(),
            unmerged: Vec::new(),
        }
    }
}

pub struct Orchestrator<'a> {
    config: &'a Config,
    probe: &'a dyn SystemProbe,
    fetch: &'a dyn MirrorFetch,
    prompt: &'a mut dyn ConfirmationPort,
    runner: &'a mut dyn CommandRunner,
    history: Vec<State>,
}

fn transition(history: &mut Vec<State>, state: State) {
    debug!("state: {}", state);
    history.push(state);
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        probe: &'a dyn SystemProbe,
        fetch: &'a dyn MirrorFetch,
        prompt: &'a mut dyn ConfirmationPort,
        runner: &'a mut dyn CommandRunner,
    ) -> Self {
        Orchestrator { config, probe, fetch, prompt, runner, history: Vec::new() }
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[State] { &self.history }

    pub fn state(&self) -> State { self.history.last().cloned().unwrap_or(State::Init) }

    fn enter(&mut self, state: State) { transition(&mut self.history, state) }

    /// Enters `state` unless a termination signal has arrived. Only used before
    /// anything is changed, so stopping needs no rollback.
    fn advance(&mut self, state: State) -> UpgradeResult<()> {
        self.check_signal()?;
        self.enter(state);
        Ok(())
    }

    fn check_signal(&self) -> UpgradeResult<()> {
        match self.runner.interrupted() {
            Some(signal) => Err(UpgradeError::Interrupted(signal)),
            None => Ok(()),
        }
    }

    pub fn run(&mut self, request: &UpgradeRequest) -> UpgradeResult<Report> {
        self.enter(State::Init);
        let result = self.upgrade(request);
        if result.is_err() {
            self.enter(State::Aborted);
        }

        result
    }

    fn upgrade(&mut self, request: &UpgradeRequest) -> UpgradeResult<Report> {
        let config = self.config;
        let profile = request.distribution.profile();

        self.enter(State::Detecting);
        let requested = match request.channel {
            Some(ref name) => Some(profile.channel(name).ok_or_else(|| {
                UpgradeError::UnknownChannel {
                    distribution: request.distribution,
                    channel: name.clone(),
                    available: profile.channel_names().join(", "),
                }
            })?),
            None => None,
        };

        let system = self.detect(request.distribution)?;
        let channel = match requested {
            Some(channel) => channel,
            None => self.choose_channel(request.distribution)?,
        };

        self.advance(State::PreflightChecking)?;
        self.preflight()?;
        self.check_signal()?;

        let target = resolver::resolve_target(
            system.distribution,
            channel,
            system.version.as_ref(),
            self.fetch,
        )?;

        let plan =
            UpgradePlan::new(system.distribution, channel, system.version, target, config.dry_run);

        if plan.is_satisfied() {
            info!("{} is already at {}; nothing to do", system.name, plan.target());
            self.enter(State::Completed);
            return Ok(Report::new(plan, Outcome::AlreadyCurrent));
        }

        self.check_signal()?;
        info!("upgrade plan: {}", plan);
        if !config.dry_run && !self.prompt.confirm(&fomat!("Upgrade " (plan) "?"), false) {
            return Err(UpgradeError::Cancelled("the upgrade plan was declined"));
        }

        let outcome = if config.dry_run { Outcome::DryRun } else { Outcome::Upgraded };
        let mut report = Report::new(plan, outcome);
        let timestamp = misc::timestamp();

        self.advance(State::SnapshotPrompting)?;
        report.snapshot = self.snapshot(&timestamp);

        self.advance(State::BackingUp)?;
        let paths: Vec<PathBuf> = profile.repository.paths.iter().map(|p| config.path(p)).collect();
        let backups = if config.dry_run {
            for path in &paths {
                info!("would back up {}", path.display());
            }
            None
        } else {
            Some(backup::backup_all(&paths, &timestamp).map_err(UpgradeError::Backup)?)
        };

        self.enter(State::RunningPreHooks);
        report.pre_hooks = self.hooks(Phase::Pre, system.distribution);

        let manager = executor::adapter(system.distribution, &system.id);
        if let Err(cause) = self.apply(&report.plan, &*manager, backups.as_ref()) {
            return Err(match backups {
                Some(ref backups) => self.roll_back(backups, &*manager, cause),
                None => UpgradeError::DryRun(cause),
            });
        }

        self.enter(State::RunningPostHooks);
        report.post_hooks = self.hooks(Phase::Post, system.distribution);

        if system.distribution == Distribution::Arch {
            report.unmerged = unmerged_files(&config.path("/etc"));
            for path in &report.unmerged {
                warn!("needs a manual merge: {}", path.display());
            }
        }

        self.enter(State::Completed);
        if !config.dry_run {
            self.offer_reboot(&*manager);
        }

        Ok(report)
    }

    fn detect(&mut self, expected: Distribution) -> UpgradeResult<DetectedSystem> {
        let system = distribution::detect(self.config)?;
        info!(
            "detected {} {}",
            system.name,
            system.version.as_ref().map_or_else(|| "(rolling)".to_owned(), ToString::to_string)
        );

        if system.distribution != expected {
            return Err(UpgradeError::WrongDistribution { expected, detected: system.distribution });
        }

        if !self.probe.is_root() {
            if !self.config.dry_run {
                return Err(UpgradeError::NotRoot);
            }

            warn!("not running as root; continuing because this is a dry run");
        }

        Ok(system)
    }

    fn choose_channel(
        &mut self,
        distribution: Distribution,
    ) -> UpgradeResult<&'static UpgradeChannel> {
        let profile = distribution.profile();
        let names = profile.channel_names();
        let prompt = fomat!("Select an upgrade channel for " (distribution) ":");

        self.prompt
            .choose(&prompt, &names)
            .map(|index| &profile.channels[index])
            .ok_or(UpgradeError::Cancelled("no upgrade channel was selected"))
    }

    fn preflight(&mut self) -> UpgradeResult<()> {
        if self.config.skip_checks {
            warn!("skipping preflight checks");
            return Ok(());
        }

        let results = preflight::run_checks(self.config, self.probe);
        for result in &results {
            debug!("preflight {:?}: {}", result.status, result);
        }

        match preflight::verdict(&results) {
            Verdict::Proceed => Ok(()),
            Verdict::Abort(failures) => Err(UpgradeError::Preflight(failures)),
            Verdict::Confirm(warnings) => {
                for warning in &warnings {
                    warn!("{}", warning);
                }

                if self.config.dry_run {
                    return Ok(());
                }

                if self.prompt.confirm("Continue anyway?", false) {
                    Ok(())
                } else {
                    Err(UpgradeError::Cancelled("preflight warnings were not accepted"))
                }
            }
        }
    }

    /// Snapshot failures are never fatal.
    fn snapshot(&mut self, timestamp: &str) -> Option<SnapshotHandle> {
        if !self.config.snapshots {
            return None;
        }

        let tool = match snapshot::detect(self.config) {
            Some(tool) => tool,
            None => {
                warn!("no snapshot tool is available; continuing without a snapshot");
                return None;
            }
        };

        let kind = tool.kind();
        if !self.config.dry_run
            && !self.prompt.confirm(&fomat!("Create a " (kind) " snapshot before upgrading?"), true)
        {
            info!("continuing without a snapshot");
            return None;
        }

        let handle = match snapshot::create(&tool, &snapshot::label(timestamp), &mut *self.runner) {
            Ok(handle) => handle,
            Err(why) => {
                warn!("{}", misc::format_error(&why));
                return None;
            }
        };

        if !self.config.dry_run {
            if let Err(why) = snapshot::persist(&handle, &self.config.snapshot_state) {
                warn!("{}", misc::format_error(&why));
            }
        }

        if !self.config.dry_run {
            info!("created {} snapshot {}", kind, handle.identifier);
        }

        Some(handle)
    }

    fn hooks(&mut self, phase: Phase, distribution: Distribution) -> HookSummary {
        if let Some(signal) = self.runner.interrupted() {
            warn!("skipping {} hooks: received {} signal", <&'static str>::from(phase), signal);
            return HookSummary::default();
        }

        let dirs = self.config.hook_dirs(phase);
        let (summary, _) = hooks::run_phase(&dirs, phase, distribution, &mut *self.runner);
        summary
    }

    /// Rewriting through cleanup: everything that rollback has to undo.
    fn apply(
        &mut self,
        plan: &UpgradePlan,
        manager: &dyn PackageManager,
        backups: Option<&BackupSet>,
    ) -> Result<(), ExecutionFailure> {
        self.enter(State::Rewriting);
        self.rewrite(plan, backups)?;

        let history = &mut self.history;
        let runner = &mut *self.runner;
        Executor::new(manager, runner)
            .execute(plan, |step| transition(history, step.into()))
            .map_err(ExecutionFailure::Command)
    }

    fn rewrite(
        &mut self,
        plan: &UpgradePlan,
        backups: Option<&BackupSet>,
    ) -> Result<(), ExecutionFailure> {
        let profile = plan.distribution().profile();
        let content = match repos::render(plan.distribution(), plan.channel(), plan.target()) {
            Some(content) => content,
            None => {
                info!("{} derives its repositories from the target release", plan.distribution());
                return Ok(());
            }
        };

        if let Some(signal) = self.runner.interrupted() {
            return Err(ExecutionFailure::Interrupted(signal));
        }

        match backups {
            Some(backups) => {
                repos::write(self.config, profile, &content, backups)?;
            }
            None => {
                let path = profile.repository.managed.map(|p| self.config.path(p));
                println!(
                    "would write {}:\n{}",
                    path.as_ref().map_or_else(String::new, |p| p.display().to_string()),
                    content
                );
            }
        }

        Ok(())
    }

    fn roll_back(
        &mut self,
        backups: &BackupSet,
        manager: &dyn PackageManager,
        cause: ExecutionFailure,
    ) -> UpgradeError {
        error!("{}", misc::format_error(&cause));
        self.enter(State::RollingBack);

        if let Err(why) = backup::restore_all(backups) {
            return UpgradeError::Rollback { cause, why: why.into() };
        }

        if let Err(why) = Executor::new(manager, &mut *self.runner).resync() {
            return UpgradeError::Rollback { cause, why: why.into() };
        }

        for record in &backups.records {
            info!("restored {}", record.original.display());
        }
        warn!("packages that were already upgraded remain upgraded");
        UpgradeError::Execution(cause)
    }

    fn offer_reboot(&mut self, manager: &dyn PackageManager) {
        let reboot = manager.reboot();
        if self.prompt.confirm("Reboot now to finish the upgrade?", false) {
            if let Err(why) = self.runner.run(&reboot) {
                error!("failed to reboot: {}", why);
            }
        } else {
            info!("reboot later with `{}`", reboot);
        }
    }
}

/// Configuration files left beside their packaged versions by pacman.
pub fn unmerged_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return found,
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => found.extend(unmerged_files(&path)),
            Ok(kind) if kind.is_file() => {
                if path.extension().map_or(false, |ext| ext == "pacnew" || ext == "pacsave") {
                    found.push(path);
                }
            }
            _ => (),
        }
    }

    found.sort();
    found
}
