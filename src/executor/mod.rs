//! Sequencing of package manager commands for an upgrade plan.

mod adapters;
mod runner;

pub use self::{
    adapters::{adapter, Apk, Apt, Dnf, Leapp, PackageManager, Pacman, Ubuntu, Zypper},
    runner::{CommandRunner, DryRunner, Invocation, SystemRunner},
};

use crate::{plan::UpgradePlan, signal_handler::Signal};
use std::{
    fmt::{self, Display, Formatter},
    io,
};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Refresh,
    Upgrade,
    Cleanup,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Refresh, Step::Upgrade, Step::Cleanup];
}

impl From<Step> for &'static str {
    fn from(step: Step) -> Self {
        match step {
            Step::Refresh => "refreshing package indices",
            Step::Upgrade => "upgrading the distribution",
            Step::Cleanup => "removing orphaned packages and cached downloads",
        }
    }
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(<&'static str>::from(*self)) }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{} failed at `{}`", step, invocation)]
    Command { step: Step, invocation: Invocation, #[source] why: io::Error },
    #[error("received {} signal before {}", _0, _1)]
    Interrupted(Signal, Step),
}

impl ExecError {
    pub fn step(&self) -> Step {
        match *self {
            ExecError::Command { step, .. } | ExecError::Interrupted(_, step) => step,
        }
    }
}

/// Drives a package manager adapter through the runner.
pub struct Executor<'a> {
    manager: &'a dyn PackageManager,
    runner: &'a mut dyn CommandRunner,
}

impl<'a> Executor<'a> {
    pub fn new(manager: &'a dyn PackageManager, runner: &'a mut dyn CommandRunner) -> Self {
        Executor { manager, runner }
    }

    /// Runs refresh, upgrade, and cleanup in order, halting at the first failure.
    /// `on_step` is called as each step begins.
    pub fn execute(
        &mut self,
        plan: &UpgradePlan,
        mut on_step: impl FnMut(Step),
    ) -> Result<(), ExecError> {
        for &step in &Step::ALL {
            on_step(step);
            self.step(plan, step)?;
        }

        Ok(())
    }

    pub fn step(&mut self, plan: &UpgradePlan, step: Step) -> Result<(), ExecError> {
        info!("{}", step);
        let invocations = match step {
            Step::Refresh => self.manager.refresh(plan),
            Step::Upgrade => self.manager.upgrade(plan),
            Step::Cleanup => self.manager.cleanup(plan),
        };

        self.run_all(step, &invocations, true)
    }

    /// Brings the package manager's indices back in line with its configuration.
    ///
    /// Runs even after an interrupt, since it is part of recovering from one.
    pub fn resync(&mut self) -> Result<(), ExecError> {
        info!("resynchronizing package indices");
        let invocations = self.manager.resync();
        self.run_all(Step::Refresh, &invocations, false)
    }

    fn run_all(
        &mut self,
        step: Step,
        invocations: &[Invocation],
        interruptible: bool,
    ) -> Result<(), ExecError> {
        for invocation in invocations {
            if let (true, Some(signal)) = (interruptible, self.runner.interrupted()) {
                return Err(ExecError::Interrupted(signal, step));
            }

            if let Err(why) = self.runner.run(invocation) {
                if invocation.tolerant {
                    warn!("`{}` failed, continuing: {}", invocation, why);
                    continue;
                }

                return Err(ExecError::Command { step, invocation: invocation.clone(), why });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        distribution::Distribution,
        plan::Target,
        signal_handler::Signal,
        testing::Recorder,
    };

    fn alpine_plan() -> UpgradePlan {
        UpgradePlan::new(
            Distribution::Alpine,
            Distribution::Alpine.profile().channel("stable").unwrap(),
            Some("3.19.1".parse().unwrap()),
            Target::Version("3.20".parse().unwrap()),
            false,
        )
    }

    #[test]
    fn runs_steps_in_order() {
        let mut runner = Recorder::default();
        let mut steps = Vec::new();
        Executor::new(&Apk, &mut runner).execute(&alpine_plan(), |step| steps.push(step)).unwrap();

        assert_eq!(steps, Step::ALL.to_vec());
        assert_eq!(
            runner.commands(),
            vec!["apk update", "apk upgrade --available", "apk cache clean"]
        );
    }

    #[test]
    fn halts_on_failure() {
        let mut runner = Recorder::failing("apk upgrade --available");
        let mut steps = Vec::new();
        let result =
            Executor::new(&Apk, &mut runner).execute(&alpine_plan(), |step| steps.push(step));

        let error = result.unwrap_err();
        assert_eq!(error.step(), Step::Upgrade);
        assert_eq!(steps, vec![Step::Refresh, Step::Upgrade]);
        assert_eq!(runner.commands(), vec!["apk update", "apk upgrade --available"]);
    }

    #[test]
    fn tolerant_cleanup() {
        let mut runner = Recorder::failing("apk cache clean");
        assert!(Executor::new(&Apk, &mut runner).execute(&alpine_plan(), |_| ()).is_ok());
    }

    #[test]
    fn dry_run_renders_everything() {
        let mut runner = DryRunner::default();
        Executor::new(&Apk, &mut runner).execute(&alpine_plan(), |_| ()).unwrap();
        assert_eq!(runner.rendered.len(), 3);
    }

    #[test]
    fn signal_halts_between_invocations() {
        let mut runner = Recorder::default();
        runner.interrupt_after(1, Signal::Interrupt);
        let result = Executor::new(&Apk, &mut runner).execute(&alpine_plan(), |_| ());

        match result {
            Err(ExecError::Interrupted(Signal::Interrupt, Step::Upgrade)) => (),
            other => panic!("expected an interrupt before the upgrade, got {:?}", other),
        }
        assert_eq!(runner.commands(), vec!["apk update"]);
    }

    #[test]
    fn resync_ignores_signals() {
        let mut runner = Recorder::default();
        runner.interrupt_after(0, Signal::Terminate);

        Executor::new(&Apk, &mut runner).resync().unwrap();
        assert_eq!(runner.commands(), vec!["apk update"]);
    }
}
