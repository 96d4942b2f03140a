use crate::{
    backup::BackupError,
    distribution::{DetectError, Distribution},
    executor::ExecError,
    preflight::PreflightResult,
    repos::RepoError,
    resolver::ResolveError,
    signal_handler::Signal,
};
use thiserror::Error;

pub type UpgradeResult<T> = Result<T, UpgradeError>;

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("failed to detect the running distribution")]
    Detect(#[from] DetectError),
    #[error("this system runs {}, not {}", detected, expected)]
    WrongDistribution { expected: Distribution, detected: Distribution },
    #[error("root is required for this action: rerun with `sudo`")]
    NotRoot,
    #[error("{} has no `{}` channel (available: {})", distribution, channel, available)]
    UnknownChannel { distribution: Distribution, channel: String, available: String },
    #[error("preflight checks failed: {}", describe(_0))]
    Preflight(Vec<PreflightResult>),
    #[error("failed to resolve the upgrade target")]
    Resolution(#[from] ResolveError),
    #[error("failed to back up the repository configuration")]
    Backup(#[source] BackupError),
    #[error("received {} signal before the upgrade began", _0)]
    Interrupted(Signal),
    #[error("upgrade failed; the repository configuration was restored")]
    Execution(#[source] ExecutionFailure),
    #[error("dry run failed; nothing was changed")]
    DryRun(#[source] ExecutionFailure),
    #[error("upgrade failed ({}), and restoring the previous configuration also failed", cause)]
    Rollback { cause: ExecutionFailure, #[source] why: RollbackError },
    #[error("upgrade cancelled: {}", _0)]
    Cancelled(&'static str),
}

impl UpgradeError {
    /// Cancellation by the user is not a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            UpgradeError::Cancelled(_) => 0,
            _ => 1,
        }
    }
}

/// A mutating step that failed after the configuration was backed up.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("failed to rewrite repositories")]
    Rewrite(#[from] RepoError),
    #[error("package manager step failed")]
    Command(#[from] ExecError),
    #[error("received {} signal", _0)]
    Interrupted(Signal),
}

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("failed to restore the backup")]
    Restore(#[from] BackupError),
    #[error("failed to resynchronize package indices")]
    Resync(#[from] ExecError),
}

fn describe(results: &[PreflightResult]) -> String {
    results.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
