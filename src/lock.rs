use nix::fcntl::{flock, FlockArg};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock file at {}", _0.display())]
    Open(PathBuf, #[source] io::Error),
    #[error("another instance is already running (pid {})", _0)]
    Held(u32),
    #[error("another instance is already running")]
    HeldByUnknown,
    #[error("failed to lock {}", _0.display())]
    Lock(PathBuf, #[source] io::Error),
}

/// Exclusive hold on the instance lock, released when dropped.
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Takes the lock without blocking, recording this process's PID in it.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|why| LockError::Open(path.into(), why))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|why| LockError::Open(path.into(), why))?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => (),
            Err(nix::errno::Errno::EWOULDBLOCK) => {
                let holder = fs::read_to_string(path).ok().and_then(|pid| pid.trim().parse().ok());
                return Err(holder.map_or(LockError::HeldByUnknown, LockError::Held));
            }
            Err(why) => return Err(LockError::Lock(path.into(), why.into())),
        }

        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|why| LockError::Lock(path.into(), why))?;

        Ok(InstanceLock { file, path: path.to_path_buf() })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
        debug!("released {}", self.path.display());
    }
}
