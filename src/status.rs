use std::{
    fmt::{self, Display, Formatter},
    io,
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
};

/// Carried inside the `io::Error` of a command that exited unsuccessfully.
#[derive(Debug)]
pub struct ExitCode(pub i32);

impl Display for ExitCode {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "command failed with exit status: {}", self.0)
    }
}

impl std::error::Error for ExitCode {}

/// The exit code of the failed command behind `error`, if it exited on its own.
pub fn exit_code(error: &io::Error) -> Option<i32> {
    error.get_ref()?.downcast_ref::<ExitCode>().map(|code| code.0)
}

pub trait StatusExt {
    fn as_result(self) -> io::Result<()>;
}

impl StatusExt for ExitStatus {
    fn as_result(self) -> io::Result<()> {
        if self.success() {
            Ok(())
        } else if let Some(127) = self.code() {
            Err(io::Error::new(io::ErrorKind::NotFound, ExitCode(127)))
        } else if let Some(signal) = self.signal() {
            Err(io::Error::new(
                io::ErrorKind::Interrupted,
                format!("command terminated by signal {}", signal),
            ))
        } else {
            let code = self.code().unwrap_or(-1);
            Err(io::Error::new(io::ErrorKind::Other, ExitCode(code)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert!(ExitStatus::from_raw(0).as_result().is_ok());
        // Raw wait statuses carry the exit code in the second byte.
        let not_found = ExitStatus::from_raw(127 << 8).as_result().unwrap_err();
        assert_eq!(not_found.kind(), io::ErrorKind::NotFound);
        assert_eq!(exit_code(&not_found), Some(127));
        let failed = ExitStatus::from_raw(3 << 8).as_result().unwrap_err();
        assert_eq!(failed.kind(), io::ErrorKind::Other);
        assert_eq!(exit_code(&failed), Some(3));
        assert_eq!(failed.to_string(), "command failed with exit status: 3");
        let killed = ExitStatus::from_raw(libc::SIGKILL).as_result().unwrap_err();
        assert_eq!(killed.kind(), io::ErrorKind::Interrupted);
        assert_eq!(exit_code(&killed), None);
    }
}
