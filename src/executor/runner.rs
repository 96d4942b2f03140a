use crate::{
    logging::OUTPUT_TARGET,
    signal_handler::{self, Signal},
    status::StatusExt,
};
use std::{
    fmt::{self, Display, Formatter},
    io::{self, BufRead, BufReader, Read},
    process::{Command, Stdio},
    thread,
};

/// A single external command, described as data so that it can be rendered,
/// recorded, or executed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// A failure is reported as a warning instead of halting the upgrade.
    pub tolerant: bool,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Invocation { program: program.into(), args: Vec::new(), env: Vec::new(), tolerant: false }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    fn command(&self) -> Command {
        cascade! {
            Command::new(&self.program);
            ..args(&self.args);
            ..envs(self.env.iter().map(|(k, v)| (k, v)));
            ..stdin(Stdio::inherit());
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        for (key, value) in &self.env {
            write!(fmt, "{}={} ", key, value)?;
        }

        fmt.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(fmt, " '{}'", arg)?;
            } else {
                write!(fmt, " {}", arg)?;
            }
        }

        Ok(())
    }
}

/// Executes invocations on behalf of the executor, hooks, and snapshot provider.
pub trait CommandRunner {
    /// Runs the invocation to completion. A non-zero exit is an error.
    fn run(&mut self, invocation: &Invocation) -> io::Result<()>;

    /// Runs the invocation and returns its standard output.
    fn capture(&mut self, invocation: &Invocation) -> io::Result<String>;

    /// True when invocations are only rendered, never executed.
    fn is_dry(&self) -> bool { false }

    /// A termination signal received since the process started, if any.
    fn interrupted(&self) -> Option<Signal> { signal_handler::pending() }
}

/// Spawns processes, echoing their output to the terminal and the run's log file.
#[derive(Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> io::Result<()> {
        info!("executing: {}", invocation);

        let mut child = cascade! {
            invocation.command();
            ..stdout(Stdio::piped());
            ..stderr(Stdio::piped());
        }
        .spawn()
        .map_err(|why| io::Error::new(why.kind(), fomat!("failed to spawn " (invocation.program) ": " (why))))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|scope| {
            if let Some(stderr) = stderr {
                scope.spawn(move || forward(stderr, |line| eprintln!("{}", line)));
            }

            if let Some(stdout) = stdout {
                forward(stdout, |line| println!("{}", line));
            }
        });

        child.wait()?.as_result()
    }

    fn capture(&mut self, invocation: &Invocation) -> io::Result<String> {
        info!("executing: {}", invocation);

        let output = cascade! {
            invocation.command();
            ..stdin(Stdio::null());
            ..stderr(Stdio::inherit());
        }
        .output()?;

        output.status.as_result()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in stdout.lines() {
            info!(target: OUTPUT_TARGET, "{}", line);
        }

        Ok(stdout)
    }
}

/// Sends each line of `reader` to the terminal through `echo`, and to the log file.
fn forward<R: Read>(reader: R, echo: impl Fn(&str)) {
    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        echo(&line);
        info!(target: OUTPUT_TARGET, "{}", line);
    }
}

/// Renders invocations without executing anything.
#[derive(Default)]
pub struct DryRunner {
    pub rendered: Vec<Invocation>,
}

impl DryRunner {
    fn render(&mut self, invocation: &Invocation) {
        println!("would execute: {}", invocation);
        info!(target: OUTPUT_TARGET, "would execute: {}", invocation);
        self.rendered.push(invocation.clone());
    }
}

impl CommandRunner for DryRunner {
    fn run(&mut self, invocation: &Invocation) -> io::Result<()> {
        self.render(invocation);
        Ok(())
    }

    fn capture(&mut self, invocation: &Invocation) -> io::Result<String> {
        self.render(invocation);
        Ok(String::new())
    }

    fn is_dry(&self) -> bool { true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let invocation = Invocation::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args(&["-y", "full-upgrade"])
            .arg("--comment=a b");
        assert_eq!(
            invocation.to_string(),
            "DEBIAN_FRONTEND=noninteractive apt-get -y full-upgrade '--comment=a b'"
        );
    }

    #[test]
    fn dry_runner_renders() {
        let mut runner = DryRunner::default();
        let invocation = Invocation::new("apk").arg("update");
        runner.run(&invocation).unwrap();
        assert_eq!(runner.capture(&invocation).unwrap(), "");
        assert_eq!(runner.rendered, vec![invocation.clone(), invocation]);
        assert!(runner.is_dry());
    }

    #[test]
    fn system_runner_status() {
        let mut runner = SystemRunner;
        assert!(runner.run(&Invocation::new("true")).is_ok());
        assert!(runner.run(&Invocation::new("false")).is_err());
        assert_eq!(
            runner.capture(&Invocation::new("sh").args(&["-c", "echo $GREETING"]).env("GREETING", "hi")).unwrap(),
            "hi\n"
        );
        assert!(runner.run(&Invocation::new("/nonexistent/program")).is_err());
    }
}
