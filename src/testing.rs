//! Stand-ins for the host, the network, the terminal, and the package manager.

use crate::{
    config::Config,
    executor::{CommandRunner, Invocation},
    preflight::{PowerKind, PowerSupply, SystemProbe},
    prompt::ConfirmationPort,
    resolver::MirrorFetch,
    signal_handler::Signal,
    status::ExitCode,
};
use std::{
    cell::Cell,
    collections::VecDeque,
    fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

/// Records invocations instead of running them.
#[derive(Default)]
pub struct Recorder {
    pub invocations: Vec<Invocation>,
    failing: Vec<String>,
    outputs: Vec<(String, String)>,
    interrupt: Option<(usize, Signal)>,
    effects: Vec<(String, PathBuf, String)>,
}

fn command_line(invocation: &Invocation) -> String {
    let mut line = invocation.program.clone();
    for arg in &invocation.args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

impl Recorder {
    /// Fails every invocation whose command line starts with `prefix`.
    pub fn failing(prefix: &str) -> Self {
        let mut recorder = Recorder::default();
        recorder.fail(prefix);
        recorder
    }

    pub fn fail(&mut self, prefix: &str) { self.failing.push(prefix.to_owned()); }

    /// Output captured from invocations whose command line starts with `prefix`.
    pub fn output(&mut self, prefix: &str, output: &str) {
        self.outputs.push((prefix.to_owned(), output.to_owned()));
    }

    /// Writes `contents` to `path` whenever a command line starting with `prefix`
    /// is recorded, before it succeeds or fails.
    pub fn writing(&mut self, prefix: &str, path: PathBuf, contents: &str) {
        self.effects.push((prefix.to_owned(), path, contents.to_owned()));
    }

    /// Reports `signal` as received once `count` invocations have been recorded.
    pub fn interrupt_after(&mut self, count: usize, signal: Signal) {
        self.interrupt = Some((count, signal));
    }

    /// Command lines of every recorded invocation, without environment.
    pub fn commands(&self) -> Vec<String> { self.invocations.iter().map(command_line).collect() }

    fn record(&mut self, invocation: &Invocation) -> io::Result<String> {
        let line = command_line(invocation);
        self.invocations.push(invocation.clone());

        for (prefix, path, contents) in &self.effects {
            if line.starts_with(prefix.as_str()) {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, contents).unwrap();
            }
        }

        if self.failing.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            return Err(io::Error::new(io::ErrorKind::Other, ExitCode(1)));
        }

        Ok(self
            .outputs
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

impl CommandRunner for Recorder {
    fn run(&mut self, invocation: &Invocation) -> io::Result<()> {
        self.record(invocation).map(|_| ())
    }

    fn capture(&mut self, invocation: &Invocation) -> io::Result<String> { self.record(invocation) }

    fn interrupted(&self) -> Option<Signal> {
        self.interrupt.filter(|&(count, _)| self.invocations.len() >= count).map(|(_, signal)| signal)
    }
}

pub struct FakeProbe {
    pub free: u64,
    pub reachable: Vec<SocketAddr>,
    pub supplies: Vec<PowerSupply>,
    pub root: bool,
}

impl FakeProbe {
    /// Plenty of space, every endpoint reachable, no battery, running as root.
    pub fn healthy() -> Self {
        let mut reachable = Config::new("/").endpoints;
        reachable.push(([10, 0, 0, 1], 53).into());
        reachable.push(([10, 0, 0, 2], 53).into());

        FakeProbe { free: 100 * 1024 * 1024 * 1024, reachable, supplies: Vec::new(), root: true }
    }

    pub fn battery(capacity: u8, discharging: bool) -> PowerSupply {
        PowerSupply {
            name: "BAT0".into(),
            kind: PowerKind::Battery,
            online: false,
            capacity: Some(capacity),
            discharging,
        }
    }
}

impl SystemProbe for FakeProbe {
    fn free_space(&self, _path: &Path) -> io::Result<u64> { Ok(self.free) }

    fn reachable(&self, endpoint: &SocketAddr, _timeout: Duration) -> bool {
        self.reachable.contains(endpoint)
    }

    fn power_supplies(&self) -> io::Result<Vec<PowerSupply>> { Ok(self.supplies.clone()) }

    fn is_root(&self) -> bool { self.root }
}

/// Serves fixed bodies by URL. Unknown URLs are unreachable.
#[derive(Default)]
pub struct Canned {
    bodies: Vec<(&'static str, &'static str)>,
    fallback: Option<&'static str>,
    pub calls: Cell<usize>,
}

impl Canned {
    pub fn new(bodies: &[(&'static str, &'static str)]) -> Self {
        Canned { bodies: bodies.to_vec(), ..Canned::default() }
    }

    /// Answers every URL with `body`.
    pub fn serving(body: &'static str) -> Self {
        Canned { fallback: Some(body), ..Canned::default() }
    }
}

impl MirrorFetch for Canned {
    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.bodies
            .iter()
            .find(|(candidate, _)| *candidate == url)
            .map(|(_, body)| *body)
            .or(self.fallback)
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("could not connect to {}", url))
    }
}

/// Answers prompts from a script. Once the script runs out, every question is
/// answered negatively.
#[derive(Default)]
pub struct Scripted {
    answers: VecDeque<bool>,
    choices: VecDeque<Option<usize>>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new(answers: &[bool]) -> Self {
        Scripted { answers: answers.iter().cloned().collect(), ..Scripted::default() }
    }

    pub fn choosing(mut self, choice: Option<usize>) -> Self {
        self.choices.push_back(choice);
        self
    }
}

impl ConfirmationPort for Scripted {
    fn confirm(&mut self, question: &str, _default: bool) -> bool {
        self.asked.push(question.to_owned());
        self.answers.pop_front().unwrap_or(false)
    }

    fn choose(&mut self, prompt: &str, _options: &[&str]) -> Option<usize> {
        self.asked.push(prompt.to_owned());
        self.choices.pop_front().flatten()
    }
}
