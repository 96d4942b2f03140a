#[macro_use]
extern crate fomat_macros;

#[macro_use]
extern crate log;

mod cli;

use clap::ArgMatches;
use distro_upgrade::{
    config::Config,
    executor::{CommandRunner, DryRunner, SystemRunner},
    lock::InstanceLock,
    logging::{prepare_log_file, setup_logging},
    orchestrator::{Orchestrator, UpgradeRequest},
    preflight::HostProbe,
    prompt::TerminalPrompt,
    resolver::HttpFetch,
    signal_handler,
};
use std::{
    path::{Path, PathBuf},
    process::exit,
};

pub fn main() {
    let matches = match cli::app().try_get_matches() {
        Ok(matches) => matches,
        Err(why) => {
            // Usage errors exit with 1 rather than clap's 2; help and version succeed.
            let code = if why.use_stderr() { 1 } else { 0 };
            let _ = why.print();
            exit(code);
        }
    };

    exit(main_(&matches));
}

fn main_(matches: &ArgMatches) -> i32 {
    let (name, matches) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => return 1,
    };

    let distribution = match cli::distribution(name) {
        Some(distribution) => distribution,
        None => return 1,
    };

    let mut config = match Config::load(matches.value_of("config").map(Path::new)) {
        Ok(config) => config,
        Err(why) => {
            cli::print_failure("invalid configuration", &why);
            return 1;
        }
    };

    config.dry_run = matches.is_present("dry-run");
    config.skip_checks = matches.is_present("skip-checks");

    let log = init_logging(&config, cli::verbosity(matches), name);

    let _lock = if config.dry_run {
        None
    } else {
        match InstanceLock::acquire(&config.lock_file) {
            Ok(lock) => Some(lock),
            Err(why) => {
                cli::print_failure("unable to start", &why);
                return 1;
            }
        }
    };

    signal_handler::init();

    let fetch = match HttpFetch::new() {
        Ok(fetch) => fetch,
        Err(why) => {
            cli::print_failure("unable to start", &*why);
            return 1;
        }
    };

    let probe = HostProbe::new(&config);
    let mut prompt = TerminalPrompt::new();
    let mut runner: Box<dyn CommandRunner> = if config.dry_run {
        Box::new(DryRunner::default())
    } else {
        Box::new(SystemRunner)
    };

    let request = UpgradeRequest {
        distribution,
        channel: matches.value_of("CHANNEL").map(String::from),
    };

    let result =
        Orchestrator::new(&config, &probe, &fetch, &mut prompt, &mut *runner).run(&request);

    match result {
        Ok(report) => {
            cli::print_report(&report, log.as_deref());
            0
        }
        Err(why) => {
            cli::print_error(&why);
            if let Some(log) = log {
                eprintln!("  log: {}", log.display());
            }

            why.exit_code()
        }
    }
}

/// Logs to stderr and this run's log file, or to stderr alone when no file can
/// be created.
fn init_logging(config: &Config, level: log::LevelFilter, distribution: &str) -> Option<PathBuf> {
    let file = match prepare_log_file(&config.log_dir, distribution) {
        Ok(file) => file,
        Err(why) => {
            let _ = setup_logging(level, None);
            warn!("logging to stderr only: unable to create {}: {}", config.log_dir.display(), why);
            return None;
        }
    };

    if let Err(why) = setup_logging(level, Some(&file)) {
        let _ = setup_logging(level, None);
        warn!("logging to stderr only: {}: {}", file.display(), why);
        return None;
    }

    debug!("logging to {}", file.display());
    Some(file)
}
