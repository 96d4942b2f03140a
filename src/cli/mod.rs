//! Argument parsing and terminal presentation of an upgrade run.

use clap::{Arg, ArgMatches, Command};
use distro_upgrade::{
    distribution::Distribution,
    hooks::HookSummary,
    misc,
    orchestrator::{Outcome, Report, UpgradeError},
};
use std::{fmt::Display, path::Path};
use yansi::Paint;

fn color_error<T: Display>(value: T) -> Paint<T> { Paint::red(value).bold() }

fn color_error_desc<T: Display>(value: T) -> Paint<T> { Paint::red(value).bold().dimmed() }

fn color_info<T: Display>(value: T) -> Paint<T> { Paint::yellow(value).bold() }

fn color_primary<T: Display>(value: T) -> Paint<T> { Paint::green(value).bold() }

fn color_secondary<T: Display>(value: T) -> Paint<T> { Paint::cyan(value).bold() }

/// Subcommand name, aliases, and help text of each distribution.
fn describe(distribution: Distribution) -> (&'static str, &'static [&'static str], &'static str) {
    match distribution {
        Distribution::Ubuntu => {
            ("ubuntu", &[], "upgrade Ubuntu to the next release (channels: lts, release)")
        }
        Distribution::Debian => {
            ("debian", &[], "switch Debian to another suite (channels: stable, testing, sid)")
        }
        Distribution::Fedora => {
            ("fedora", &[], "upgrade Fedora with dnf system-upgrade (channels: stable, rawhide)")
        }
        Distribution::Arch => ("arch", &[], "synchronize an Arch Linux system (channels: rolling)"),
        Distribution::Alpine => {
            ("alpine", &[], "upgrade Alpine Linux to another branch (channels: stable, edge)")
        }
        Distribution::Kali => (
            "kali",
            &[],
            "switch Kali to another branch \
             (channels: rolling, last-snapshot, bleeding-edge, experimental)",
        ),
        Distribution::OpenSuse => {
            ("opensuse", &[], "upgrade openSUSE with zypper (channels: leap, tumbleweed)")
        }
        Distribution::RhelClone => (
            "rhel",
            &["rocky", "alma"],
            "upgrade Rocky Linux or AlmaLinux to the next major release with leapp \
             (channels: next)",
        ),
    }
}

pub fn app() -> Command<'static> {
    let subcommands = Distribution::ALL.iter().map(|&distribution| {
        let (name, aliases, about) = describe(distribution);
        let channels = distribution.profile().channel_names();
        Command::new(name)
            .about(about)
            .aliases(aliases)
            .arg(
                Arg::new("dry-run")
                    .help("show what would be done, without changing the system")
                    .long("dry-run"),
            )
            .arg(
                Arg::new("skip-checks")
                    .help("skip the disk space, network, and battery checks")
                    .long("skip-checks"),
            )
            .arg(
                Arg::new("CHANNEL")
                    .help("upgrade channel to follow; prompts for one when omitted")
                    .possible_values(channels),
            )
    });

    Command::new("distro-upgrade")
        .about("Upgrades a Linux distribution to its next release")
        .version(env!("CARGO_PKG_VERSION"))
        .propagate_version(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .help("log debugging information")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .help("read settings from PATH instead of the system configuration")
                .long("config")
                .value_name("PATH")
                .takes_value(true)
                .global(true),
        )
        .subcommands(subcommands)
}

/// Distribution named by the subcommand in `matches`.
pub fn distribution(name: &str) -> Option<Distribution> {
    Distribution::ALL.iter().cloned().find(|&d| describe(d).0 == name)
}

pub fn print_report(report: &Report, log: Option<&Path>) {
    match report.outcome {
        Outcome::AlreadyCurrent => {
            println!("{}: {}", color_primary("Already up to date"), color_secondary(&report.plan))
        }
        Outcome::DryRun => {
            println!("{}: {}", color_info("Dry run finished"), color_secondary(&report.plan))
        }
        Outcome::Upgraded => {
            println!("{}: {}", color_primary("Upgrade finished"), color_secondary(&report.plan))
        }
    }

    if let Some(ref snapshot) = report.snapshot {
        println!("  snapshot: {} {}", snapshot.tool, color_secondary(&snapshot.identifier));
    }

    print_hooks("pre", report.pre_hooks);
    print_hooks("post", report.post_hooks);

    if !report.unmerged.is_empty() {
        println!("{}", color_info("Configuration files that need a manual merge:"));
        for path in &report.unmerged {
            println!("  {}", path.display());
        }
    }

    if let Some(log) = log {
        println!("  log: {}", log.display());
    }
}

fn print_hooks(phase: &str, summary: HookSummary) {
    if summary.count == 0 {
        return;
    }

    if summary.failed == 0 {
        println!("  {} hooks: {} run", phase, summary.count);
    } else {
        println!(
            "  {} hooks: {} run, {}",
            phase,
            summary.count,
            color_error(fomat!((summary.failed) " failed"))
        );
    }
}

pub fn print_error(error: &UpgradeError) {
    match error {
        UpgradeError::Cancelled(reason) => {
            eprintln!("{}: {}", color_info("cancelled"), reason);
        }
        _ => {
            eprintln!("{}: {}", color_error("distro-upgrade"), color_error_desc(misc::format_error(error)));
        }
    }
}

/// Reports a failure that happened before an upgrade could start.
pub fn print_failure(context: &str, error: &(dyn std::error::Error + 'static)) {
    eprintln!(
        "{}: {}: {}",
        color_error("distro-upgrade"),
        context,
        color_error_desc(misc::format_error(error))
    );
}

pub fn verbosity(matches: &ArgMatches) -> log::LevelFilter {
    match matches.occurrences_of("verbose") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}
