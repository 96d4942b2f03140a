use crate::{
    distribution::{Distribution, UpgradeChannel},
    version::ReleaseVersion,
};
use std::fmt::{self, Display, Formatter};

/// The release an upgrade moves to.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Version(ReleaseVersion),
    /// A channel without discrete versions, named by its sentinel.
    Rolling(&'static str),
}

impl Target {
    pub fn version(&self) -> Option<&ReleaseVersion> {
        match self {
            Target::Version(version) => Some(version),
            Target::Rolling(_) => None,
        }
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Target::Version(version) => write!(fmt, "{}", version),
            Target::Rolling(sentinel) => fmt.write_str(sentinel),
        }
    }
}

/// Everything an upgrade run acts on. Fields are private: once the user has
/// confirmed a plan, nothing may change it.
#[derive(Clone, Debug, PartialEq)]
pub struct UpgradePlan {
    distribution: Distribution,
    channel: &'static UpgradeChannel,
    current: Option<ReleaseVersion>,
    target: Target,
    dry_run: bool,
}

impl UpgradePlan {
    pub fn new(
        distribution: Distribution,
        channel: &'static UpgradeChannel,
        current: Option<ReleaseVersion>,
        target: Target,
        dry_run: bool,
    ) -> Self {
        UpgradePlan { distribution, channel, current, target, dry_run }
    }

    pub fn distribution(&self) -> Distribution { self.distribution }

    pub fn channel(&self) -> &'static UpgradeChannel { self.channel }

    pub fn current(&self) -> Option<&ReleaseVersion> { self.current.as_ref() }

    pub fn target(&self) -> &Target { &self.target }

    pub fn dry_run(&self) -> bool { self.dry_run }

    /// A discrete-version channel whose target the system already runs.
    pub fn is_satisfied(&self) -> bool {
        match (&self.current, &self.target) {
            (Some(current), Target::Version(target)) => current.satisfies(target),
            _ => false,
        }
    }
}

impl Display for UpgradePlan {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "{} ", self.distribution)?;
        match self.current {
            Some(ref current) => write!(fmt, "{}", current)?,
            None => fmt.write_str("(rolling)")?,
        }

        write!(fmt, " -> {} via the {} channel", self.target, self.channel.name)?;
        if self.dry_run {
            fmt.write_str(" [dry run]")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied() {
        let channel = Distribution::Alpine.profile().channel("stable").unwrap();
        let target = Target::Version("3.20".parse().unwrap());

        let plan = UpgradePlan::new(
            Distribution::Alpine,
            channel,
            Some("3.20.2".parse().unwrap()),
            target.clone(),
            false,
        );
        assert!(plan.is_satisfied());

        let plan =
            UpgradePlan::new(Distribution::Alpine, channel, Some("3.19.1".parse().unwrap()), target, true);
        assert!(!plan.is_satisfied());
        assert_eq!(plan.to_string(), "alpine 3.19.1 -> 3.20 via the stable channel [dry run]");
    }

    #[test]
    fn rolling_never_satisfied() {
        let channel = Distribution::Alpine.profile().channel("edge").unwrap();
        let plan = UpgradePlan::new(
            Distribution::Alpine,
            channel,
            Some("3.20".parse().unwrap()),
            Target::Rolling("edge"),
            false,
        );
        assert!(!plan.is_satisfied());
    }
}
