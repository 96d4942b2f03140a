use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VersionError {
    #[error("release version component was not a number: found {}", _0)]
    VersionNaN(String),
    #[error("release version is empty")]
    NoVersion,
}

/// A dotted, purely numeric release version such as `15.6`, `3.20` or `40`.
///
/// Versions compare component-wise as numbers, so `15.10` is newer than `15.9`.
/// Missing trailing components compare as zero: `9` equals `9.0`. The text it was
/// parsed from is kept for display, so Ubuntu's `24.04` keeps its padding.
#[derive(Clone, Debug, Eq)]
pub struct ReleaseVersion {
    components: Vec<u32>,
    text: Box<str>,
}

impl ReleaseVersion {
    pub fn major(&self) -> u32 { self.components[0] }

    pub fn components(&self) -> &[u32] { &self.components }

    /// True when `self` is at or beyond `target`, considering only as many
    /// components as the target carries. An Alpine `3.20.3` install satisfies `3.20`.
    pub fn satisfies(&self, target: &ReleaseVersion) -> bool {
        (0..target.components.len())
            .map(|i| self.component(i).cmp(&target.component(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .map_or(true, |ordering| ordering == Ordering::Greater)
    }

    /// The leading `count` components alone: `9.6` truncated to one is `9`.
    pub fn truncated(&self, count: usize) -> ReleaseVersion {
        let components: Vec<u32> = self.components.iter().take(count.max(1)).cloned().collect();
        let text = components.iter().map(ToString::to_string).collect::<Vec<_>>().join(".");
        ReleaseVersion { components, text: text.into() }
    }

    fn component(&self, index: usize) -> u32 { self.components.get(index).cloned().unwrap_or(0) }
}

impl Display for ReleaseVersion {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result { fmt.write_str(&self.text) }
}

impl FromStr for ReleaseVersion {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let version = input.split_whitespace().next().ok_or(VersionError::NoVersion)?;
        let version = version.trim_start_matches('v');
        if version.is_empty() {
            return Err(VersionError::NoVersion);
        }

        let components = version
            .split('.')
            .map(|c| c.parse::<u32>().map_err(|_| VersionError::VersionNaN(c.to_owned())))
            .collect::<Result<Vec<u32>, VersionError>>()?;

        Ok(ReleaseVersion { components, text: version.into() })
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> ReleaseVersion { input.parse().unwrap() }

    #[test]
    pub fn lts_parse() {
        assert_eq!(v("24.04.1 LTS").components(), &[24, 4, 1]);
    }

    #[test]
    pub fn alpine_prefix() {
        assert_eq!(v("v3.20"), v("3.20"));
        assert_eq!(v("v3.20").to_string(), "3.20");
    }

    #[test]
    pub fn keeps_padding() {
        assert_eq!(v("24.04").to_string(), "24.04");
        assert_eq!(v("24.04"), v("24.4"));
    }

    #[test]
    pub fn numeric_ordering() {
        assert!(v("15.10") > v("15.9"));
        assert!(v("3.9") < v("3.20"));
        assert!(v("42.3") > v("15.6"));
        assert_eq!(v("9"), v("9.0"));
    }

    #[test]
    pub fn satisfies_truncates_to_target() {
        assert!(v("3.20.3").satisfies(&v("3.20")));
        assert!(!v("3.19.4").satisfies(&v("3.20")));
        assert!(v("40").satisfies(&v("40")));
        assert!(!v("24.04").satisfies(&v("24.10")));
        assert!(!v("9").satisfies(&v("9.6")));
    }

    #[test]
    pub fn truncation() {
        assert_eq!(v("9.6").truncated(1).to_string(), "9");
        assert!(v("9.6").satisfies(&v("9.6").truncated(1)));
        assert_eq!(v("24.04.1").truncated(2), v("24.4"));
    }

    #[test]
    pub fn invalid() {
        assert_eq!("".parse::<ReleaseVersion>(), Err(VersionError::NoVersion));
        assert_eq!(
            "15.x".parse::<ReleaseVersion>(),
            Err(VersionError::VersionNaN("x".into()))
        );
    }
}
