//! Resolution of a channel into the release it currently points to.

use crate::{
    distribution::{Distribution, Resolution, UpgradeChannel, VersionFilter},
    misc,
    plan::Target,
    version::ReleaseVersion,
};
use anyhow::Context;
use isahc::{HttpClient, ReadResponseExt};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch release listing from {}", url)]
    Fetch { url: &'static str, #[source] why: anyhow::Error },
    #[error("release pattern for the {} channel is invalid", channel)]
    Pattern { channel: &'static str, #[source] why: regex::Error },
    #[error("no release versions for the {} channel were found at {}", channel, url)]
    NoVersions { channel: &'static str, url: &'static str },
    #[error("the running release version is unknown, so the next major release cannot be chosen")]
    UnknownCurrent,
}

/// Source of mirror listings and release manifests.
pub trait MirrorFetch {
    fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

/// Fetches listings over HTTP(S).
pub struct HttpFetch {
    client: HttpClient,
}

impl HttpFetch {
    pub fn new() -> anyhow::Result<Self> {
        let client = misc::http_client().context("failed to build HTTP client")?;
        Ok(HttpFetch { client })
    }
}

impl MirrorFetch for HttpFetch {
    fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let mut response =
            self.client.get(url).with_context(|| fomat!("request for " (url) " failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(fomat!(
                "HTTP error " (status.as_u16()) " connecting to " (url)
                if let Some(reason) = status.canonical_reason() { ": " (reason) }
            )));
        }

        response.text().with_context(|| fomat!("failed to read response from "(url)))
    }
}

/// Produces the target of `channel`. Rolling channels return their sentinel without
/// touching the network.
pub fn resolve_target(
    distribution: Distribution,
    channel: &'static UpgradeChannel,
    current: Option<&ReleaseVersion>,
    fetch: &dyn MirrorFetch,
) -> Result<Target, ResolveError> {
    let (url, pattern, filter) = match channel.resolution {
        Resolution::Fixed(sentinel) => return Ok(Target::Rolling(sentinel)),
        Resolution::Mirror { url, pattern, filter } => (url, pattern, filter),
    };

    if filter == VersionFilter::NextMajor && current.is_none() {
        return Err(ResolveError::UnknownCurrent);
    }

    info!("resolving the {} {} release from {}", distribution, channel.name, url);
    let body = fetch.fetch(url).map_err(|why| ResolveError::Fetch { url, why })?;

    let versions = extract_versions(&body, pattern)
        .map_err(|why| ResolveError::Pattern { channel: channel.name, why })?;
    debug!("found {} candidate versions at {}", versions.len(), url);

    let newest_major = versions.iter().map(ReleaseVersion::major).max();
    match (latest(versions, filter, current), filter, current, newest_major) {
        (Some(version), ..) => Ok(Target::Version(version)),
        // Nothing newer is published: the running major release is the target.
        (None, VersionFilter::NextMajor, Some(current), Some(newest))
            if newest <= current.major() =>
        {
            info!("no release after {} is published", current.major());
            Ok(Target::Version(current.truncated(1)))
        }
        _ => Err(ResolveError::NoVersions { channel: channel.name, url }),
    }
}

/// Every version token matched by the first capture group of `pattern`.
/// Tokens that do not parse as versions are skipped.
pub fn extract_versions(body: &str, pattern: &str) -> Result<Vec<ReleaseVersion>, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(regex
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .filter_map(|token| token.as_str().parse::<ReleaseVersion>().ok())
        .collect())
}

/// The highest version that passes `filter`.
pub fn latest(
    versions: Vec<ReleaseVersion>,
    filter: VersionFilter,
    current: Option<&ReleaseVersion>,
) -> Option<ReleaseVersion> {
    versions
        .into_iter()
        .filter(|version| match filter {
            VersionFilter::Any => true,
            VersionFilter::Below(major) => version.major() < major,
            VersionFilter::NextMajor => current.map_or(false, |c| version.major() == c.major() + 1),
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Canned;

    fn v(input: &str) -> ReleaseVersion { input.parse().unwrap() }

    const LEAP_LISTING: &str = r#"
        <a href="./15.4/">15.4/</a>
        <a href="./15.5/">15.5/</a>
        <a href="./15.6/">15.6/</a>
        <a href="./42.3/">42.3/</a>
    "#;

    #[test]
    fn opensuse_excludes_legacy_line() {
        let channel = Distribution::OpenSuse.profile().channel("leap").unwrap();
        let target =
            resolve_target(Distribution::OpenSuse, channel, None, &Canned::serving(LEAP_LISTING)).unwrap();
        assert_eq!(target, Target::Version(v("15.6")));
    }

    #[test]
    fn numeric_not_lexical() {
        let listing = r#"<a href="v3.9/">v3.9/</a> <a href="v3.20/">v3.20/</a> <a href="v3.19/">"#;
        let channel = Distribution::Alpine.profile().channel("stable").unwrap();
        let target =
            resolve_target(Distribution::Alpine, channel, None, &Canned::serving(listing)).unwrap();
        assert_eq!(target, Target::Version(v("3.20")));
    }

    #[test]
    fn ubuntu_meta_release() {
        let manifest = "Dist: jammy\nVersion: 22.04.5 LTS\n\nDist: noble\nVersion: 24.04.3 LTS\n";
        let channel = Distribution::Ubuntu.profile().channel("lts").unwrap();
        let target =
            resolve_target(Distribution::Ubuntu, channel, None, &Canned::serving(manifest)).unwrap();
        assert_eq!(target, Target::Version(v("24.04")));
    }

    #[test]
    fn next_major_only() {
        let listing = r#"href="8.10/" href="9.5/" href="9.6/" href="10.0/""#;
        let channel = Distribution::RhelClone.profile().channel("next").unwrap();
        let current = v("8.10");
        let target =
            resolve_target(Distribution::RhelClone, channel, Some(&current), &Canned::serving(listing))
                .unwrap();
        assert_eq!(target, Target::Version(v("9.6")));

        let result = resolve_target(Distribution::RhelClone, channel, None, &Canned::serving(listing));
        assert!(matches!(result, Err(ResolveError::UnknownCurrent)));
    }

    #[test]
    fn newest_major_is_its_own_target() {
        let listing = r#"href="8.10/" href="9.5/" href="9.6/""#;
        let channel = Distribution::RhelClone.profile().channel("next").unwrap();
        let current = v("9.6");
        let target =
            resolve_target(Distribution::RhelClone, channel, Some(&current), &Canned::serving(listing))
                .unwrap();
        assert_eq!(target, Target::Version(v("9")));

        // A gap in the listing is still an error.
        let current = v("7.9");
        let listing = r#"href="9.5/" href="9.6/""#;
        let result =
            resolve_target(Distribution::RhelClone, channel, Some(&current), &Canned::serving(listing));
        assert!(matches!(result, Err(ResolveError::NoVersions { channel: "next", .. })));
    }

    #[test]
    fn rolling_skips_network() {
        let fetch = Canned::default();
        for (distribution, name, sentinel) in &[
            (Distribution::Alpine, "edge", "edge"),
            (Distribution::Fedora, "rawhide", "rawhide"),
            (Distribution::Debian, "sid", "sid"),
            (Distribution::OpenSuse, "tumbleweed", "tumbleweed"),
            (Distribution::Arch, "rolling", "rolling"),
            (Distribution::Kali, "bleeding-edge", "kali-bleeding-edge"),
        ] {
            let channel = distribution.profile().channel(name).unwrap();
            let target = resolve_target(*distribution, channel, None, &fetch).unwrap();
            assert_eq!(target, Target::Rolling(*sentinel));
        }

        assert_eq!(fetch.calls.get(), 0);
    }

    #[test]
    fn missing_pattern_is_an_error() {
        let channel = Distribution::Fedora.profile().channel("stable").unwrap();
        let result = resolve_target(
            Distribution::Fedora,
            channel,
            None,
            &Canned::serving("<html>maintenance</html>"),
        );
        assert!(matches!(result, Err(ResolveError::NoVersions { channel: "stable", .. })));
    }

    #[test]
    fn unreachable_mirror_is_an_error() {
        let channel = Distribution::Fedora.profile().channel("stable").unwrap();
        let result = resolve_target(Distribution::Fedora, channel, None, &Canned::default());
        assert!(matches!(result, Err(ResolveError::Fetch { .. })));
    }
}
