//! Checks GitHub releases for a newer version. Downloading and installing is left to the user.

use std::{cmp::Ordering, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

pub const GITHUB_API: &str = "https://api.github.com";
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub current_version: String,
    pub latest_version: String,
    pub release_notes: String,
    /// Page listing every release, for when no asset fits.
    pub release_page: String,
    /// Set only when the latest release is newer.
    pub asset: Option<Asset>,
}

impl UpdateInfo {
    pub fn has_update(&self) -> bool {
        compare_versions(&self.latest_version, &self.current_version) == Ordering::Greater
    }
}

pub struct UpdateChecker {
    client: Client,
    api_base: String,
    repository: String,
}

impl UpdateChecker {
    /// `repository` is in `owner/name` form.
    pub fn new(repository: String) -> Result<Self> {
        Self::with_api_base(GITHUB_API.into(), repository)
    }

    pub fn with_api_base(api_base: String, repository: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(CHECK_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repository,
        })
    }

    pub async fn check(&self, current_version: &str) -> Result<UpdateInfo> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.api_base, self.repository
        );
        let release: Release = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("unexpected release format")?;

        let latest_version = release.tag_name.trim_start_matches('v').to_string();
        let mut info = UpdateInfo {
            current_version: current_version.to_string(),
            latest_version,
            release_notes: release.body.unwrap_or_default(),
            release_page: releases_page(&self.repository),
            asset: None,
        };
        if info.has_update() {
            info.asset = select_asset(&release.assets).cloned();
        }
        info!(
            "Current version {}, latest {}",
            info.current_version, info.latest_version
        );
        Ok(info)
    }
}

pub fn releases_page(repository: &str) -> String {
    format!("https://github.com/{repository}/releases")
}

/// Compares dotted numeric versions. Missing parts count as zero, versions that aren't numeric
/// compare as equal.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let parse = |v: &str| {
        v.split('.')
            .map(|part| part.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
    };
    let (Ok(mut left), Ok(mut right)) = (parse(left), parse(right)) else {
        return Ordering::Equal;
    };
    let length = left.len().max(right.len());
    left.resize(length, 0);
    right.resize(length, 0);
    left.cmp(&right)
}

/// Prefers an archive, then an installer, then whatever comes first.
pub fn select_asset(assets: &[Asset]) -> Option<&Asset> {
    let has_extension = |asset: &&Asset, extension: &str| {
        asset.name.to_lowercase().ends_with(extension)
    };
    assets
        .iter()
        .find(|v| has_extension(v, ".zip"))
        .or_else(|| assets.iter().find(|v| has_extension(v, ".exe")))
        .or_else(|| assets.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.into(),
            browser_download_url: format!("https://example.com/{name}"),
            size: 1,
        }
    }

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("1.10.0", "1.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(compare_versions("1.2-beta", "1.0"), Ordering::Equal);
    }

    #[test]
    fn archives_are_preferred() {
        let assets = vec![asset("setup.EXE"), asset("notes.txt"), asset("dayflow.zip")];
        assert_eq!(select_asset(&assets), Some(&assets[2]));
        assert_eq!(select_asset(&assets[..2]), Some(&assets[0]));
        assert_eq!(select_asset(&assets[1..2]), Some(&assets[1]));
        assert_eq!(select_asset(&[]), None);
    }

    #[test]
    fn releases_page_is_on_github() {
        assert_eq!(
            releases_page("dayflow-rs/dayflow"),
            "https://github.com/dayflow-rs/dayflow/releases"
        );
    }
}
