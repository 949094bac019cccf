use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use log::warn;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent { input: String, component: String },
    #[error("empty prerelease tag in '{0}'")]
    EmptyPrerelease(String),
}

/// Release version: numeric core components plus an optional prerelease tag.
///
/// Cores compare component-wise after zero-padding the shorter one, so
/// `1.0` and `1.0.0` are equal. With equal cores a stable version outranks
/// any prerelease, and prerelease tags compare as plain strings.
#[derive(Debug, Clone)]
pub struct Version {
    core: Vec<u64>,
    prerelease: Option<String>,
}

impl Version {
    /// `0.0.0`, the version assumed for a fresh install.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            core: vec![0, 0, 0],
            prerelease: None,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::zero()
    }
}

/// Strip one leading `v`/`V` from a release tag.
#[must_use]
pub fn strip_tag_prefix(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = strip_tag_prefix(input);
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (core, prerelease) = match trimmed.split_once('-') {
            Some((_, "")) => return Err(VersionParseError::EmptyPrerelease(input.to_string())),
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (trimmed, None),
        };

        let core = core
            .split('.')
            .map(|component| {
                component
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        input: input.to_string(),
                        component: component.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { core, prerelease })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self
            .core
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        match &self.prerelease {
            Some(pre) => write!(f, "{core}-{pre}"),
            None => f.write_str(&core),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.core.len().max(other.core.len());
        let padded = |core: &[u64], idx: usize| core.get(idx).copied().unwrap_or(0);

        for idx in 0..len {
            match padded(&self.core, idx).cmp(&padded(&other.core, idx)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }

        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(ours), Some(theirs)) => ours.cmp(theirs),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Whether `latest` strictly outranks `current`.
///
/// If either side fails to parse the answer is `true`: an unreadable version
/// never blocks an update.
#[must_use]
pub fn needs_update(current: &str, latest: &str) -> bool {
    match (current.parse::<Version>(), latest.parse::<Version>()) {
        (Ok(current), Ok(latest)) => latest > current,
        (Err(error), _) | (_, Err(error)) => {
            warn!("Version parsing error: {error}. Assuming update needed.");
            true
        }
    }
}
