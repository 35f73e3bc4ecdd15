//! Degraded-cache strategies

use serde::{Deserialize, Serialize};

/// How a fetch behaves when the cache misbehaves.
///
/// Only cache read and write failures are subject to the strategy; source,
/// derivation and codec failures always abort the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Cache errors are fatal to the call.
    #[default]
    FirstUseCache,
    /// Cache errors are reported and the call continues against the source.
    FailBackToSource,
    /// Never consult the source; answer from the cache alone.
    OnlyUseCache,
}

impl Strategy {
    /// Whether a cache read or write error should be swallowed.
    pub fn tolerates_cache_errors(&self) -> bool {
        matches!(self, Strategy::FailBackToSource)
    }

    /// Whether the source fetcher may be invoked at all.
    pub fn uses_source(&self) -> bool {
        !matches!(self, Strategy::OnlyUseCache)
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // separators and case are not significant
        let folded = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "firstusecache" | "default" => Ok(Strategy::FirstUseCache),
            "failbacktosource" | "cachefailbacktosource" | "failback" => {
                Ok(Strategy::FailBackToSource)
            }
            "onlyusecache" | "onlycache" => Ok(Strategy::OnlyUseCache),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::FirstUseCache => write!(f, "first-use-cache"),
            Strategy::FailBackToSource => write!(f, "fail-back-to-source"),
            Strategy::OnlyUseCache => write!(f, "only-use-cache"),
        }
    }
}
