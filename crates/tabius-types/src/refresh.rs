use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Policy governing background re-fetches after a read was served from
/// storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RefreshMode {
    /// Serve the stored value, never re-fetch.
    DoNotRefresh = 1,
    /// Re-fetch at most once per process lifetime for a key.
    RefreshOncePerSession = 2,
    /// Re-fetch on every read.
    Refresh = 3,
}

impl Default for RefreshMode {
    fn default() -> Self {
        Self::RefreshOncePerSession
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DoNotRefresh => "none",
            Self::RefreshOncePerSession => "once",
            Self::Refresh => "always",
        };
        f.write_str(s)
    }
}

impl FromStr for RefreshMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "DoNotRefresh" => Ok(Self::DoNotRefresh),
            "once" | "RefreshOncePerSession" => Ok(Self::RefreshOncePerSession),
            "always" | "Refresh" => Ok(Self::Refresh),
            other => Err(TypeError::InvalidRefreshMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_roundtrip() {
        for mode in [
            RefreshMode::DoNotRefresh,
            RefreshMode::RefreshOncePerSession,
            RefreshMode::Refresh,
        ] {
            assert_eq!(mode.to_string().parse::<RefreshMode>().unwrap(), mode);
        }
    }

    #[test]
    fn parses_variant_names() {
        assert_eq!(
            "RefreshOncePerSession".parse::<RefreshMode>().unwrap(),
            RefreshMode::RefreshOncePerSession
        );
        assert!("sometimes".parse::<RefreshMode>().is_err());
    }

    #[test]
    fn discriminants_are_stable() {
        assert_eq!(RefreshMode::DoNotRefresh as u8, 1);
        assert_eq!(RefreshMode::Refresh as u8, 3);
    }
}
