use std::{fmt, str::FromStr};

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::AuditError;

/// One of the evaluations an audit can run.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Check {
    Spf,
    Dmarc,
    Dkim,
    Connectivity,
}

impl Check {
    pub const ALL: [Check; 4] = [Check::Spf, Check::Dmarc, Check::Dkim, Check::Connectivity];

    pub fn all() -> Vec<Check> {
        Self::ALL.to_vec()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spf => "spf",
            Self::Dmarc => "dmarc",
            Self::Dkim => "dkim",
            Self::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Check {
    type Err = AuditError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "spf" => Ok(Self::Spf),
            "dmarc" => Ok(Self::Dmarc),
            "dkim" => Ok(Self::Dkim),
            "connectivity" | "mx" | "smtp" => Ok(Self::Connectivity),
            _ => Err(AuditError::unknown_check(name.trim())),
        }
    }
}
