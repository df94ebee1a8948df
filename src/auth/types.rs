#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use super::{dkim::DkimSelectors, dmarc::ParsedDmarc, scoring::Assessment, spf::ParsedSpf};

/// Outcome of evaluating one protocol for one domain.
///
/// `score` is an unbounded sum of rule points; it is not normalised to 100.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult<P> {
    pub domain: String,
    pub found: bool,
    pub records: Vec<String>,
    pub parsed: Option<P>,
    pub valid: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub score: i32,
}

pub type SpfReport = EvaluationResult<ParsedSpf>;
pub type DmarcReport = EvaluationResult<ParsedDmarc>;
pub type DkimReport = EvaluationResult<DkimSelectors>;

impl<P> EvaluationResult<P> {
    pub(crate) fn assemble(
        domain: &str,
        records: Vec<String>,
        parsed: Option<P>,
        found: bool,
        valid: bool,
        assessment: Assessment,
    ) -> Self {
        let (score, issues, recommendations) = assessment.into_parts();
        Self {
            domain: domain.to_string(),
            found,
            records,
            parsed,
            valid,
            issues,
            recommendations,
            score,
        }
    }

    pub fn has_issue_containing(&self, needle: &str) -> bool {
        self.issues.iter().any(|issue| issue.contains(needle))
    }

    pub fn has_recommendation_containing(&self, needle: &str) -> bool {
        self.recommendations.iter().any(|rec| rec.contains(needle))
    }
}
