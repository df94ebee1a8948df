use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::{
    Check,
    auth::{DkimReport, DmarcReport, SpfReport},
    connectivity::ConnectivityReport,
};

/// Everything one audit produced. Checks that were skipped or did not finish
/// before the deadline are `None`; the latter are also listed in `timed_out`.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DomainAudit {
    pub domain: String,
    pub spf: Option<SpfReport>,
    pub dmarc: Option<DmarcReport>,
    pub dkim: Option<DkimReport>,
    pub connectivity: Option<ConnectivityReport>,
    pub timed_out: Vec<Check>,
    /// Mean of the finished checks' scores, one decimal; 0 when none finished.
    pub overall_score: f64,
    pub elapsed_ms: u64,
}

impl DomainAudit {
    pub(crate) fn new(
        domain: String,
        spf: Option<SpfReport>,
        dmarc: Option<DmarcReport>,
        dkim: Option<DkimReport>,
        connectivity: Option<ConnectivityReport>,
        timed_out: Vec<Check>,
        elapsed: Duration,
    ) -> Self {
        let mut audit = Self {
            domain,
            spf,
            dmarc,
            dkim,
            connectivity,
            timed_out,
            overall_score: 0.0,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        audit.overall_score = overall_score(&audit.scores());
        audit
    }

    /// `(check, score, valid)` for every finished check, in check order.
    pub fn scores(&self) -> Vec<(Check, i32, bool)> {
        let mut scores = Vec::new();
        if let Some(report) = &self.spf {
            scores.push((Check::Spf, report.score, report.valid));
        }
        if let Some(report) = &self.dmarc {
            scores.push((Check::Dmarc, report.score, report.valid));
        }
        if let Some(report) = &self.dkim {
            scores.push((Check::Dkim, report.score, report.valid));
        }
        if let Some(report) = &self.connectivity {
            scores.push((Check::Connectivity, report.score, report.valid));
        }
        scores
    }

    /// True when every finished check is valid and none timed out.
    pub fn is_valid(&self) -> bool {
        self.timed_out.is_empty() && self.scores().iter().all(|(_, _, valid)| *valid)
    }
}

fn overall_score(scores: &[(Check, i32, bool)]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: i64 = scores.iter().map(|(_, score, _)| i64::from(*score)).sum();
    let mean = total as f64 / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_is_rounded_to_one_decimal() {
        let scores = [
            (Check::Spf, 80, true),
            (Check::Dmarc, 45, true),
            (Check::Dkim, 0, false),
        ];
        assert_eq!(overall_score(&scores), 41.7);
    }

    #[test]
    fn nothing_finished_scores_zero() {
        assert_eq!(overall_score(&[]), 0.0);
    }
}
