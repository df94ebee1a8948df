use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::{Check, auth::default_selectors};

/// Controls what [`Auditor::audit`](super::Auditor::audit) runs and how long it may take.
///
/// Deserialises from a JSON object whose keys match the field names; missing
/// keys keep their default.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    dkim_selectors: Vec<String>,
    max_concurrent_probes: usize,
    probe_timeout_ms: u64,
    deadline_ms: u64,
    checks: Vec<Check>,
    probe_smtp: bool,
    smtp_timeout_ms: u64,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            dkim_selectors: default_selectors(),
            max_concurrent_probes: 4,
            probe_timeout_ms: 5_000,
            deadline_ms: 30_000,
            checks: Check::all(),
            probe_smtp: false,
            smtp_timeout_ms: 10_000,
        }
    }
}

impl AuditOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration, then normalise it like the builder does.
    #[cfg(feature = "with-serde")]
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut parsed: Self = serde_json::from_str(raw)?;
        let selectors = std::mem::take(&mut parsed.dkim_selectors);
        let checks = std::mem::take(&mut parsed.checks);
        let concurrency = parsed.max_concurrent_probes;
        Ok(parsed
            .with_dkim_selectors(selectors)
            .with_checks(checks)
            .with_max_concurrent_probes(concurrency))
    }

    /// Probe `selector` in addition to the ones already configured.
    pub fn with_dkim_selector(mut self, selector: impl Into<String>) -> Self {
        if let Some(normalized) = normalize_selector(selector.into()) {
            if !self.dkim_selectors.contains(&normalized) {
                self.dkim_selectors.push(normalized);
            }
        }
        self
    }

    pub fn with_dkim_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for selector in selectors {
            self = self.with_dkim_selector(selector);
        }
        self
    }

    /// Drop the configured selectors (defaults included) and use `selectors`.
    pub fn replace_dkim_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dkim_selectors.clear();
        self.with_dkim_selectors(selectors)
    }

    pub fn with_max_concurrent_probes(mut self, value: usize) -> Self {
        self.max_concurrent_probes = value.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = duration_ms(deadline);
        self
    }

    pub fn with_checks<I>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = Check>,
    {
        let mut checks: Vec<Check> = checks.into_iter().collect();
        checks.sort();
        checks.dedup();
        self.checks = checks;
        self
    }

    pub fn with_smtp_probe(mut self, enabled: bool) -> Self {
        self.probe_smtp = enabled;
        self
    }

    pub fn with_smtp_timeout(mut self, timeout: Duration) -> Self {
        self.smtp_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn dkim_selectors(&self) -> &[String] {
        &self.dkim_selectors
    }

    pub fn max_concurrent_probes(&self) -> usize {
        self.max_concurrent_probes.max(1)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn runs(&self, check: Check) -> bool {
        self.checks.contains(&check)
    }

    pub fn probe_smtp(&self) -> bool {
        self.probe_smtp
    }

    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_millis(self.smtp_timeout_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn normalize_selector(input: String) -> Option<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = AuditOptions::default();
        assert_eq!(options.dkim_selectors().len(), 10);
        assert_eq!(options.max_concurrent_probes(), 4);
        assert_eq!(options.probe_timeout(), Duration::from_secs(5));
        assert_eq!(options.deadline(), Duration::from_secs(30));
        assert_eq!(options.checks(), Check::ALL.as_slice());
        assert!(!options.probe_smtp());
    }

    #[test]
    fn selectors_are_normalised_and_deduplicated() {
        let options = AuditOptions::new()
            .replace_dkim_selectors(["  Custom. ", "custom", "", "s2048"])
            .with_dkim_selector("GOOGLE");
        assert_eq!(options.dkim_selectors(), ["custom", "s2048", "google"]);
    }

    #[test]
    fn extra_selector_keeps_defaults() {
        let options = AuditOptions::new().with_dkim_selector("mandrill");
        assert_eq!(options.dkim_selectors().len(), 11);
        assert_eq!(options.dkim_selectors().last().map(String::as_str), Some("mandrill"));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(AuditOptions::new().with_max_concurrent_probes(0).max_concurrent_probes(), 1);
    }

    #[cfg(feature = "with-serde")]
    #[test]
    fn json_config_with_partial_keys() {
        let options = AuditOptions::from_json(
            r#"{"dkim_selectors": ["Mail", "mail", "k3"], "checks": ["dkim", "spf", "dkim"], "deadline_ms": 1500}"#,
        )
        .expect("valid config");
        assert_eq!(options.dkim_selectors(), ["mail", "k3"]);
        assert_eq!(options.checks(), [Check::Spf, Check::Dkim]);
        assert_eq!(options.deadline(), Duration::from_millis(1500));
        assert_eq!(options.probe_timeout(), Duration::from_secs(5));
    }

    #[cfg(feature = "with-serde")]
    #[test]
    fn json_config_rejects_unknown_check() {
        assert!(AuditOptions::from_json(r#"{"checks": ["bimi"]}"#).is_err());
    }
}
