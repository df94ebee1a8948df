use phf::phf_set;
use tracing::debug;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use super::{
    key::{KeyStrength, decode_key_material, rsa_key_strength},
    scoring::Assessment,
    tags::{Delimiter, parse_tags},
    types::DkimReport,
};

/// Selectors probed when the caller does not configure any.
pub const DEFAULT_SELECTORS: &[&str] = &[
    "default",
    "selector1",
    "selector2",
    "google",
    "mail",
    "k1",
    "k2",
    "s1",
    "s2",
    "dkim",
];

const WELL_KNOWN_ESP_SELECTORS: phf::Set<&'static str> = phf_set! {
    "google",
    "gmail",
};

/// Signing algorithms a verifier can use (RFC 6376, RFC 8463).
const KNOWN_KEY_ALGORITHMS: [&str; 2] = ["rsa", "ed25519"];

pub fn default_selectors() -> Vec<String> {
    DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect()
}

/// What a single `<selector>._domainkey.<domain>` lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Records(Vec<String>),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorProbe {
    pub selector: String,
    pub outcome: ProbeOutcome,
}

impl SelectorProbe {
    pub fn records(selector: impl Into<String>, records: Vec<String>) -> Self {
        Self {
            selector: selector.into(),
            outcome: ProbeOutcome::Records(records),
        }
    }

    pub fn timed_out(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            outcome: ProbeOutcome::TimedOut,
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDkimKey {
    pub version: Option<String>,
    pub algorithm: String,
    pub public_key: String,
    pub hash_algorithms: Vec<String>,
    pub service_types: Vec<String>,
    pub flags: Vec<String>,
}

impl ParsedDkimKey {
    pub fn parse(record: &str) -> Self {
        let tags = parse_tags(record, Delimiter::Semicolon);
        Self {
            version: tags.get("v").map(str::to_string),
            algorithm: tags
                .get("k")
                .filter(|k| !k.is_empty())
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "rsa".to_string()),
            public_key: tags
                .get("p")
                .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect())
                .unwrap_or_default(),
            hash_algorithms: list(tags.get("h")),
            service_types: list(tags.get("s")),
            flags: list(tags.get("t")),
        }
    }

    pub fn is_testing(&self) -> bool {
        self.flags.iter().any(|flag| flag == "y")
    }
}

fn list(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split([':', ','])
                .map(|item| item.trim().to_ascii_lowercase())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorStatus {
    Missing,
    TimedOut,
    Invalid,
    Valid,
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorReport {
    pub selector: String,
    pub status: SelectorStatus,
    pub record: Option<String>,
    pub key: Option<ParsedDkimKey>,
    pub key_length: Option<usize>,
    pub strength: Option<KeyStrength>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub score: i32,
}

impl SelectorReport {
    fn absent(selector: String, status: SelectorStatus) -> Self {
        Self {
            selector,
            status,
            record: None,
            key: None,
            key_length: None,
            strength: None,
            issues: Vec::new(),
            recommendations: Vec::new(),
            score: 0,
        }
    }

    fn assessment(&self) -> Assessment {
        Assessment::points(self.score)
            .with_recommendations(self.recommendations.iter().cloned())
            .merge(
                self.issues
                    .iter()
                    .map(|issue| Assessment::issue(issue.clone()))
                    .sum(),
            )
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkimSelectors {
    pub selectors_tested: Vec<String>,
    pub selectors_found: Vec<String>,
    pub valid_selectors: Vec<String>,
    pub selectors_timed_out: Vec<String>,
    pub selectors: Vec<SelectorReport>,
}

pub(crate) fn evaluate<F>(domain: &str, selectors: &[String], mut probe: F) -> DkimReport
where
    F: FnMut(&str) -> Vec<String>,
{
    let probes = selectors
        .iter()
        .map(|selector| SelectorProbe::records(selector.clone(), probe(selector)))
        .collect();
    evaluate_probes(domain, probes)
}

pub(crate) fn evaluate_probes(domain: &str, probes: Vec<SelectorProbe>) -> DkimReport {
    let reports: Vec<SelectorReport> = probes.into_iter().map(assess_selector).collect();

    let names_with = |status: SelectorStatus| -> Vec<String> {
        reports
            .iter()
            .filter(|report| report.status == status)
            .map(|report| report.selector.clone())
            .collect()
    };
    let valid_selectors = names_with(SelectorStatus::Valid);
    let selectors_timed_out = names_with(SelectorStatus::TimedOut);
    let selectors_found: Vec<String> = reports
        .iter()
        .filter(|report| matches!(report.status, SelectorStatus::Valid | SelectorStatus::Invalid))
        .map(|report| report.selector.clone())
        .collect();
    let records: Vec<String> = reports
        .iter()
        .filter_map(|report| report.record.clone())
        .collect();

    debug!(
        domain,
        found = selectors_found.len(),
        valid = valid_selectors.len(),
        timed_out = selectors_timed_out.len(),
        "dkim selectors assessed"
    );

    let per_selector: Assessment = reports
        .iter()
        .filter(|report| report.status != SelectorStatus::Missing)
        .map(SelectorReport::assessment)
        .sum();
    let assessment = per_selector.merge(aggregate(domain, &valid_selectors));

    let found = !selectors_found.is_empty();
    let valid = !valid_selectors.is_empty();
    let parsed = DkimSelectors {
        selectors_tested: reports.iter().map(|r| r.selector.clone()).collect(),
        selectors_found,
        valid_selectors,
        selectors_timed_out,
        selectors: reports,
    };

    DkimReport::assemble(domain, records, Some(parsed), found, valid, assessment)
}

fn aggregate(domain: &str, valid_selectors: &[String]) -> Assessment {
    if valid_selectors.is_empty() {
        return Assessment::issue("No valid DKIM selectors found").with_recommendations([
            "Implement DKIM signing for outgoing mail".to_string(),
            format!("Publish the public key at <selector>._domainkey.{domain}"),
            "Use RSA keys of at least 2048 bits".to_string(),
            "If a custom selector is in use, add it to the probed selector list".to_string(),
        ]);
    }

    let count = valid_selectors.len() as i32;
    let mut assessment = Assessment::points(50 + 10 * count);
    if valid_selectors
        .iter()
        .any(|selector| WELL_KNOWN_ESP_SELECTORS.contains(selector.as_str()))
    {
        assessment = assessment.with_points(5);
    }
    if valid_selectors.len() >= 2 {
        assessment = assessment
            .with_points(10)
            .with_recommendation("Good: multiple DKIM selectors published, supporting key rotation");
    }
    assessment
}

fn assess_selector(probe: SelectorProbe) -> SelectorReport {
    let SelectorProbe { selector, outcome } = probe;
    let records = match outcome {
        ProbeOutcome::TimedOut => {
            return SelectorReport::absent(selector, SelectorStatus::TimedOut);
        }
        ProbeOutcome::Records(records) => records,
    };

    let keyed: Vec<&str> = records
        .iter()
        .map(|record| record.trim())
        .filter(|record| parse_tags(record, Delimiter::Semicolon).contains("p"))
        .collect();
    let Some(record) = keyed.first().map(|record| record.to_string()) else {
        return SelectorReport::absent(selector, SelectorStatus::Missing);
    };

    let key = ParsedDkimKey::parse(&record);
    let mut notes = Assessment::none();
    if keyed.len() > 1 {
        notes = notes.with_issue(format!(
            "Selector {selector}: {} key records published, only one is used",
            keyed.len()
        ));
    }
    if let Some(version) = key.version.as_deref().filter(|v| *v != "DKIM1") {
        notes = notes.with_issue(format!("Selector {selector}: unexpected version v={version}"));
    }

    let decoded = match decode_key_material(&key.public_key) {
        Ok(decoded) => decoded,
        Err(err) => {
            let mut message = format!("Selector {selector}: {err}");
            if key.algorithm == "ed25519" {
                message.push_str("; publish an RSA key alongside the ed25519 one");
            }
            let notes = notes.with_issue(message);
            return finish(selector, SelectorStatus::Invalid, record, key, None, None, notes);
        }
    };

    if !KNOWN_KEY_ALGORITHMS.contains(&key.algorithm.as_str()) {
        let notes = notes.with_issue(format!(
            "Selector {selector}: unknown key algorithm k={}",
            key.algorithm
        ));
        let key_length = Some(decoded.len());
        return finish(selector, SelectorStatus::Invalid, record, key, key_length, None, notes);
    }

    let strength = (key.algorithm == "rsa").then(|| rsa_key_strength(&decoded));
    let assessment: Assessment = [
        notes,
        strength
            .map(|strength| score_strength(&selector, strength))
            .unwrap_or_default(),
        check_hash_algorithms(&selector, &key),
        check_service_types(&selector, &key),
        check_testing_flag(&selector, &key),
    ]
    .into_iter()
    .sum();

    finish(
        selector,
        SelectorStatus::Valid,
        record,
        key,
        Some(decoded.len()),
        strength,
        assessment,
    )
}

fn finish(
    selector: String,
    status: SelectorStatus,
    record: String,
    key: ParsedDkimKey,
    key_length: Option<usize>,
    strength: Option<KeyStrength>,
    assessment: Assessment,
) -> SelectorReport {
    let (score, issues, recommendations) = assessment.into_parts();
    SelectorReport {
        selector,
        status,
        record: Some(record),
        key: Some(key),
        key_length,
        strength,
        issues,
        recommendations,
        score,
    }
}

fn score_strength(selector: &str, strength: KeyStrength) -> Assessment {
    match strength.bits {
        bits if bits >= 2048 => Assessment::points(10),
        bits if bits >= 1024 => Assessment::points(5).with_recommendation(format!(
            "Selector {selector}: upgrade the {bits}-bit key to at least 2048 bits"
        )),
        bits => Assessment::issue(format!("Selector {selector}: weak {bits}-bit RSA key")),
    }
}

fn check_hash_algorithms(selector: &str, key: &ParsedDkimKey) -> Assessment {
    let sha1_only =
        !key.hash_algorithms.is_empty() && key.hash_algorithms.iter().all(|h| h == "sha1");
    if sha1_only {
        Assessment::issue(format!("Selector {selector}: key restricted to SHA-1 (h=sha1)"))
            .with_recommendation(format!("Selector {selector}: allow sha256 in the h= tag"))
    } else {
        Assessment::none()
    }
}

fn check_service_types(selector: &str, key: &ParsedDkimKey) -> Assessment {
    let usable = key.service_types.is_empty()
        || key
            .service_types
            .iter()
            .any(|service| service == "*" || service == "email");
    if usable {
        Assessment::none()
    } else {
        Assessment::issue(format!(
            "Selector {selector}: key not usable for email (s={})",
            key.service_types.join(":")
        ))
    }
}

fn check_testing_flag(selector: &str, key: &ParsedDkimKey) -> Assessment {
    if key.is_testing() {
        Assessment::recommend(format!(
            "Selector {selector} is in testing mode (t=y); remove the flag once signing is verified"
        ))
    } else {
        Assessment::none()
    }
}
