use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use super::{
    scoring::Assessment,
    tags::{Delimiter, TagMap, parse_tags, starts_with_ignore_ascii_case},
    types::DmarcReport,
};

const DEFAULT_PERCENTAGE: u8 = 100;
const DEFAULT_REPORT_INTERVAL: u32 = 86_400;

static REPORT_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(mailto:[^@\s,;!]+@[^@\s,;!]+|https://[^\s,;!]+)(![0-9]+[kmgt]?)?$")
        .expect("report URI pattern compiles")
});

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmarcPolicy {
    None,
    Quarantine,
    Reject,
}

impl DmarcPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "quarantine" => Some(Self::Quarantine),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Quarantine => "quarantine",
            Self::Reject => "reject",
        }
    }

    pub fn is_enforcing(self) -> bool {
        matches!(self, Self::Quarantine | Self::Reject)
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentMode {
    #[default]
    Relaxed,
    Strict,
}

impl AlignmentMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "r" => Some(Self::Relaxed),
            "s" => Some(Self::Strict),
            _ => None,
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDmarc {
    pub version: Option<String>,
    pub policy: Option<String>,
    pub subdomain_policy: Option<String>,
    pub percentage: u8,
    pub rua: Vec<String>,
    pub ruf: Vec<String>,
    pub alignment_spf: AlignmentMode,
    pub alignment_dkim: AlignmentMode,
    pub report_interval: u32,
    pub failure_options: Option<String>,
    /// `tag=value` pairs whose value could not be interpreted; defaults apply.
    pub malformed: Vec<String>,
}

impl ParsedDmarc {
    pub fn parse(record: &str) -> Self {
        let tags = parse_tags(record, Delimiter::Semicolon);
        let mut malformed = Vec::new();

        let percentage = match tags.get("pct") {
            None => DEFAULT_PERCENTAGE,
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if value <= 100 => value as u8,
                Ok(_) => {
                    malformed.push(format!("pct={raw} (expected 0-100)"));
                    DEFAULT_PERCENTAGE
                }
                Err(_) => {
                    malformed.push(format!("pct={raw} (not a number)"));
                    DEFAULT_PERCENTAGE
                }
            },
        };

        let alignment_spf = alignment(&tags, "aspf", &mut malformed);
        let alignment_dkim = alignment(&tags, "adkim", &mut malformed);

        let report_interval = match tags.get("ri") {
            None => DEFAULT_REPORT_INTERVAL,
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                malformed.push(format!("ri={raw} (not a number)"));
                DEFAULT_REPORT_INTERVAL
            }),
        };

        if let Some(sp) = tags.get("sp") {
            if DmarcPolicy::parse(sp).is_none() {
                malformed.push(format!("sp={sp} (unknown policy)"));
            }
        }

        let rua = report_uris(&tags, "rua", &mut malformed);
        let ruf = report_uris(&tags, "ruf", &mut malformed);

        Self {
            version: tags.get("v").map(str::to_string),
            policy: tags.get("p").map(str::to_string),
            subdomain_policy: tags.get("sp").map(str::to_string),
            percentage,
            rua,
            ruf,
            alignment_spf,
            alignment_dkim,
            report_interval,
            failure_options: tags.get("fo").map(str::to_string),
            malformed,
        }
    }

    /// `v` must match `DMARC1` exactly (RFC 7489, 6.3).
    pub fn has_valid_version(&self) -> bool {
        self.version.as_deref() == Some("DMARC1")
    }

    pub fn policy_kind(&self) -> Option<DmarcPolicy> {
        self.policy.as_deref().and_then(DmarcPolicy::parse)
    }
}

fn alignment(tags: &TagMap, tag: &str, malformed: &mut Vec<String>) -> AlignmentMode {
    match tags.get(tag) {
        None => AlignmentMode::default(),
        Some(raw) => AlignmentMode::parse(raw).unwrap_or_else(|| {
            malformed.push(format!("{tag}={raw} (expected r or s)"));
            AlignmentMode::default()
        }),
    }
}

fn report_uris(tags: &TagMap, tag: &str, malformed: &mut Vec<String>) -> Vec<String> {
    let Some(raw) = tags.get(tag) else {
        return Vec::new();
    };
    let uris: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
        .collect();
    for uri in &uris {
        if !REPORT_URI.is_match(uri) {
            malformed.push(format!("{tag}={uri} (not a mailto: or https: URI)"));
        }
    }
    uris
}

pub(crate) fn evaluate(domain: &str, records: &[String]) -> DmarcReport {
    let candidates: Vec<String> = records
        .iter()
        .map(|record| record.trim())
        .filter(|trimmed| starts_with_ignore_ascii_case(trimmed, "v=DMARC1"))
        .map(str::to_string)
        .collect();

    let Some(record) = candidates.first().cloned() else {
        debug!(domain, "no DMARC record");
        return DmarcReport::assemble(domain, Vec::new(), None, false, false, missing_record(domain));
    };

    let parsed = ParsedDmarc::parse(&record);
    let assessment: Assessment = [
        check_multiple_records(candidates.len()),
        validate_version(&parsed),
        score_policy(&parsed),
        score_subdomain_policy(&parsed),
        score_percentage(&parsed),
        check_reporting_addresses(&parsed),
        check_alignment(&parsed),
        check_enforcement_reporting(&parsed),
        check_malformed_tags(&parsed),
    ]
    .into_iter()
    .sum();

    let valid =
        parsed.has_valid_version() && parsed.policy_kind().is_some() && parsed.percentage > 0;

    DmarcReport::assemble(domain, candidates, Some(parsed), true, valid, assessment)
}

fn missing_record(domain: &str) -> Assessment {
    Assessment::issue("No DMARC record found").with_recommendations([
        format!("Create a DMARC record at _dmarc.{domain}"),
        "Start with a policy of \"none\" for monitoring".to_string(),
        "Configure reporting addresses (rua/ruf)".to_string(),
        "Gradually move to \"quarantine\" then \"reject\" policy".to_string(),
    ])
}

fn check_multiple_records(count: usize) -> Assessment {
    if count > 1 {
        Assessment::issue("Multiple DMARC records found (RFC violation)")
            .with_recommendation("Publish a single DMARC record")
    } else {
        Assessment::none()
    }
}

fn validate_version(parsed: &ParsedDmarc) -> Assessment {
    if parsed.has_valid_version() {
        Assessment::points(20)
    } else {
        Assessment::issue(format!(
            "Invalid DMARC version: {}",
            parsed.version.as_deref().unwrap_or("")
        ))
    }
}

fn score_policy(parsed: &ParsedDmarc) -> Assessment {
    let Some(raw) = parsed.policy.as_deref().filter(|p| !p.is_empty()) else {
        return Assessment::issue("Missing policy (p) tag");
    };
    match DmarcPolicy::parse(raw) {
        Some(DmarcPolicy::None) => Assessment::points(10)
            .with_recommendation("Consider upgrading policy to \"quarantine\" or \"reject\""),
        Some(DmarcPolicy::Quarantine) => Assessment::points(25)
            .with_recommendation("Consider upgrading policy to \"reject\" for maximum protection"),
        Some(DmarcPolicy::Reject) => Assessment::points(40),
        None => Assessment::issue(format!("Invalid policy value: {raw}")),
    }
}

fn score_subdomain_policy(parsed: &ParsedDmarc) -> Assessment {
    match parsed.subdomain_policy.as_deref() {
        Some(sp) if !sp.is_empty() => Assessment::points(5),
        _ => Assessment::none(),
    }
}

fn score_percentage(parsed: &ParsedDmarc) -> Assessment {
    match parsed.percentage {
        100 => Assessment::points(15),
        0 => Assessment::issue("Percentage set to 0%"),
        _ => Assessment::points(10)
            .with_recommendation("Consider increasing percentage to 100% for full coverage"),
    }
}

fn check_reporting_addresses(parsed: &ParsedDmarc) -> Assessment {
    let aggregate = if parsed.rua.is_empty() {
        Assessment::recommend("Add aggregate reporting address (rua)")
    } else {
        Assessment::points(10)
    };
    let forensic = if parsed.ruf.is_empty() {
        Assessment::recommend("Consider adding forensic reporting address (ruf)")
    } else {
        Assessment::points(5)
    };
    aggregate.merge(forensic)
}

fn check_alignment(parsed: &ParsedDmarc) -> Assessment {
    let mut assessment = Assessment::none();
    if parsed.alignment_spf == AlignmentMode::Strict {
        assessment = assessment.with_points(5);
    }
    if parsed.alignment_dkim == AlignmentMode::Strict {
        assessment = assessment.with_points(5);
    }
    assessment
}

fn check_enforcement_reporting(parsed: &ParsedDmarc) -> Assessment {
    let enforcing = parsed
        .policy_kind()
        .map(DmarcPolicy::is_enforcing)
        .unwrap_or(false);
    if enforcing && parsed.rua.is_empty() {
        Assessment::issue("No aggregate reporting address for an enforcing policy")
            .with_recommendation("Reporting addresses are crucial for quarantine/reject policies")
    } else {
        Assessment::none()
    }
}

fn check_malformed_tags(parsed: &ParsedDmarc) -> Assessment {
    parsed
        .malformed
        .iter()
        .map(|entry| Assessment::issue(format!("Malformed DMARC tag: {entry}")))
        .sum()
}
