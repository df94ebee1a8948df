use std::net::{Ipv4Addr, Ipv6Addr};

use phf::phf_set;
use tracing::debug;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use super::{scoring::Assessment, tags::starts_with_ignore_ascii_case, types::SpfReport};

const RECORD_FOUND_POINTS: i32 = 30;
const LOOKUP_LIMIT: usize = 10;
const LOOKUP_WARNING_THRESHOLD: usize = 8;
const MAX_RECORD_LENGTH: usize = 255;

/// Include targets of well-known mail providers.
const TRUSTED_INCLUDES: phf::Set<&'static str> = phf_set! {
    "_spf.google.com",
    "spf.protection.outlook.com",
    "include.mailgun.org",
    "servers.mcsv.net",
    "_spf.salesforce.com",
};

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpfQualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl SpfQualifier {
    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(Self::Pass),
            '-' => Some(Self::Fail),
            '~' => Some(Self::SoftFail),
            '?' => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Pass => '+',
            Self::Fail => '-',
            Self::SoftFail => '~',
            Self::Neutral => '?',
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismKind {
    All,
    Include,
    A,
    Mx,
    Ptr,
    Ip4,
    Ip6,
    Exists,
    Redirect,
    Explanation,
    Unknown,
}

impl MechanismKind {
    fn from_name(name: &str) -> Self {
        match name {
            "all" => Self::All,
            "include" => Self::Include,
            "a" => Self::A,
            "mx" => Self::Mx,
            "ptr" => Self::Ptr,
            "ip4" => Self::Ip4,
            "ip6" => Self::Ip6,
            "exists" => Self::Exists,
            "redirect" => Self::Redirect,
            "exp" => Self::Explanation,
            _ => Self::Unknown,
        }
    }

    /// Terms counted against the 10-lookup budget. `ptr` and `redirect=` are
    /// reported through their own rules and stay out of the count.
    pub fn costs_lookup(self) -> bool {
        matches!(self, Self::Include | Self::A | Self::Mx | Self::Exists)
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfTerm {
    pub raw: String,
    pub qualifier: SpfQualifier,
    pub kind: MechanismKind,
    pub value: Option<String>,
}

impl SpfTerm {
    fn classify(token: &str) -> Self {
        let (qualifier, body) = match token.chars().next().and_then(SpfQualifier::from_symbol) {
            Some(qualifier) => (qualifier, &token[1..]),
            None => (SpfQualifier::Pass, token),
        };
        let split = body.find([':', '/', '=']).unwrap_or(body.len());
        let name = body[..split].to_ascii_lowercase();
        let rest = &body[split..];
        let value = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('='))
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Self {
            raw: token.to_string(),
            qualifier,
            kind: MechanismKind::from_name(&name),
            value,
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpf {
    pub version: String,
    pub mechanisms: Vec<String>,
    pub terms: Vec<SpfTerm>,
    pub includes: Vec<String>,
    pub redirect: Option<String>,
    pub all_mechanism: Option<String>,
    pub includes_all: bool,
    pub dns_lookups: usize,
}

impl ParsedSpf {
    pub fn parse(record: &str) -> Self {
        let mut tokens = record.split_whitespace();
        let version = tokens.next().unwrap_or_default().to_string();

        let terms: Vec<SpfTerm> = tokens.map(SpfTerm::classify).collect();
        let mechanisms = terms.iter().map(|term| term.raw.clone()).collect();
        let includes = terms
            .iter()
            .filter(|term| term.kind == MechanismKind::Include)
            .filter_map(|term| term.value.clone())
            .collect();
        let redirect = terms
            .iter()
            .find(|term| term.kind == MechanismKind::Redirect)
            .and_then(|term| term.value.clone());
        // first `all` wins, later ones are never reached by a receiver
        let all_mechanism = terms
            .iter()
            .find(|term| term.kind == MechanismKind::All)
            .map(|term| format!("{}all", term.qualifier.symbol()));
        let dns_lookups = terms
            .iter()
            .filter(|term| term.kind.costs_lookup())
            .count();

        Self {
            version,
            mechanisms,
            includes,
            redirect,
            includes_all: all_mechanism.is_some(),
            all_mechanism,
            dns_lookups,
            terms,
        }
    }

    pub fn has_valid_version(&self) -> bool {
        self.version.eq_ignore_ascii_case("v=spf1")
    }

    pub fn all_qualifier(&self) -> Option<SpfQualifier> {
        self.terms
            .iter()
            .find(|term| term.kind == MechanismKind::All)
            .map(|term| term.qualifier)
    }

    fn has_kind(&self, kind: MechanismKind) -> bool {
        self.terms.iter().any(|term| term.kind == kind)
    }
}

pub(crate) fn evaluate(domain: &str, records: &[String]) -> SpfReport {
    let candidates: Vec<String> = records
        .iter()
        .map(|record| record.trim())
        .filter(|trimmed| starts_with_ignore_ascii_case(trimmed, "v=spf1"))
        .map(str::to_string)
        .collect();

    let Some(record) = candidates.first().cloned() else {
        debug!(domain, "no SPF record among {} TXT strings", records.len());
        return SpfReport::assemble(domain, Vec::new(), None, false, false, missing_record());
    };
    if candidates.len() > 1 {
        debug!(domain, count = candidates.len(), "multiple SPF records, evaluating the first");
    }

    let parsed = ParsedSpf::parse(&record);
    let assessment: Assessment = [
        check_multiple_records(candidates.len()),
        Assessment::points(RECORD_FOUND_POINTS),
        check_version(&parsed),
        score_all_mechanism(&parsed),
        score_lookup_limit(parsed.dns_lookups),
        score_mechanisms(&parsed),
        score_trusted_includes(&parsed),
        check_record_length(&record),
        check_deprecated_mechanisms(&parsed),
        check_ip_literals(&parsed),
    ]
    .into_iter()
    .sum();

    let valid = parsed.has_valid_version()
        && parsed.includes_all
        && parsed.dns_lookups <= LOOKUP_LIMIT;

    SpfReport::assemble(domain, candidates, Some(parsed), true, valid, assessment)
}

fn missing_record() -> Assessment {
    Assessment::issue("No SPF record found").with_recommendations([
        "Create an SPF record to specify authorized mail servers",
        "Start with \"v=spf1 include:_spf.google.com ~all\" if using Google Workspace",
        "Use \"v=spf1 mx ~all\" if mail is sent from MX servers only",
        "Always end with an \"all\" mechanism",
    ])
}

fn check_multiple_records(count: usize) -> Assessment {
    if count > 1 {
        Assessment::issue("Multiple SPF records found (RFC violation)")
            .with_recommendation("Consolidate into a single SPF record")
    } else {
        Assessment::none()
    }
}

fn check_version(parsed: &ParsedSpf) -> Assessment {
    if parsed.has_valid_version() {
        Assessment::none()
    } else {
        Assessment::issue(format!("Invalid SPF version token: {}", parsed.version))
    }
}

fn score_all_mechanism(parsed: &ParsedSpf) -> Assessment {
    match parsed.all_qualifier() {
        None => Assessment::issue("No \"all\" mechanism found")
            .with_recommendation("Add an \"all\" mechanism (e.g., \"-all\", \"~all\")"),
        Some(SpfQualifier::Fail) => Assessment::points(40),
        Some(SpfQualifier::SoftFail) => Assessment::points(25)
            .with_recommendation("Consider upgrading to \"-all\" for stricter policy"),
        Some(SpfQualifier::Pass) => Assessment::points(5)
            .with_issue("\"+all\" allows any server to send mail")
            .with_recommendation("Change \"+all\" to \"~all\" or \"-all\""),
        Some(SpfQualifier::Neutral) => Assessment::points(10)
            .with_recommendation("Consider changing \"?all\" to \"~all\" or \"-all\""),
    }
}

fn score_lookup_limit(lookups: usize) -> Assessment {
    if lookups > LOOKUP_LIMIT {
        Assessment::issue(format!(
            "Too many DNS lookups ({lookups}/{LOOKUP_LIMIT} limit)"
        ))
        .with_recommendation("Reduce DNS lookups to stay under RFC limit")
    } else if lookups > LOOKUP_WARNING_THRESHOLD {
        Assessment::recommend("Close to DNS lookup limit, consider optimization")
    } else {
        Assessment::points(10)
    }
}

fn score_mechanisms(parsed: &ParsedSpf) -> Assessment {
    let mut assessment = Assessment::none();
    if parsed.has_kind(MechanismKind::Mx) {
        assessment = assessment.with_points(5);
    }
    if !parsed.includes.is_empty() {
        assessment = assessment.with_points(10);
    }
    assessment
}

fn score_trusted_includes(parsed: &ParsedSpf) -> Assessment {
    let trusted = parsed.includes.iter().any(|include| {
        let normalized = include.trim_end_matches('.').to_ascii_lowercase();
        TRUSTED_INCLUDES.contains(normalized.as_str())
    });
    if trusted {
        Assessment::points(5)
    } else {
        Assessment::none()
    }
}

fn check_record_length(record: &str) -> Assessment {
    if record.len() > MAX_RECORD_LENGTH {
        Assessment::issue(format!(
            "SPF record exceeds {MAX_RECORD_LENGTH} character limit"
        ))
    } else {
        Assessment::none()
    }
}

fn check_deprecated_mechanisms(parsed: &ParsedSpf) -> Assessment {
    parsed
        .terms
        .iter()
        .filter(|term| term.kind == MechanismKind::Ptr)
        .map(|term| {
            Assessment::issue(format!("Deprecated mechanism found: {}", term.raw))
                .with_recommendation("Remove deprecated \"ptr\" mechanism")
        })
        .sum()
}

fn check_ip_literals(parsed: &ParsedSpf) -> Assessment {
    parsed
        .terms
        .iter()
        .filter(|term| match term.kind {
            MechanismKind::Ip4 => !is_valid_network::<Ipv4Addr>(term.value.as_deref(), 32),
            MechanismKind::Ip6 => !is_valid_network::<Ipv6Addr>(term.value.as_deref(), 128),
            _ => false,
        })
        .map(|term| Assessment::issue(format!("Invalid IP network in mechanism: {}", term.raw)))
        .sum()
}

fn is_valid_network<A: std::str::FromStr>(value: Option<&str>, max_prefix: u8) -> bool {
    let Some(value) = value else {
        return false;
    };
    let (address, prefix) = match value.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (value, None),
    };
    if address.parse::<A>().is_err() {
        return false;
    }
    match prefix {
        None => true,
        Some(prefix) => prefix
            .parse::<u8>()
            .map(|bits| bits <= max_prefix)
            .unwrap_or(false),
    }
}
