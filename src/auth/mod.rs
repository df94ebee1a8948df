//! Record parsing and scoring for SPF, DMARC and DKIM.
//!
//! Every evaluator takes the raw TXT strings a resolver returned and produces
//! an [`EvaluationResult`]. Nothing here performs I/O: DKIM lookups go through
//! a caller-supplied probe closure, or arrive pre-collected as
//! [`SelectorProbe`] values.

mod dkim;
mod dmarc;
mod key;
mod scoring;
mod spf;
mod tags;
mod types;

pub use dkim::{
    DEFAULT_SELECTORS, DkimSelectors, ParsedDkimKey, ProbeOutcome, SelectorProbe, SelectorReport,
    SelectorStatus, default_selectors,
};
pub use dmarc::{AlignmentMode, DmarcPolicy, ParsedDmarc};
pub use key::{
    KeyMaterialError, KeySizeSource, KeyStrength, MIN_KEY_BYTES, decode_key_material,
    estimate_rsa_bits, rsa_key_strength,
};
pub use scoring::Assessment;
pub use spf::{MechanismKind, ParsedSpf, SpfQualifier, SpfTerm};
pub use tags::{Delimiter, TagMap, parse_tags};
pub use types::{DkimReport, DmarcReport, EvaluationResult, SpfReport};

/// Evaluate the apex TXT strings of `domain` as an SPF policy.
pub fn evaluate_spf(domain: &str, txt_records: &[String]) -> SpfReport {
    spf::evaluate(domain, txt_records)
}

/// Evaluate the TXT strings found at `_dmarc.<domain>`.
pub fn evaluate_dmarc(domain: &str, txt_records: &[String]) -> DmarcReport {
    dmarc::evaluate(domain, txt_records)
}

/// Probe each selector through `probe` and score the keys found.
///
/// `probe` receives the bare selector name and returns the TXT strings of
/// `<selector>._domainkey.<domain>`, empty when the lookup failed.
pub fn evaluate_dkim<F>(domain: &str, selectors: &[String], probe: F) -> DkimReport
where
    F: FnMut(&str) -> Vec<String>,
{
    dkim::evaluate(domain, selectors, probe)
}

/// Score selector probes gathered by the caller, in the order given.
pub fn evaluate_dkim_probes(domain: &str, probes: Vec<SelectorProbe>) -> DkimReport {
    dkim::evaluate_probes(domain, probes)
}

#[cfg(test)]
mod tests;
