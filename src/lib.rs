#![forbid(unsafe_code)]
//! mailposture — SPF/DMARC/DKIM record parsing and email-authentication scoring.
//!
//! The `auth` evaluators are pure functions over raw TXT strings. With the
//! `with-dns` feature, [`Auditor`] resolves the records itself and runs every
//! check for a domain under one deadline.

pub mod auth;
mod check;
pub mod connectivity;
mod domain;
mod error;

#[cfg(feature = "with-dns")]
pub mod audit;
#[cfg(feature = "with-dns")]
pub mod dns;

pub use auth::{
    Assessment, DkimReport, DkimSelectors, DmarcPolicy, DmarcReport, EvaluationResult,
    KeySizeSource, KeyStrength, ParsedDkimKey, ParsedDmarc, ParsedSpf, ProbeOutcome,
    SelectorProbe, SelectorReport, SelectorStatus, SpfQualifier, SpfReport, default_selectors,
    evaluate_dkim, evaluate_dkim_probes, evaluate_dmarc, evaluate_spf,
};
pub use check::Check;
pub use connectivity::{
    ConnectivityDetails, ConnectivityReport, MxRecord, SmtpObservation, SmtpProber,
    evaluate_connectivity,
};
pub use domain::{fqdn, normalize_domain};
pub use error::AuditError;

#[cfg(feature = "with-dns")]
pub use audit::{AuditOptions, Auditor, DomainAudit};
#[cfg(feature = "with-dns")]
pub use dns::{DnsLookup, SystemResolver};
#[cfg(feature = "with-smtp-probe")]
pub use connectivity::TlsProber;
