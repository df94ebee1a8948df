//! MX presence and SMTP/TLS reachability scoring.
//!
//! [`evaluate_connectivity`] is pure: it scores MX records and an optional
//! [`SmtpObservation`] gathered by an [`SmtpProber`]. The bundled
//! [`TlsProber`] (feature `with-smtp-probe`) performs the blocking SMTP
//! dialogue.

#[cfg(feature = "with-smtp-probe")]
mod probe;
#[cfg(feature = "with-smtp-probe")]
mod session;

use std::time::Duration;

use tracing::debug;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::auth::{Assessment, EvaluationResult};

#[cfg(feature = "with-smtp-probe")]
pub use probe::TlsProber;

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Raw facts reported by an SMTP probe; scoring happens elsewhere.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpObservation {
    pub host: String,
    pub connected: bool,
    pub banner: Option<String>,
    pub extensions: Vec<String>,
    /// STARTTLS advertised in the EHLO reply.
    pub supports_starttls: bool,
    /// A TLS session was established (STARTTLS upgrade or implicit TLS on 465).
    pub supports_tls: bool,
    pub auth_methods: Vec<String>,
    pub submission_open: bool,
    pub error: Option<String>,
}

impl SmtpObservation {
    pub fn unreachable(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn supports_auth(&self) -> bool {
        !self.auth_methods.is_empty()
    }
}

/// Capability that dials a mail exchanger and reports what it saw.
///
/// Implementations block; async callers run them on the blocking pool.
/// Failures are reported through [`SmtpObservation::error`], never panics.
pub trait SmtpProber: Send + Sync {
    fn probe(&self, host: &str, timeout: Duration) -> SmtpObservation;
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityDetails {
    pub mx_records: Vec<MxRecord>,
    pub primary_mx: Option<String>,
    pub observation: Option<SmtpObservation>,
}

pub type ConnectivityReport = EvaluationResult<ConnectivityDetails>;

/// Score `mx_records` and, when a probe ran, what it observed.
pub fn evaluate_connectivity(
    domain: &str,
    mut mx_records: Vec<MxRecord>,
    observation: Option<SmtpObservation>,
) -> ConnectivityReport {
    mx_records.sort();
    mx_records.dedup();
    let primary_mx = mx_records.first().map(|mx| mx.exchange.clone());
    let records: Vec<String> = mx_records
        .iter()
        .map(|mx| format!("{} {}", mx.preference, mx.exchange))
        .collect();

    let Some(primary) = primary_mx.clone() else {
        debug!(domain, "no MX records");
        let details = ConnectivityDetails {
            mx_records,
            primary_mx: None,
            observation: None,
        };
        return ConnectivityReport::assemble(
            domain,
            records,
            Some(details),
            false,
            false,
            missing_mx(),
        );
    };

    let assessment: Assessment = [
        score_mx(mx_records.len()),
        observation
            .as_ref()
            .map(|observation| score_observation(&primary, observation))
            .unwrap_or_default(),
    ]
    .into_iter()
    .sum();

    let valid = observation
        .as_ref()
        .is_none_or(|observation| observation.connected);
    let details = ConnectivityDetails {
        mx_records,
        primary_mx,
        observation,
    };
    ConnectivityReport::assemble(domain, records, Some(details), true, valid, assessment)
}

fn missing_mx() -> Assessment {
    Assessment::issue("No MX records found").with_recommendations([
        "Configure MX records to enable mail delivery",
        "Ensure MX records point to valid mail servers",
        "Consider using multiple MX records for redundancy",
    ])
}

fn score_mx(count: usize) -> Assessment {
    let assessment = Assessment::points(20);
    if count > 1 {
        assessment
            .with_points(10)
            .with_recommendation("Good: Multiple MX records configured for redundancy")
    } else {
        assessment
    }
}

fn score_observation(primary: &str, observation: &SmtpObservation) -> Assessment {
    if !observation.connected {
        return Assessment::issue(format!("Cannot connect to primary MX server: {primary}"))
            .with_recommendations([
                "Verify mail server is running and accessible",
                "Check firewall rules for SMTP ports (25, 587, 465)",
                "Ensure DNS resolution is working correctly",
            ]);
    }

    let tls = if observation.supports_tls {
        Assessment::points(20)
    } else if observation.supports_starttls {
        Assessment::points(15).with_recommendation("Consider enabling implicit TLS on port 465")
    } else {
        Assessment::issue("No TLS support detected")
            .with_recommendation("Enable TLS/STARTTLS for secure mail transmission")
    };

    let mut assessment = Assessment::points(30).merge(tls);
    if observation.supports_auth() {
        assessment = assessment.with_points(5);
    }
    if observation.submission_open {
        assessment = assessment.with_points(5);
    }
    assessment
}
