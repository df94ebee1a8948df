use thiserror::Error;

/// Errors raised before any record is evaluated.
///
/// DNS and SMTP failures never surface here: they are folded into empty
/// answers or failed observations and scored like any other absence.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("domain IDNA conversion failed")]
    IdnaConversion {
        #[source]
        source: idna::Errors,
    },
    #[error("invalid domain {domain}: {}", .reasons.join(", "))]
    InvalidDomain {
        domain: String,
        reasons: Vec<String>,
    },
    #[error("unknown check '{name}' (expected spf, dmarc, dkim or connectivity)")]
    UnknownCheck { name: String },
    #[cfg(feature = "with-dns")]
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
}

impl AuditError {
    pub(crate) fn idna(source: idna::Errors) -> Self {
        Self::IdnaConversion { source }
    }

    pub(crate) fn invalid_domain(domain: impl Into<String>, reasons: Vec<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reasons,
        }
    }

    pub(crate) fn unknown_check(name: impl Into<String>) -> Self {
        Self::UnknownCheck { name: name.into() }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn resolver_init(source: trust_dns_resolver::error::ResolveError) -> Self {
        Self::ResolverInit { source }
    }
}
