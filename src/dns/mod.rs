//! DNS collaborator (feature `with-dns`).
//!
//! Lookups never fail from the caller's point of view: NXDOMAIN, timeouts,
//! SERVFAIL and undecodable answers all come back as an empty answer, which
//! the evaluators score as "record absent".

use std::future::Future;

use tracing::{debug, warn};
use trust_dns_resolver::{
    TokioAsyncResolver,
    error::{ResolveError, ResolveErrorKind},
    proto::rr::rdata::TXT,
};

use crate::{AuditError, connectivity::MxRecord};

/// Asynchronous TXT/MX lookups.
pub trait DnsLookup: Send + Sync {
    /// TXT strings at `name`, the character-strings of each RR concatenated.
    fn lookup_txt(&self, name: &str) -> impl Future<Output = Vec<String>> + Send;

    fn lookup_mx(&self, name: &str) -> impl Future<Output = Vec<MxRecord>> + Send;
}

/// [`DnsLookup`] backed by the system resolver configuration.
#[derive(Clone)]
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn from_system_conf() -> Result<Self, AuditError> {
        let inner =
            TokioAsyncResolver::tokio_from_system_conf().map_err(AuditError::resolver_init)?;
        Ok(Self { inner })
    }

    pub fn new(inner: TokioAsyncResolver) -> Self {
        Self { inner }
    }
}

impl DnsLookup for SystemResolver {
    async fn lookup_txt(&self, name: &str) -> Vec<String> {
        match self.inner.txt_lookup(name).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup.iter().map(join_txt).collect();
                debug!(name, count = records.len(), "TXT lookup");
                records
            }
            Err(err) => {
                log_failure("TXT", name, &err);
                Vec::new()
            }
        }
    }

    async fn lookup_mx(&self, name: &str) -> Vec<MxRecord> {
        match self.inner.mx_lookup(name).await {
            Ok(lookup) => lookup
                .iter()
                .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8())))
                .collect(),
            Err(err) => {
                log_failure("MX", name, &err);
                Vec::new()
            }
        }
    }
}

fn join_txt(txt: &TXT) -> String {
    txt.txt_data()
        .iter()
        .map(|piece| String::from_utf8_lossy(piece))
        .collect()
}

fn log_failure(kind: &str, name: &str, err: &ResolveError) {
    if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
        debug!(name, "no {kind} records");
    } else {
        warn!(name, error = %err, "{kind} lookup failed, treating as empty");
    }
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}
