//! Per-domain orchestration (feature `with-dns`).
//!
//! [`Auditor::audit`] resolves the records each enabled [`Check`] needs, runs
//! the checks concurrently and folds whatever finished before the deadline
//! into a [`DomainAudit`].

mod options;
mod types;

use std::{future::Future, sync::Arc};

use futures::stream::{self, StreamExt};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::{
    AuditError, Check,
    auth::{
        DkimReport, DmarcReport, ProbeOutcome, SelectorProbe, SpfReport, evaluate_dkim_probes,
        evaluate_dmarc, evaluate_spf,
    },
    connectivity::{ConnectivityReport, SmtpObservation, SmtpProber, evaluate_connectivity},
    dns::{DnsLookup, SystemResolver},
    domain::{fqdn, normalize_domain},
};

pub use options::AuditOptions;
pub use types::DomainAudit;

/// Result of one check under the overall deadline.
enum Outcome<T> {
    Skipped,
    Finished(T),
    TimedOut,
}

impl<T> Outcome<T> {
    fn finished(self) -> Option<T> {
        match self {
            Self::Finished(value) => Some(value),
            Self::Skipped | Self::TimedOut => None,
        }
    }
}

async fn within<T>(check: Check, deadline: Instant, work: impl Future<Output = T>) -> Outcome<T> {
    match timeout_at(deadline, work).await {
        Ok(value) => Outcome::Finished(value),
        Err(_) => {
            warn!(%check, "deadline reached before the check finished");
            Outcome::TimedOut
        }
    }
}

pub struct Auditor<R> {
    resolver: R,
    prober: Option<Arc<dyn SmtpProber>>,
    options: AuditOptions,
}

impl Auditor<SystemResolver> {
    pub fn from_system_conf(options: AuditOptions) -> Result<Self, AuditError> {
        Ok(Self::new(SystemResolver::from_system_conf()?, options))
    }
}

impl<R> Auditor<R>
where
    R: DnsLookup,
{
    pub fn new(resolver: R, options: AuditOptions) -> Self {
        Self {
            resolver,
            prober: None,
            options,
        }
    }

    /// Attach the prober used when [`AuditOptions::probe_smtp`] is set.
    pub fn with_prober(mut self, prober: impl SmtpProber + 'static) -> Self {
        self.prober = Some(Arc::new(prober));
        self
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    pub async fn audit(&self, domain: &str) -> Result<DomainAudit, AuditError> {
        let ascii = normalize_domain(domain)?;
        let started = Instant::now();
        let deadline = started + self.options.deadline();
        debug!(domain = %ascii, checks = ?self.options.checks(), "audit started");

        let (spf, dmarc, dkim, connectivity) = tokio::join!(
            self.gated(Check::Spf, within(Check::Spf, deadline, self.spf(&ascii))),
            self.gated(Check::Dmarc, within(Check::Dmarc, deadline, self.dmarc(&ascii))),
            self.gated(Check::Dkim, async {
                Outcome::Finished(self.dkim(&ascii, deadline).await)
            }),
            self.gated(Check::Connectivity, self.connectivity(&ascii, deadline)),
        );

        let mut timed_out = Vec::new();
        for (check, expired) in [
            (Check::Spf, matches!(spf, Outcome::TimedOut)),
            (Check::Dmarc, matches!(dmarc, Outcome::TimedOut)),
            (Check::Dkim, matches!(dkim, Outcome::TimedOut)),
            (Check::Connectivity, matches!(connectivity, Outcome::TimedOut)),
        ] {
            if expired {
                timed_out.push(check);
            }
        }

        let audit = DomainAudit::new(
            ascii,
            spf.finished(),
            dmarc.finished(),
            dkim.finished(),
            connectivity.finished(),
            timed_out,
            started.elapsed(),
        );
        info!(
            domain = %audit.domain,
            overall = audit.overall_score,
            timed_out = audit.timed_out.len(),
            elapsed_ms = audit.elapsed_ms,
            "audit finished"
        );
        Ok(audit)
    }

    async fn gated<T>(&self, check: Check, work: impl Future<Output = Outcome<T>>) -> Outcome<T> {
        if self.options.runs(check) {
            work.await
        } else {
            Outcome::Skipped
        }
    }

    async fn spf(&self, domain: &str) -> SpfReport {
        let records = self.resolver.lookup_txt(domain).await;
        evaluate_spf(domain, &records)
    }

    async fn dmarc(&self, domain: &str) -> DmarcReport {
        let records = self.resolver.lookup_txt(&fqdn("_dmarc", domain)).await;
        evaluate_dmarc(domain, &records)
    }

    /// Probes run `max_concurrent_probes` at a time, each under the probe
    /// timeout. Selectors still pending at the deadline are reported as
    /// timed out; results keep the configured selector order.
    async fn dkim(&self, domain: &str, deadline: Instant) -> DkimReport {
        let selectors = self.options.dkim_selectors();
        let per_probe = self.options.probe_timeout();

        let mut pending = stream::iter(selectors.iter().enumerate().map(|(index, selector)| {
            let name = fqdn(&format!("{selector}._domainkey"), domain);
            async move {
                let outcome = match timeout(per_probe, self.resolver.lookup_txt(&name)).await {
                    Ok(records) => ProbeOutcome::Records(records),
                    Err(_) => {
                        debug!(%name, "DKIM probe timed out");
                        ProbeOutcome::TimedOut
                    }
                };
                (index, outcome)
            }
        }))
        .buffer_unordered(self.options.max_concurrent_probes());

        let mut outcomes: Vec<Option<ProbeOutcome>> = selectors.iter().map(|_| None).collect();
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some((index, outcome))) => {
                    if let Some(slot) = outcomes.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(domain, "deadline reached with DKIM probes pending");
                    break;
                }
            }
        }

        let probes = selectors
            .iter()
            .zip(outcomes)
            .map(|(selector, outcome)| SelectorProbe {
                selector: selector.clone(),
                outcome: outcome.unwrap_or(ProbeOutcome::TimedOut),
            })
            .collect();
        evaluate_dkim_probes(domain, probes)
    }

    /// The MX lookup is bound by the deadline; a probe cut short by it
    /// leaves the report without an observation.
    async fn connectivity(&self, domain: &str, deadline: Instant) -> Outcome<ConnectivityReport> {
        let mx_records =
            match within(Check::Connectivity, deadline, self.resolver.lookup_mx(domain)).await {
                Outcome::Finished(records) => records,
                _ => return Outcome::TimedOut,
            };
        let primary = mx_records.iter().min().map(|mx| mx.exchange.clone());

        let observation = match (&self.prober, primary) {
            (Some(prober), Some(host)) if self.options.probe_smtp() => {
                self.probe_smtp(Arc::clone(prober), host, deadline).await
            }
            _ => None,
        };
        Outcome::Finished(evaluate_connectivity(domain, mx_records, observation))
    }

    async fn probe_smtp(
        &self,
        prober: Arc<dyn SmtpProber>,
        host: String,
        deadline: Instant,
    ) -> Option<SmtpObservation> {
        let smtp_timeout = self.options.smtp_timeout();
        let task_host = host.clone();
        let task = tokio::task::spawn_blocking(move || prober.probe(&task_host, smtp_timeout));
        match timeout_at(deadline, task).await {
            Ok(Ok(observation)) => Some(observation),
            Ok(Err(err)) => {
                warn!(%host, error = %err, "SMTP probe task failed");
                Some(SmtpObservation::unreachable(host, err.to_string()))
            }
            Err(_) => {
                warn!(%host, "deadline reached during SMTP probe");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
