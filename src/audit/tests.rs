use std::{collections::HashMap, time::Duration};

use super::{AuditOptions, Auditor};
use crate::{
    AuditError, Check, SelectorStatus,
    connectivity::{MxRecord, SmtpObservation, SmtpProber},
    dns::DnsLookup,
};

const STRONG_KEY: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAuem5v++1dLu7MFljNgWSXwOF3qKzifn41iP4T4KivdxywhTEOGtPLIts6R1z3zYztqI9q1n19bmpSY9XEQyV3GzsFVtvD0g5ngDUBrNAQ1Y87ePXpRKD2hm9q+tnbhnla7AEiOR8J/xbnCdsOBr0FKx5zRK6YNCG+gBvo95iYcDYh9ais02Lb+Fg1Rqc4wLnjRUNJoiRMiwhcN1Mw94Yr+RJ9VQET3mPS5702yNfI8PQv/j3vd5T0FNbQlrdOqV3/okIfS8m6wWSR6NfHyLPdAJDZMSrMi60IqjhxbCyRtdRjTOhNdw3OyyqKM+VhofemkmWq6UUG3Z2qpQRdOgJLQIDAQAB";

#[derive(Default)]
struct StubResolver {
    txt: HashMap<String, Vec<String>>,
    mx: HashMap<String, Vec<MxRecord>>,
    delays: HashMap<String, Duration>,
}

impl StubResolver {
    fn with_txt(mut self, name: &str, records: &[&str]) -> Self {
        self.txt.insert(
            normalize_name(name),
            records.iter().map(|record| record.to_string()).collect(),
        );
        self
    }

    fn with_mx(mut self, name: &str, records: &[(u16, &str)]) -> Self {
        self.mx.insert(
            normalize_name(name),
            records
                .iter()
                .map(|(preference, exchange)| MxRecord::new(*preference, *exchange))
                .collect(),
        );
        self
    }

    fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(normalize_name(name), delay);
        self
    }

    async fn wait(&self, name: &str) {
        if let Some(delay) = self.delays.get(&normalize_name(name)) {
            tokio::time::sleep(*delay).await;
        }
    }
}

impl DnsLookup for StubResolver {
    async fn lookup_txt(&self, name: &str) -> Vec<String> {
        self.wait(name).await;
        self.txt.get(&normalize_name(name)).cloned().unwrap_or_default()
    }

    async fn lookup_mx(&self, name: &str) -> Vec<MxRecord> {
        self.wait(name).await;
        self.mx.get(&normalize_name(name)).cloned().unwrap_or_default()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn dkim_record() -> String {
    format!("v=DKIM1; k=rsa; p={STRONG_KEY}")
}

fn well_configured() -> StubResolver {
    let dkim = dkim_record();
    StubResolver::default()
        .with_txt("example.com", &["v=spf1 include:_spf.google.com -all", "MS=ms42"])
        .with_txt(
            "_dmarc.example.com",
            &["v=DMARC1; p=reject; rua=mailto:dmarc@example.com"],
        )
        .with_txt("google._domainkey.example.com", &[dkim.as_str()])
        .with_mx("example.com", &[(10, "mx1.example.com"), (20, "mx2.example.com")])
}

#[tokio::test(start_paused = true)]
async fn audit_runs_every_check() {
    let auditor = Auditor::new(well_configured(), AuditOptions::default());
    let audit = auditor.audit(" Example.COM ").await.expect("audit");

    assert_eq!(audit.domain, "example.com");
    assert!(audit.timed_out.is_empty());

    let spf = audit.spf.as_ref().expect("spf");
    // 30 + 40 + 10 lookups + 10 include + 5 trusted
    assert_eq!(spf.score, 95);
    let dmarc = audit.dmarc.as_ref().expect("dmarc");
    assert!(dmarc.valid);
    let dkim = audit.dkim.as_ref().expect("dkim");
    assert_eq!(
        dkim.parsed.as_ref().map(|parsed| parsed.valid_selectors.clone()),
        Some(vec!["google".to_string()])
    );
    let connectivity = audit.connectivity.as_ref().expect("connectivity");
    assert_eq!(connectivity.score, 30);

    let expected = (spf.score + dmarc.score + dkim.score + connectivity.score) as f64 / 4.0;
    assert!((audit.overall_score - expected).abs() < 0.051);
    assert!(audit.is_valid());
}

#[tokio::test(start_paused = true)]
async fn hanging_selector_does_not_block_others() {
    let resolver = well_configured().with_delay("slow._domainkey.example.com", Duration::from_secs(3600));
    let options = AuditOptions::new()
        .replace_dkim_selectors(["slow", "google", "mail"])
        .with_max_concurrent_probes(1)
        .with_probe_timeout(Duration::from_secs(2))
        .with_deadline(Duration::from_secs(30))
        .with_checks([Check::Dkim]);
    let audit = Auditor::new(resolver, options).audit("example.com").await.expect("audit");

    assert!(audit.timed_out.is_empty());
    let dkim = audit.dkim.as_ref().expect("dkim");
    let parsed = dkim.parsed.as_ref().expect("parsed");
    assert_eq!(parsed.selectors_tested, vec!["slow", "google", "mail"]);
    assert_eq!(parsed.selectors_timed_out, vec!["slow"]);
    assert_eq!(parsed.valid_selectors, vec!["google"]);
    assert!(audit.elapsed_ms < 30_000);
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_partial_results() {
    let resolver = well_configured()
        .with_delay("example.com", Duration::from_secs(3600))
        .with_delay("mail._domainkey.example.com", Duration::from_secs(5))
        .with_txt("mail._domainkey.example.com", &[dkim_record().as_str()]);
    let options = AuditOptions::new()
        .replace_dkim_selectors(["google", "mail"])
        .with_probe_timeout(Duration::from_secs(10))
        .with_deadline(Duration::from_secs(2));
    let audit = Auditor::new(resolver, options).audit("example.com").await.expect("audit");

    // apex TXT and MX share the delayed name
    assert_eq!(audit.timed_out, vec![Check::Spf, Check::Connectivity]);
    assert!(audit.spf.is_none());
    assert!(audit.connectivity.is_none());

    let dmarc = audit.dmarc.as_ref().expect("dmarc finished");
    let dkim = audit.dkim.as_ref().expect("dkim partial");
    let parsed = dkim.parsed.as_ref().expect("parsed");
    let statuses: Vec<_> = parsed.selectors.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![SelectorStatus::Valid, SelectorStatus::TimedOut]);

    let expected = ((dmarc.score + dkim.score) as f64 / 2.0 * 10.0).round() / 10.0;
    assert_eq!(audit.overall_score, expected);
    assert!(!audit.is_valid());
    assert!(audit.elapsed_ms <= 2_000);
}

#[tokio::test(start_paused = true)]
async fn disabled_checks_are_skipped() {
    let options = AuditOptions::new().with_checks([Check::Spf]);
    let audit = Auditor::new(well_configured(), options)
        .audit("example.com")
        .await
        .expect("audit");

    assert!(audit.spf.is_some());
    assert!(audit.dmarc.is_none() && audit.dkim.is_none() && audit.connectivity.is_none());
    assert!(audit.timed_out.is_empty());
    assert_eq!(audit.overall_score, 95.0);
}

#[tokio::test]
async fn invalid_domain_is_an_error() {
    let auditor = Auditor::new(StubResolver::default(), AuditOptions::default());
    assert!(matches!(auditor.audit("  ").await, Err(AuditError::EmptyDomain)));
    assert!(matches!(
        auditor.audit("nodot").await,
        Err(AuditError::InvalidDomain { .. })
    ));
}

struct StubProber;

impl SmtpProber for StubProber {
    fn probe(&self, host: &str, _timeout: Duration) -> SmtpObservation {
        SmtpObservation {
            host: host.to_string(),
            connected: true,
            supports_starttls: true,
            supports_tls: true,
            ..SmtpObservation::default()
        }
    }
}

#[tokio::test]
async fn prober_feeds_connectivity_scoring() {
    let options = AuditOptions::new()
        .with_checks([Check::Connectivity])
        .with_smtp_probe(true);
    let audit = Auditor::new(well_configured(), options)
        .with_prober(StubProber)
        .audit("example.com")
        .await
        .expect("audit");

    let connectivity = audit.connectivity.as_ref().expect("connectivity");
    let observation = connectivity
        .parsed
        .as_ref()
        .and_then(|details| details.observation.as_ref())
        .expect("observation");
    assert_eq!(observation.host, "mx1.example.com");
    // MX 20 + redundancy 10 + connected 30 + TLS 20
    assert_eq!(connectivity.score, 80);
}

#[tokio::test]
async fn prober_is_ignored_unless_enabled() {
    let options = AuditOptions::new().with_checks([Check::Connectivity]);
    let audit = Auditor::new(well_configured(), options)
        .with_prober(StubProber)
        .audit("example.com")
        .await
        .expect("audit");
    let details = audit
        .connectivity
        .as_ref()
        .and_then(|report| report.parsed.as_ref())
        .expect("details");
    assert!(details.observation.is_none());
}
