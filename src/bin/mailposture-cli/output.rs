#[cfg(any(feature = "with-serde", feature = "with-csv"))]
use anyhow::Context;
use anyhow::{Result, bail};

use crate::args::Cli;
use mailposture::{Check, DomainAudit, EvaluationResult};

pub fn write_reports(audits: &[DomainAudit], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(audits),
        "json" => write_json(audits, cli),
        "ndjson" => write_ndjson(audits, cli),
        "csv" => write_csv(audits, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_invalid(audits: &[DomainAudit]) -> bool {
    audits.iter().any(|audit| !audit.is_valid())
}

fn write_human(audits: &[DomainAudit]) -> Result<()> {
    for audit in audits {
        let tag = if audit.is_valid() { "[OK]     " } else { "[INVALID]" };
        println!(
            "{tag} {} :: score {:.1} ({} ms)",
            audit.domain, audit.overall_score, audit.elapsed_ms
        );
        if let Some(report) = &audit.spf {
            print_section(Check::Spf, report);
        }
        if let Some(report) = &audit.dmarc {
            print_section(Check::Dmarc, report);
        }
        if let Some(report) = &audit.dkim {
            print_section(Check::Dkim, report);
            if let Some(parsed) = &report.parsed {
                if !parsed.valid_selectors.is_empty() {
                    println!("              selectors: {}", parsed.valid_selectors.join(", "));
                }
                if !parsed.selectors_timed_out.is_empty() {
                    println!("              timed out: {}", parsed.selectors_timed_out.join(", "));
                }
            }
        }
        if let Some(report) = &audit.connectivity {
            print_section(Check::Connectivity, report);
        }
        for check in &audit.timed_out {
            println!("        {check}: timed out");
        }
    }
    Ok(())
}

fn print_section<P>(check: Check, report: &EvaluationResult<P>) {
    let state = match (report.found, report.valid) {
        (false, _) => "missing",
        (true, true) => "valid",
        (true, false) => "invalid",
    };
    println!("        {check}: {state}, score {}", report.score);
    for issue in &report.issues {
        println!("              ! {issue}");
    }
    for recommendation in &report.recommendations {
        println!("              > {recommendation}");
    }
}

#[cfg(feature = "with-serde")]
fn write_json(audits: &[DomainAudit], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(audits)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[DomainAudit], _: &Cli) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(audits: &[DomainAudit], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for audit in audits {
            let line = serde_json::to_string(audit)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for audit in audits {
            println!("{}", serde_json::to_string(audit)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[DomainAudit], _: &Cli) -> Result<()> {
    bail!("format=ndjson nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 12] = [
    "domain",
    "overall_score",
    "spf_score",
    "spf_valid",
    "dmarc_score",
    "dmarc_valid",
    "dkim_score",
    "dkim_valid",
    "dkim_selectors",
    "connectivity_score",
    "connectivity_valid",
    "timed_out",
];

#[cfg(feature = "with-csv")]
fn write_csv(audits: &[DomainAudit], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for audit in audits {
            wtr.write_record(csv_record(audit))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(CSV_HEADER)?;
        for audit in audits {
            wtr.write_record(csv_record(audit))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[DomainAudit], _: &Cli) -> Result<()> {
    bail!("format=csv nécessite la feature 'with-csv'")
}

#[cfg(feature = "with-csv")]
fn csv_record(audit: &DomainAudit) -> Vec<String> {
    fn fields<P>(report: Option<&EvaluationResult<P>>) -> [String; 2] {
        match report {
            Some(report) => [report.score.to_string(), report.valid.to_string()],
            None => [String::new(), String::new()],
        }
    }

    let mut record = vec![audit.domain.clone(), format!("{:.1}", audit.overall_score)];
    record.extend(fields(audit.spf.as_ref()));
    record.extend(fields(audit.dmarc.as_ref()));
    record.extend(fields(audit.dkim.as_ref()));
    record.push(
        audit
            .dkim
            .as_ref()
            .and_then(|report| report.parsed.as_ref())
            .map(|parsed| parsed.valid_selectors.join("|"))
            .unwrap_or_default(),
    );
    record.extend(fields(audit.connectivity.as_ref()));
    record.push(
        audit
            .timed_out
            .iter()
            .map(|check| check.as_str())
            .collect::<Vec<_>>()
            .join("|"),
    );
    record
}

#[cfg(any(feature = "with-serde", feature = "with-csv"))]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
