mod args;
mod output;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing_subscriber::EnvFilter;

use std::io::{self, BufRead};

use args::{Cli, Commands};
use mailposture::Auditor;
#[cfg(feature = "with-smtp-probe")]
use mailposture::TlsProber;

/// Domains audited at the same time in `--stdin` mode.
const BATCH_CONCURRENCY: usize = 4;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let domains: Vec<String> = if cli.stdin {
        let mut domains = Vec::new();
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                domains.push(trimmed.to_string());
            }
        }
        domains
    } else if let Some(Commands::Check { domain }) = &cli.cmd {
        vec![domain.clone()]
    } else {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    };

    let options = cli.audit_options()?;
    let auditor = Auditor::from_system_conf(options).context("initialise DNS resolver")?;
    #[cfg(feature = "with-smtp-probe")]
    let auditor = if cli.probe_smtp {
        auditor.with_prober(TlsProber::new())
    } else {
        auditor
    };

    let auditor = &auditor;
    let results: Vec<_> = stream::iter(domains.iter().map(|domain| async move {
        auditor
            .audit(domain)
            .await
            .with_context(|| format!("audit {domain}"))
    }))
    .buffered(BATCH_CONCURRENCY)
    .collect()
    .await;
    let audits = results.into_iter().collect::<Result<Vec<_>>>()?;

    output::write_reports(&audits, &cli)?;

    // codes de sortie : 0 OK, 2 invalides, 1 fatal
    if output::any_invalid(&audits) {
        std::process::exit(2);
    }
    Ok(())
}
