use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use mailposture::{AuditOptions, Check};

#[derive(Parser)]
#[command(name = "mailposture-cli", version)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// lit des domaines depuis stdin (un par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// fichier de configuration JSON (les options CLI priment)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// vérifications à lancer: spf,dmarc,dkim,connectivity
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// ajoute un sélecteur DKIM à interroger (répétable)
    #[arg(long = "dkim-selector")]
    pub dkim_selectors: Vec<String>,

    /// remplace les sélecteurs par défaut par ceux de --dkim-selector
    #[arg(long)]
    pub replace_selectors: bool,

    /// nombre de sondes DKIM simultanées
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// timeout par sonde DKIM (ms)
    #[arg(long = "probe-timeout-ms")]
    pub probe_timeout_ms: Option<u64>,

    /// délai global par domaine (ms)
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// sonde SMTP/TLS du MX principal (feature `with-smtp-probe`)
    #[cfg(feature = "with-smtp-probe")]
    #[arg(long)]
    pub probe_smtp: bool,

    /// verbosité des logs sur stderr (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// audite un domaine
    Check { domain: String },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    /// Options from `--config` (or defaults), overridden by the flags.
    pub fn audit_options(&self) -> Result<AuditOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                AuditOptions::from_json(&raw)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => AuditOptions::default(),
        };

        if !self.only.is_empty() {
            let checks = self
                .only
                .iter()
                .map(|name| name.parse::<Check>())
                .collect::<Result<Vec<_>, _>>()?;
            options = options.with_checks(checks);
        }

        options = if self.replace_selectors {
            options.replace_dkim_selectors(&self.dkim_selectors)
        } else {
            options.with_dkim_selectors(&self.dkim_selectors)
        };

        if let Some(concurrency) = self.concurrency {
            options = options.with_max_concurrent_probes(concurrency);
        }
        if let Some(ms) = self.probe_timeout_ms {
            options = options.with_probe_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_deadline(Duration::from_millis(ms));
        }
        #[cfg(feature = "with-smtp-probe")]
        if self.probe_smtp {
            options = options.with_smtp_probe(true);
        }

        Ok(options)
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
