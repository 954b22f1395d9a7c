use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use srsforward_utils::{load_config, ForwardConfig, ForwardResult, Forwarder};
use tokio::io::{stdin, BufReader};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Postfix filter forwarding a message through sendmail with its envelope
/// sender rewritten by an SRS lookup service.
///
/// Reads the message from standard input; arguments after `--` are passed
/// on to sendmail (typically the recipients).
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Show what would be done, don't actually forward mail
    #[arg(long, env = "SRSFORWARD_DRY_RUN")]
    dry_run: bool,

    /// Override $PATH with this value when executing binaries
    #[arg(long, env = "SRSFORWARD_PATH")]
    path: Option<String>,

    /// Header name containing the return-path (MAIL FROM) value
    #[arg(long, env = "SRSFORWARD_RP_HEADER")]
    rp_header: Option<String>,

    /// Path to the sendmail binary
    #[arg(long, env = "SRSFORWARD_SENDMAIL_PATH")]
    sendmail_path: Option<String>,

    /// TCP address for SRS lookups
    #[arg(long, env = "SRSFORWARD_SRS_ADDR")]
    srs_addr: Option<String>,

    /// TOML configuration file, command line values take precedence
    #[arg(long, short, env = "SRSFORWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Extra arguments appended to the sendmail command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    sendmail_args: Vec<String>,
}

impl Cli {
    /// Builds the effective configuration: command line, then configuration
    /// file, then defaults.
    fn forward_config(&self) -> ForwardResult<ForwardConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?.forward,
            None => ForwardConfig::default(),
        };
        config.dry_run |= self.dry_run;
        if let Some(path) = &self.path {
            config.path = Some(path.clone());
        }
        if let Some(rp_header) = &self.rp_header {
            config.rp_header = rp_header.clone();
        }
        if let Some(sendmail_path) = &self.sendmail_path {
            config.sendmail_path = sendmail_path.clone();
        }
        if let Some(srs_addr) = &self.srs_addr {
            config.srs_addr = srs_addr.clone();
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> ForwardResult<()> {
    let config = cli.forward_config()?;
    debug!(config = ?config, "Loaded configuration");

    let forwarder = Forwarder::from_config(&config);
    forwarder
        .forward(BufReader::new(stdin()), &cli.sendmail_args)
        .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // diagnostics go to stderr, stdout is reserved for the dry-run preview
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
