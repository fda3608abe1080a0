//! `credcheck` - checks SMTP credentials from the command line.
//!
//! Reads the server and login from a settings file, lets flags override any
//! of them, runs one AUTH LOGIN probe and prints `valid` or `invalid`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use credcheck_smtp::{CredentialValidator, Credentials, Endpoint, ProbeOptions, Security};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use settings::{DEFAULT_SETTINGS_FILE, Settings};

const DEFAULT_FILTER: &str = "credcheck=info,credcheck_smtp=info";
const DEBUG_FILTER: &str = "credcheck=debug,credcheck_smtp=debug";

/// Check whether an SMTP server accepts a login and password.
#[derive(Debug, Parser)]
#[command(name = "credcheck", version, about)]
struct Args {
    /// Settings file, created with defaults if missing
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Server host name or address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Login name
    #[arg(long)]
    username: Option<String>,

    /// Password
    #[arg(long)]
    password: Option<String>,

    /// Use implicit TLS (moves the plain default port 587 to 465)
    #[arg(long)]
    tls: bool,

    /// Name to announce in HELO (defaults to this machine's host name)
    #[arg(long, value_name = "NAME")]
    helo: Option<String>,

    /// Seconds to wait for the TLS connection and handshake
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Log every protocol step
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Overlays the flags that were given on top of `settings`.
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(host) = &self.host {
            settings.host_ip.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(username) = &self.username {
            settings.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            settings.password.clone_from(password);
        }
        if self.tls {
            settings.enable_ssl = true;
            if self.port.is_none() && settings.port == Security::None.default_port() {
                settings.port = Security::Tls.default_port();
            }
        }
        settings
    }

    fn probe_options(&self) -> ProbeOptions {
        let mut options = ProbeOptions::new();
        if let Some(secs) = self.connect_timeout {
            options = options.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(name) = &self.helo {
            options = options.client_name(name.as_str());
        }
        options
    }

    fn filter(&self) -> EnvFilter {
        if self.debug {
            return EnvFilter::new(DEBUG_FILTER);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(args.filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args) {
        Ok(true) => {
            println!("valid");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("invalid");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(check(args))
}

async fn check(args: &Args) -> anyhow::Result<bool> {
    let settings = Settings::load_or_create(&args.config)
        .await
        .with_context(|| format!("loading {}", args.config.display()))?;
    let settings = args.apply(settings);
    debug!(?settings, "effective settings");

    let endpoint = Endpoint::new(settings.host_ip.as_str(), settings.port);
    let security = Security::from(settings.enable_ssl);
    let credentials = Credentials::new(settings.username, settings.password);
    info!(%endpoint, %security, "checking credentials");
    if !security.is_encrypted() {
        warn!("credentials will cross the network unencrypted");
    }

    let validator = CredentialValidator::with_options(args.probe_options());
    Ok(validator
        .probe(&credentials, &endpoint, security)
        .await
        .is_ok())
}
