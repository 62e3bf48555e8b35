mod auth;
mod cli;
mod commands;
mod error;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use deckathlon_api::HttpTransport;
use deckathlon_config::{Config, Profile};
use deckathlon_core::{DataRegistry, RegistryOptions};

use crate::cli::{Cli, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let session = build_session(&cli.global)?;
    tracing::debug!(command = ?cli.command, "dispatching command");
    let result = commands::dispatch(cli.command, &session, &cli.global).await;
    session.registry.shutdown();
    result
}

/// The registry a command runs against, plus profile settings commands
/// fall back on.
pub struct Session {
    pub registry: DataRegistry,
    pub poll: Option<(String, Duration)>,
}

/// Build the registry from the config file, profile and CLI overrides.
fn build_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(deckathlon_config::config_path);
    let cfg = deckathlon_config::load_config_from(&path)?;

    let mut profile = resolve_profile(&cfg, global)?.ok_or_else(|| CliError::NoConfig {
        path: path.display().to_string(),
    })?;
    if let Some(ref root_url) = global.root_url {
        profile.root_url.clone_from(root_url);
    }
    if global.schema.is_some() {
        profile.schema.clone_from(&global.schema);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    // Schema only: a local registry over the document's data.
    if profile.root_url.is_empty() {
        let options = match profile.schema {
            Some(ref schema) => deckathlon_config::load_schema(schema)?,
            None => RegistryOptions::default(),
        };
        return Ok(Session {
            registry: DataRegistry::builder().options(options).build(),
            poll: None,
        });
    }

    let options = deckathlon_config::profile_to_registry_options(&profile)?;
    let transport_config = deckathlon_config::profile_to_transport_config(&profile, &cfg.defaults);
    let transport = HttpTransport::new(&transport_config)?;

    let mut builder = DataRegistry::builder()
        .transport(Arc::new(transport))
        .options(options);
    if let Some(credentials) = deckathlon_config::resolve_credentials(&profile) {
        builder = builder.hooks(Arc::new(auth::LoginHooks::new(credentials)));
    }

    Ok(Session {
        registry: builder.build(),
        poll: profile.poll(),
    })
}

/// The selected profile, or one built from flags alone. `None` when
/// neither a profile nor a root URL / schema is available.
fn resolve_profile(cfg: &Config, global: &GlobalOpts) -> Result<Option<Profile>, CliError> {
    match cfg.profile(global.profile.as_deref()) {
        Ok((_, profile)) => Ok(Some(profile.clone())),
        // An explicitly requested profile must exist.
        Err(err) if global.profile.is_some() => Err(err.into()),
        Err(_) if global.root_url.is_some() || global.schema.is_some() => {
            Ok(Some(Profile::default()))
        }
        Err(_) => Ok(None),
    }
}
