mod config;
mod hook;
mod policy;

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use mailshelter_api::{ApiClient, ApiConfig};
use mailshelter_compose::{
    DumpAllImages, DumpMailMarkup, DumpStyleSheet, InsertAppMetadata, InsertMailHeader,
    MailComposer, RemoveAllJs, RemoveAllMetaTags, RemoveAllStyleSheet,
};
use mailshelter_domain::{MailPort, Policy};
use mailshelter_error::ShelterError;
use mailshelter_sync::{collect_new_mails, DoneSet, Runner, SyncState};
use tracing::{error, info, warn};

use config::Config;

const APP_NAME: &str = "Mail Shelter";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mailshelter=info")),
        )
        .compact()
        .init();
}

fn print_usage() {
    eprintln!("{APP_NAME} — incremental private-mail archiver");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mailshelter [-c <file>]   Run one archive pass");
    eprintln!("  mailshelter help          Show this help");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <file>       JSON configuration (default: config.json)");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  RUST_LOG                  Log filter (default: mailshelter=info)");
}

fn build_composer(config: &Config, policy: &Policy) -> MailComposer {
    MailComposer::new(&config.destination, &config.mail_path)
        .push(RemoveAllMetaTags)
        .push(InsertAppMetadata::new(APP_NAME, env!("CARGO_PKG_VERSION")))
        .push(RemoveAllStyleSheet)
        .push(DumpStyleSheet::new(
            policy.css.clone(),
            config.css_path.as_deref().map(PathBuf::from),
        ))
        .push(RemoveAllJs)
        .push(DumpAllImages::new(config.image_path.as_deref().map(PathBuf::from)))
        .push(InsertMailHeader::new(
            policy.mail_header.clone(),
            config.profile_image_path.as_deref().map(PathBuf::from),
        ))
        .push(DumpMailMarkup)
}

async fn run(config_path: &Path) -> Result<ExitCode, ShelterError> {
    let config = Config::load(config_path)?;
    info!(config = %config_path.display(), "configuration parsed");
    let policy = policy::for_bundle(&config.bundle_id)?;
    let profile = config.build_profile()?;

    let port: Arc<dyn MailPort> = Arc::new(ApiClient::new(ApiConfig {
        api_host: policy.api_host.clone(),
        app_host: policy.app_host.clone(),
        profile,
        timeout_secs: config.timeout,
        max_retries: config.max_retries,
    })?);

    let user = port.get_user().await?;
    info!(user_id = %user.id, nickname = %user.nickname, country = %user.country_code, "retrieved user");

    let mut state = SyncState::load(&config.head, &config.index, policy.genesis)?;
    info!(head = %state.head().to_rfc3339(), indexed = state.index_len(), "state loaded");

    let new_mails = collect_new_mails(port.as_ref(), &state).await?;
    if new_mails.is_empty() {
        info!("already up to date");
        hook::run_finish_hook(config.finish_hook.as_deref(), 0);
        return Ok(ExitCode::SUCCESS);
    }
    info!(count = new_mails.len(), "new mails available");

    let composer = Arc::new(build_composer(&config, &policy));
    let runner = Runner::new(Arc::clone(&port), composer, config.max_workers);
    let done: DoneSet = Arc::default();

    let summary = tokio::select! {
        summary = runner.run(&user, &new_mails, &done) => Some(summary),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; committing the finished prefix");
            None
        }
    };

    // Whatever happened above, durable state reflects exactly the longest
    // fully-processed prefix of the oldest-first list.
    let done_ids = done
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    let committed = state.finalize(&new_mails, &done_ids);
    state.store()?;

    let downloaded = summary.map(|s| s.downloaded).unwrap_or(committed);
    info!(
        total = new_mails.len(),
        downloaded,
        skipped = summary.map(|s| s.skipped).unwrap_or(0),
        committed,
        head = %state.head().to_rfc3339(),
        "summary"
    );
    hook::run_finish_hook(config.finish_hook.as_deref(), downloaded);

    if committed < new_mails.len() {
        warn!(
            missing = new_mails.len() - committed,
            "run incomplete; a re-run will pick up the remaining mails"
        );
        return Ok(ExitCode::FAILURE);
    }
    info!("mail shelter is up to date");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path = PathBuf::from("config.json");
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => match iter.next() {
                Some(value) => config_path = PathBuf::from(value),
                None => {
                    eprintln!("{arg} requires a file argument");
                    return ExitCode::from(2);
                }
            },
            "help" | "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            unknown => {
                eprintln!("Unknown argument: {unknown}");
                eprintln!("Run `mailshelter help` for usage");
                return ExitCode::from(2);
            }
        }
    }

    match run(&config_path).await {
        Ok(code) => code,
        Err(e) => {
            error!(%e, "fatal error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
