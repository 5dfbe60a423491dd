//! liaison - Entry point for the connection-state CLI
//!
//! Without arguments, prints the session and integration statuses as JSON
//! once the first refresh cycle has settled. With a callback URL argument,
//! resumes an OAuth flow first.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use liaison::app::{AppEvent, BrowserNavigator, EventBus};
use liaison::config::Settings;
use liaison::providers::identity::HostIdentity;
use liaison::storage::FilePendingStore;
use liaison::AppContext;

#[derive(Debug, Parser)]
#[command(name = "liaison", version, about = "Session and integration status for the mail assistant")]
struct Cli {
    /// OAuth callback URL to resume before reporting
    callback_url: Option<Url>,

    /// Bearer token of the signed-in user; signed out when absent
    #[arg(long, env = "LIAISON_ID_TOKEN", hide_env_values = true)]
    id_token: Option<String>,

    /// User id of the signed-in user (defaults to the email)
    #[arg(long, env = "LIAISON_USER_ID")]
    user_id: Option<String>,

    /// Email of the signed-in user
    #[arg(long, env = "LIAISON_USER_EMAIL")]
    user_email: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting liaison");

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!("Application error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when a callback was resumed but failed.
async fn run(cli: Cli) -> Result<bool> {
    let settings = Settings::load().context("failed to load settings")?;
    let data_dir = Settings::data_dir().context("failed to resolve data directory")?;
    let settle_timeout = settings.backend.request_timeout() + Duration::from_secs(1);

    let events = EventBus::new();
    events.subscribe(|event| match event {
        AppEvent::ShowNotification(n) => {
            tracing::info!(
                level = ?n.level,
                body = n.body.as_deref().unwrap_or_default(),
                "{}",
                n.title
            );
        }
        AppEvent::NavigateTo(route) => tracing::debug!(%route, "Navigate"),
        _ => {}
    });

    let ctx = AppContext::build(
        settings,
        events.clone(),
        Arc::new(HostIdentity::from_token(
            cli.id_token,
            cli.user_id,
            cli.user_email,
        )),
        Arc::new(BrowserNavigator::new(events)),
        Arc::new(FilePendingStore::in_dir(&data_dir)),
    )
    .context("failed to build application context")?;

    let mut succeeded = true;
    if let Some(url) = &cli.callback_url {
        let outcome = ctx.callback.resume(url).await;
        succeeded = outcome.is_success();
    }

    ctx.session.wait_until_initialized().await;
    let mut state = ctx.coordinator.watch();
    if tokio::time::timeout(settle_timeout, state.wait_for(|s| !s.is_settling()))
        .await
        .is_err()
    {
        tracing::warn!("Integration statuses did not settle in time");
    }

    let json = serde_json::to_string_pretty(&ctx.coordinator.state())
        .context("failed to serialize state")?;
    println!("{json}");
    Ok(succeeded)
}
