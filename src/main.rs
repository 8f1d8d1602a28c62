use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::info;

use giving_labeler::api::PcoClient;
use giving_labeler::config;
use giving_labeler::mutator::WebMutator;
use giving_labeler::pipeline::{Labeler, DEFAULT_WINDOW_DAYS};
use giving_labeler::session::AuthStrategy;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only consider donations received within this many days
    #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
    window_days: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        eprintln!("you must create a {} file", args.config.display());
        process::exit(1);
    }
    let cfg = config::load(Some(&args.config))?;

    info!(
        "applying giving labels, run {}",
        Local::now().format("%Y-%m-%d %I:%M %p")
    );

    let api = PcoClient::new(
        cfg.personal_access_token.app_id.clone(),
        cfg.personal_access_token.secret.clone(),
    );
    let auth = AuthStrategy::from_login(&cfg.login)?;
    let writer = WebMutator::new(auth);
    let labeler = Labeler::new(&api, &writer, cfg.label_mappings(), args.window_days);
    labeler.run().await?;

    info!("done");
    Ok(())
}
