//! Scene Tagger - command line front end
//!
//! Scrapes metadata for local scenes and saves it back to the media server.

use scene_tagger::core::config::{CliArgs, Command};
use scene_tagger::core::{self, Notifier};
use scene_tagger::tagger::{Tagger, TaggerSettings};
use scene_tagger::GraphqlClient;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Scene Tagger v{}", scene_tagger::VERSION);
    info!(url = %config.stash.url, "Media server configuration");
    info!(path = ?config.tagger.settings_path, "Tagger settings");

    let backend = Arc::new(GraphqlClient::new(&config.stash)?);
    let settings = Arc::new(TaggerSettings::load(config.tagger.settings_path.clone())?);
    let notifier = Arc::new(Notifier::new());
    let tagger = Arc::new(Tagger::new(backend, settings, notifier));

    tagger.initialize().await?;

    match args.command {
        Command::Sources => print_sources(&tagger),
        Command::Scrape { source, scenes } => {
            select(&tagger, source.as_deref())?;
            scrape(&tagger, &scenes).await;
        }
        Command::Run { source, scenes } => {
            select(&tagger, source.as_deref())?;
            scrape(&tagger, &scenes).await;
            if let Some(report) = tagger.run_all().await {
                println!(
                    "Saved {} scenes, {} failed",
                    report.saved.len(),
                    report.failed.len()
                );
            }
        }
        Command::SubmitFingerprints { source } => {
            select(&tagger, source.as_deref())?;
            if let Some(count) = tagger.submit_fingerprints().await {
                println!("Submitted fingerprints for {} scenes", count);
            }
        }
    }

    print_notifications(&tagger);
    Ok(())
}

fn print_sources(tagger: &Tagger) {
    let current = tagger.current_source().map(|s| s.id);
    for source in tagger.sources() {
        let marker = if current.as_deref() == Some(source.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {:<50} {}", marker, source.id, source.display_name);
    }
}

fn select(tagger: &Tagger, source: Option<&str>) -> Result<()> {
    if let Some(id) = source {
        tagger.select_source(id)?;
    }
    if tagger.current_source().is_none() {
        anyhow::bail!("No scrape source available");
    }
    Ok(())
}

async fn scrape(tagger: &Arc<Tagger>, scenes: &[String]) {
    let stopper = Arc::clone(tagger);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight scrapes");
            stopper.stop_batch_scrape();
        }
    });

    let report = tagger.batch_fragment_scrape(scenes).await;
    ctrl_c.abort();

    if let Some(report) = report {
        println!(
            "Scraped {} of {} scenes{}",
            report.completed,
            report.requested,
            if report.cancelled { " (stopped)" } else { "" }
        );
    }
    if let Some(error) = tagger.multi_error() {
        println!("Batch scrape failed: {}", error);
    }

    for (scene_id, result) in tagger.results() {
        match (result.results(), result.error()) {
            (Some(scenes), _) => println!("  {}: {} result(s)", scene_id, scenes.len()),
            (None, Some(error)) => println!("  {}: {}", scene_id, error),
            (None, None) => {}
        }
    }
    println!(
        "Pending: {} tags, {} performers, {} studios, {} scenes",
        tagger.pending_tags_count(),
        tagger.pending_performers_count(),
        tagger.pending_studios_count(),
        tagger.pending_scenes_count()
    );
}

fn print_notifications(tagger: &Tagger) {
    for notification in tagger.notifier().history() {
        println!("[{:?}] {}", notification.level, notification.message);
    }
}
