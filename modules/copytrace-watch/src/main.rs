use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use copytrace_common::{Config, Tuning};
use copytrace_watch::classify::{self, SourceClassifier};
use copytrace_watch::pipeline::{Pipeline, RunMode, WatchOptions};
use copytrace_watch::traits::WikiStore;
use mediawiki_client::MediaWikiClient;
use similarity_client::IthenticateClient;

/// Watch a wiki's change feed for likely copied additions and report them.
#[derive(Parser, Debug)]
#[command(name = "copytrace-watch")]
struct Args {
    /// Follow the live change stream instead of a one-shot batch run.
    #[arg(long)]
    live: bool,

    /// Page the report is merged into. Without it, rows go to the log only.
    #[arg(long)]
    report: Option<String>,

    /// Wiki language for summaries, patterns and report headers.
    #[arg(long, default_value = "en")]
    lang: String,

    /// Days of recent changes to inspect in batch mode (0.5 = 12 hours).
    #[arg(long, default_value_t = 1.0)]
    window: f64,

    /// Only inspect articles whose talk page carries this template.
    #[arg(long)]
    talk_template: Option<String>,

    /// Only inspect articles linked from this page.
    #[arg(long)]
    linked_from: Option<String>,

    /// Page listing ignore-list domain patterns, one regex per line.
    #[arg(long)]
    blacklist: Option<String>,

    /// Page whose outbound links are tracked regardless of namespace.
    #[arg(long)]
    tracked_from: Option<String>,

    /// Run every stage but never submit to the similarity service.
    #[arg(long)]
    debug_mode: bool,

    /// Most recent changes fetched per batch run.
    #[arg(long, default_value_t = 500)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("copytrace_watch=info".parse()?))
        .init();

    let args = Args::parse();
    info!("copytrace watch starting...");

    let config = if args.debug_mode {
        info!("debug mode: nothing will be submitted");
        Config::debug_from_env()
    } else {
        Config::from_env()
    };

    let mut wiki = MediaWikiClient::new(&config.wiki_api_url);
    if let Some(token) = &config.wiki_oauth_token {
        wiki = wiki.with_oauth_token(token);
    }
    let wiki: Arc<dyn WikiStore> = Arc::new(wiki);

    let service = Arc::new(
        IthenticateClient::new(
            &config.similarity_username,
            &config.similarity_password,
            &config.similarity_folder,
        )
        .with_base_url(&config.similarity_api_url),
    );

    let ignore_list = match &args.blacklist {
        Some(page) => {
            let (content, _) = wiki.read_page(page).await?;
            let list = classify::parse_ignore_list(&content);
            info!(page = %page, patterns = list.len(), "ignore list loaded");
            list
        }
        None => classify::default_ignore_list(),
    };
    let classifier = SourceClassifier::new(ignore_list);

    let options = WatchOptions {
        mode: if args.live { RunMode::Live } else { RunMode::Batch },
        lang: args.lang,
        stream_url: config.stream_url.clone(),
        report_page: args.report,
        window_days: args.window,
        talk_template: args.talk_template,
        linked_from: args.linked_from,
        tracked_from: args.tracked_from,
        no_dispatch: args.debug_mode,
        batch_limit: args.limit,
    };

    let pipeline = Pipeline::new(wiki, service, classifier, options, Tuning::default()).await?;

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, draining in-flight work");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    let stats = pipeline.run().await?;
    info!(
        dispatched = stats.dispatched,
        entries = stats.entries_written,
        "watch run finished"
    );
    Ok(())
}
