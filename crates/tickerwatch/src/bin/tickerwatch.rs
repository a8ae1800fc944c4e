//! Ticker watcher CLI
//!
//! # Usage
//!
//! ```bash
//! export TWITTER_CONSUMER_KEY="..." TWITTER_CONSUMER_SECRET="..."
//! export TWITTER_ACCESS_TOKEN="..." TWITTER_ACCESS_TOKEN_SECRET="..."
//! export GOOGLE_LANGUAGE_API_KEY="..."
//!
//! # Watch the stream (default command)
//! cargo run --bin tickerwatch -- run
//!
//! # Analyze a saved post without publishing
//! cargo run --bin tickerwatch -- analyze post.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tickerwatch::{
    Aggregator, LanguageClient, Post, PostPipeline, Publisher, ResolutionCache, Resolver,
    SessionSupervisor, StreamConsumer, StreamSession, TwitterPublisher, TwitterStream,
    WatchConfig, WikidataClient, health,
};
use tickerwatch_utils::{LogFormat, init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tickerwatch")]
#[command(about = "Publishes the stock tickers an account's posts mention", long_about = None)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Account whose posts are watched
    #[arg(long, global = true)]
    source_account_id: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the live stream and publish summaries
    Run,
    /// Run the pipeline once over a saved post
    Analyze {
        /// Post JSON as delivered by the stream
        file: PathBuf,

        /// Publish the composed message
        #[arg(long)]
        publish: bool,
    },
}

fn load_config(args: &Args) -> anyhow::Result<WatchConfig> {
    let mut builder = WatchConfig::builder();
    if let Some(id) = &args.source_account_id {
        builder = builder.source_account_id(id.clone());
    }
    Ok(builder.with_env()?.build()?)
}

fn build_aggregator(config: &WatchConfig) -> anyhow::Result<Aggregator> {
    let language = Arc::new(LanguageClient::from_config(config)?);
    let resolver = Resolver::new(Arc::new(WikidataClient::from_config(config)?))
        .with_cache(ResolutionCache::new(config.resolver_cache_ttl));

    Ok(Aggregator::new(language.clone(), language, Arc::new(resolver)))
}

async fn run(config: WatchConfig) -> anyhow::Result<()> {
    config.require_credentials()?;

    let pipeline = PostPipeline::new(
        build_aggregator(&config)?,
        Arc::new(TwitterPublisher::from_config(&config)?),
    );
    let shutdown = CancellationToken::new();
    let consumer = Arc::new(
        StreamConsumer::new(&config, Arc::new(pipeline)).with_shutdown(shutdown.clone()),
    );
    let session = StreamSession::new(consumer, Arc::new(TwitterStream::from_config(&config)?));
    let supervisor =
        SessionSupervisor::new(&config, Arc::new(session)).with_shutdown(shutdown.clone());

    let health = {
        let addr = config.health_addr.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&addr, shutdown).await {
                error!("Health endpoint failed: {}", e);
            }
        })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, draining queued posts");
                shutdown.cancel();
            }
        });
    }

    info!("Watching account {}", config.source_account_id);
    let result = supervisor.run().await;

    shutdown.cancel();
    let _ = health.await;

    result.context("stream supervisor gave up")
}

async fn analyze(config: WatchConfig, file: PathBuf, publish: bool) -> anyhow::Result<()> {
    let frame = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let post = Post::from_frame(&frame)?;

    let pipeline = PostPipeline::dry_run(build_aggregator(&config)?);
    let Some(message) = pipeline.analyze(&post).await? else {
        println!("No companies found in post {}", post.id);
        return Ok(());
    };
    println!("{message}");

    if publish {
        TwitterPublisher::from_config(&config)?.publish(&message).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(LogFormat::from_flag(args.json_logs), "info,tickerwatch=info");

    let config = load_config(&args)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Analyze { file, publish } => analyze(config, file, publish).await,
    }
}
