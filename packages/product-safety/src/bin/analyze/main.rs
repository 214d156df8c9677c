//! Analyze one product URL and print the result as JSON.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use product_safety::{
    AnalysisRequest, Analyzer, FetcherExt, Fingerprint, HttpPageFetcher, KnowledgeStore,
    MemoryStore, OpenAiAnalyst, ReviewInsightsExtractor,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "analyze")]
#[command(about = "Score a product page for allergens, PFAS and other toxins")]
struct Cli {
    /// Product page URL
    url: String,

    /// Allergen to pay special attention to (repeatable)
    #[arg(long = "allergen", value_name = "NAME")]
    allergens: Vec<String>,

    /// Ignore any cached analysis
    #[arg(long)]
    force_refresh: bool,

    /// Also extract review insights
    #[arg(long)]
    reviews: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,product_safety=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let store = open_store(&config).await?;
    let fetcher = Arc::new(
        HttpPageFetcher::new()
            .context("Failed to create HTTP client")?
            .rate_limited(config.fetch_requests_per_second),
    );

    let mut analyst = OpenAiAnalyst::new(config.openai_api_key.clone()).with_model(&config.openai_model);
    if let Some(base_url) = &config.openai_base_url {
        analyst = analyst.with_base_url(base_url);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling analysis");
            on_ctrl_c.cancel();
        }
    });

    let pipeline = config.pipeline();
    let analyzer = Analyzer::with_config(
        store.clone(),
        fetcher.clone(),
        analyst.clone(),
        pipeline.clone(),
    );

    let mut request = AnalysisRequest::new(&cli.url).with_allergen_profile(cli.allergens);
    if cli.force_refresh {
        request = request.force_refresh();
    }

    let response = analyzer
        .analyze_with_cancel(&request, &cancel)
        .await
        .with_context(|| format!("Analysis failed for {}", cli.url))?;

    let output = if cli.reviews {
        let extractor = ReviewInsightsExtractor::with_config(store, fetcher, analyst, pipeline);
        let reviews = extractor
            .get_review_insights_with_cancel(&Fingerprint::of(&cli.url), cli.force_refresh, &cancel)
            .await
            .with_context(|| format!("Review insights failed for {}", cli.url))?;
        serde_json::json!({ "analysis": response, "reviews": reviews })
    } else {
        serde_json::to_value(&response).context("Failed to serialize response")?
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize output")?
    );
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store(config: &Config) -> Result<Arc<dyn KnowledgeStore>> {
    use product_safety::SqliteStore;

    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database");
            let store = SqliteStore::new(url)
                .await
                .context("Failed to open SQLite database")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(config: &Config) -> Result<Arc<dyn KnowledgeStore>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL set but built without the sqlite feature; using in-memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}
