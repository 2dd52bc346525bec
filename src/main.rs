//! aliexpress-linker
//!
//! Command-line front end: feed it chat messages, get affiliate replies back.

use aliexpress_linker::fetch::PageFetcher;
use aliexpress_linker::html_extractor::ProductPageExtractor;
use aliexpress_linker::links::{
    classify, clean_product_url, extract_product_id, normalize_scheme, offer_target_url, LinkKind,
};
use aliexpress_linker::webdriver::WebDriverFetcher;
use aliexpress_linker::{Linker, Offer, Reply, Settings};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Delay before the first cache sweep.
const JANITOR_FIRST_RUN: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "aliexpress-linker")]
#[command(author, version, about = "Affiliate links for AliExpress products shared in chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Commands {
    /// Treat the arguments as one chat message and print the replies
    Link {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Print replies as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Read chat messages from stdin, one per line, and answer each
    Relay {
        /// Print replies as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Look up one product and print its details as JSON
    Product {
        /// Product id
        id: String,
    },

    /// Print the offer target URLs for a product link
    Offers { url: String },

    /// Render a product page in a headless browser and print price and coins discount
    Coins {
        url: String,

        /// Seconds to let the page settle before reading it
        #[arg(long, default_value_t = 5)]
        settle_secs: u64,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "aliexpress_linker=debug"
    } else {
        "aliexpress_linker=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_reply(reply: &Reply, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reply)?);
        return Ok(());
    }
    if let Some(photo) = &reply.photo {
        println!("[photo] {}", photo);
    }
    println!("{}", reply.text);
    for row in &reply.buttons {
        let labels: Vec<String> = row
            .iter()
            .map(|b| format!("[{}]({})", b.text, b.url))
            .collect();
        println!("{}", labels.join("  "));
    }
    println!("---");
    Ok(())
}

async fn relay(linker: Arc<Linker>, json: bool, ttl: Duration) -> Result<()> {
    let janitor = Arc::clone(&linker).spawn_janitor(JANITOR_FIRST_RUN, ttl);
    info!("Relay started, reading messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        for reply in linker.handle_message(&line).await {
            print_reply(&reply, json)?;
        }
    }

    janitor.abort();
    info!("Relay input closed");
    Ok(())
}

fn offer_targets(raw: &str) -> Result<()> {
    let url = normalize_scheme(raw).with_context(|| format!("not an AliExpress URL: {}", raw))?;
    match classify(&url) {
        LinkKind::Product => {}
        LinkKind::Short => bail!("short links must be resolved first: {}", url),
        LinkKind::Other => bail!("not an AliExpress product URL: {}", url),
    }
    let id = extract_product_id(&url).with_context(|| format!("no product id in {}", url))?;
    let base = clean_product_url(&url, &id).with_context(|| format!("cannot rebuild {}", url))?;
    for offer in Offer::ALL {
        println!("{}\t{}", offer.key(), offer_target_url(&base, &offer.params()));
    }
    Ok(())
}

async fn coins(url: &str, settle: Duration, settings: &Settings) -> Result<()> {
    let fetcher = WebDriverFetcher::new(settings.webdriver_url.clone()).with_settle(settle);
    let page = fetcher
        .fetch(url)
        .await
        .with_context(|| format!("failed to render {}", url))?;
    let scraped = ProductPageExtractor::extract(&page.body);
    if scraped.price.is_none() {
        warn!("No price found on {}", page.url);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "url": page.url,
            "title": scraped.title,
            "price": scraped.price,
            "coins_discount": scraped.coins_discount,
        }))?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let settings = cli.settings;
    match cli.command {
        Commands::Link { message, json } => {
            let linker = Arc::new(Linker::from_settings(&settings).context("failed to set up linker")?);
            for reply in linker.handle_message(&message.join(" ")).await {
                print_reply(&reply, json)?;
            }
        }
        Commands::Relay { json } => {
            let linker = Arc::new(Linker::from_settings(&settings).context("failed to set up linker")?);
            relay(linker, json, settings.cache_ttl()).await?;
        }
        Commands::Product { id } => {
            let linker = Linker::from_settings(&settings).context("failed to set up linker")?;
            let details = linker.catalog().lookup(id.trim()).await;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Commands::Offers { url } => offer_targets(&url)?,
        Commands::Coins { url, settle_secs } => {
            coins(&url, Duration::from_secs(settle_secs), &settings).await?
        }
    }

    Ok(())
}
