mod classify;
mod config;
mod crawler;
mod db;
mod fetch;
mod hearings;
mod llm;
mod search;
mod store;
mod summarize;
#[cfg(test)]
mod testing;
mod tokens;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tracing::warn;

use classify::{ClassificationResult, Classifier, Topic};
use config::Settings;
use crawler::{CrawlConfig, CrawlOutcome, Crawler};
use fetch::HttpFetcher;
use hearings::committee::CommitteeRegistry;
use hearings::HearingScraper;
use llm::OpenAiModel;
use search::{SearchEngine, ValueSerp};
use store::ContentStore;
use summarize::Summarizer;
use tokens::Tokenizer;

#[derive(Parser)]
#[command(
    name = "civic_crawler",
    about = "Crawl government sites, classify ordinance pages and extract hearing records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TopicArgs {
    /// Policy issue, e.g. "short term rental"
    #[arg(long)]
    issue: String,
    /// City or county name
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
}

impl From<TopicArgs> for Topic {
    fn from(args: TopicArgs) -> Self {
        Topic {
            issue: args.issue,
            city_county: args.city,
            state: args.state,
        }
    }
}

#[derive(Args, Clone)]
struct CrawlArgs {
    /// Link depth to follow from each seed (PDFs are always captured)
    #[arg(short, long, default_value = "0")]
    depth: usize,
    /// Seconds to wait before each request
    #[arg(long, default_value = "1.0")]
    delay: f64,
    /// Content store root
    #[arg(short, long, default_value = "crawled_pages")]
    out: PathBuf,
}

#[derive(Args, Clone)]
struct SummaryArgs {
    /// Concatenated text of every positive file
    #[arg(long, default_value = "impacting_files.txt")]
    combined: PathBuf,
    #[arg(long, default_value = "business_impact_summary.txt")]
    summary: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print ordinance search results for a topic
    Search {
        #[command(flatten)]
        topic: TopicArgs,
    },
    /// Crawl seed URLs into the content store
    Crawl {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        crawl: CrawlArgs,
    },
    /// Classify every stored document against a topic and write the report
    Classify {
        #[arg(long, default_value = "crawled_pages")]
        dir: PathBuf,
        #[arg(long, default_value = "business_impact_assessment.csv")]
        report: PathBuf,
        #[command(flatten)]
        topic: TopicArgs,
    },
    /// Summarize the positively classified documents of a report
    Summarize {
        #[arg(long, default_value = "business_impact_assessment.csv")]
        report: PathBuf,
        #[command(flatten)]
        output: SummaryArgs,
        #[command(flatten)]
        topic: TopicArgs,
    },
    /// Search + crawl + classify + summarize in one pipeline
    Run {
        #[command(flatten)]
        topic: TopicArgs,
        #[command(flatten)]
        crawl: CrawlArgs,
        #[arg(long, default_value = "business_impact_assessment.csv")]
        report: PathBuf,
        #[command(flatten)]
        output: SummaryArgs,
    },
    /// Extract hearing records from a JSON file (rewritten in place by default)
    Hearings {
        input: PathBuf,
        /// Write results here instead of the input file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Page fetch attempts per hearing
        #[arg(long, default_value_t = hearings::DEFAULT_RETRIES)]
        retries: usize,
    },
    /// Committee registry maintenance
    Committees {
        #[command(subcommand)]
        command: CommitteeCommands,
    },
}

#[derive(Subcommand)]
enum CommitteeCommands {
    /// Replace the registry with a JSON array of committees
    Import { file: PathBuf },
    /// Show registry counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Search { topic } => {
            let engine = ValueSerp::new(settings.valueserp_api_key()?);
            let links = engine.ordinance_links(&topic.into()).await?;
            for link in &links {
                println!("{}", link);
            }
            println!("{} results", links.len());
            Ok(())
        }
        Commands::Crawl { urls, crawl } => {
            crawl_seeds(&urls, &crawl).await?;
            Ok(())
        }
        Commands::Classify { dir, report, topic } => {
            let api_key = settings.openai_api_key()?;
            classify_documents(&settings, api_key, &dir, &report, &topic.into()).await?;
            Ok(())
        }
        Commands::Summarize { report, output, topic } => {
            let api_key = settings.openai_api_key()?;
            let results = classify::read_report(&report)?;
            summarize_positive(&settings, api_key, &results, &output, &topic.into()).await
        }
        Commands::Run { topic, crawl, report, output } => {
            // both keys up front so a missing one fails before any crawling
            let api_key = settings.openai_api_key()?;
            let engine = ValueSerp::new(settings.valueserp_api_key()?);
            let topic: Topic = topic.into();

            let links = engine.ordinance_links(&topic).await?;
            println!("Found {} search results", links.len());
            if links.is_empty() {
                println!("Nothing to crawl.");
                return Ok(());
            }

            let t_crawl = Instant::now();
            crawl_seeds(&links, &crawl).await?;
            println!("Crawled in {}", format_duration(t_crawl.elapsed()));

            let t_classify = Instant::now();
            let results =
                classify_documents(&settings, api_key.clone(), &crawl.out, &report, &topic).await?;
            println!("Classified in {}", format_duration(t_classify.elapsed()));

            summarize_positive(&settings, api_key, &results, &output, &topic).await
        }
        Commands::Hearings { input, output, retries } => {
            let api_key = settings.openai_api_key()?;
            let conn = db::connect(Path::new(&settings.committee_db))?;
            db::init_schema(&conn)?;
            let registry = db::SqliteRegistry::new(conn);
            if registry.committees(None)?.is_empty() {
                warn!("Committee registry is empty; run 'committees import' first");
            }

            let fetcher = HttpFetcher::new()?;
            let model = OpenAiModel::new(api_key, settings.extract_model.as_str());
            let output = output.unwrap_or_else(|| input.clone());
            let summary = HearingScraper::new(&fetcher, &model, &registry)
                .with_retries(retries)
                .process_hearings(&input, &output)
                .await?;
            summary.print();
            println!("Results saved to {}", output.display());
            Ok(())
        }
        Commands::Committees { command } => {
            let conn = db::connect(Path::new(&settings.committee_db))?;
            db::init_schema(&conn)?;
            match command {
                CommitteeCommands::Import { file } => {
                    let committees = db::load_committees_file(&file)?;
                    let subcommittees = db::import_committees(&conn, &committees)?;
                    println!(
                        "Imported {} committees and {} subcommittees into {}",
                        committees.len(),
                        subcommittees,
                        settings.committee_db
                    );
                }
                CommitteeCommands::Stats => {
                    let s = db::get_stats(&conn)?;
                    println!("Committees:    {}", s.committees);
                    println!("Subcommittees: {}", s.subcommittees);
                    println!("Last import:   {}", s.last_import.as_deref().unwrap_or("never"));
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn crawl_seeds(urls: &[String], args: &CrawlArgs) -> anyhow::Result<CrawlOutcome> {
    let fetcher = HttpFetcher::new()?;
    let store = ContentStore::new(&args.out);
    let config = CrawlConfig {
        max_depth: args.depth,
        delay: Duration::from_secs_f64(args.delay.max(0.0)),
    };

    println!("Crawling {} seed URLs (depth {})...", urls.len(), args.depth);
    let outcome = Crawler::new(&fetcher, &store, config).crawl(urls).await;
    println!(
        "Crawled {} pages, stored {} documents, found {} PDFs under {}",
        outcome.visited.len(),
        outcome.stored,
        outcome.pdf_links.len(),
        store.root().display()
    );
    Ok(outcome)
}

async fn classify_documents(
    settings: &Settings,
    api_key: String,
    dir: &Path,
    report: &Path,
    topic: &Topic,
) -> anyhow::Result<Vec<ClassificationResult>> {
    let model = OpenAiModel::new(api_key, settings.classify_model.as_str());
    let tokenizer = Tokenizer::cl100k()?;
    let (results, total_tokens) = Classifier::new(&model, &tokenizer)
        .process_directory(dir, topic)
        .await?;
    classify::write_report(&results, report)?;

    let positive = results.iter().filter(|r| r.is_positive()).count();
    println!("Files that impact the business: {} out of {}", positive, results.len());
    println!("Total tokens: {}", total_tokens);
    println!("Report written to {}", report.display());
    Ok(results)
}

async fn summarize_positive(
    settings: &Settings,
    api_key: String,
    results: &[ClassificationResult],
    output: &SummaryArgs,
    topic: &Topic,
) -> anyhow::Result<()> {
    let combined = summarize::concatenate_positive(results);
    if combined.trim().is_empty() {
        println!("No files impact the business; nothing to summarize.");
        return Ok(());
    }
    summarize::write_text(&output.combined, &combined)?;

    let model = OpenAiModel::new(api_key, settings.extract_model.as_str());
    let tokenizer = Tokenizer::cl100k()?;
    match Summarizer::new(&model, &tokenizer).summarize(&combined, topic).await? {
        Some(summary) => {
            summarize::write_text(&output.summary, &summary)?;
            println!("Summary written to {}", output.summary.display());
        }
        None => println!("Nothing to summarize."),
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
