//! talkwalk: AI investment "talk vs walk" analysis CLI
//!
//! Runs the locate → analyze → synthesize pipeline over a list of
//! companies and writes a markdown report.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use talkwalk::config::resolve_api_key;
use talkwalk::report::{render_report, save_report, usage_summary};
use talkwalk::{AnthropicClient, CacheStore, Config, FileCache, Orchestrator};

const DEFAULT_COMPANIES: &[&str] = &["Oracle", "IBM", "Cisco", "SAP", "Walmart", "Salesforce"];

/// AI investment analysis: talk vs walk
#[derive(Parser)]
#[command(name = "talkwalk")]
#[command(version = talkwalk::version::PKG_VERSION)]
#[command(about = "Compare what companies say about AI with what they spend on it")]
struct Args {
    /// Companies to analyze (default: Oracle IBM Cisco SAP Walmart Salesforce)
    #[arg(short, long, num_args = 1..)]
    companies: Option<Vec<String>>,

    /// Report file name (default: ai_investment_analysis_<timestamp>.md)
    #[arg(short, long)]
    output: Option<String>,

    /// Config file (default: ./talkwalk.toml, then ~/.config/talkwalk/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum tasks in flight per phase (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Reduce output verbosity
    #[arg(short, long)]
    quiet: bool,

    /// Clear the cache before running
    #[arg(long)]
    clear_cache: bool,

    /// Clear the cache and exit
    #[arg(long)]
    clear_cache_only: bool,

    /// Remove expired cache entries (exits unless companies or --clear-cache are given)
    #[arg(long)]
    clear_expired_cache: bool,

    /// Neither read nor write the cache for this run
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialise tracing (default: info, warn with --quiet; override with RUST_LOG).
    let default_filter = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(n) = args.concurrency {
        config.limits.concurrency = n;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    // Cache maintenance doesn't need an API key.
    if args.clear_cache_only || args.clear_expired_cache || args.clear_cache {
        let cache = FileCache::open(&config.cache.dir)?;

        if args.clear_cache_only {
            let removed = cache.clear_all()?;
            println!("cleared {removed} cache entries");
            return Ok(());
        }

        if args.clear_expired_cache {
            let removed = cache.clear_expired()?;
            println!("cleared {removed} expired cache entries");
            if args.companies.is_none() && !args.clear_cache {
                return Ok(());
            }
        }

        if args.clear_cache {
            let removed = cache.clear_all()?;
            tracing::info!(removed, "cleared cache");
        }
    }

    let companies = args
        .companies
        .unwrap_or_else(|| DEFAULT_COMPANIES.iter().map(|c| c.to_string()).collect());

    let api_key = resolve_api_key(args.api_key.as_deref())?;
    let client = Arc::new(AnthropicClient::new(api_key));
    let orchestrator = Orchestrator::from_config(config, client);

    let summary = orchestrator.run(&companies).await?;

    let config = orchestrator.config();
    let rates = config.rate_table();
    let body = render_report(&summary, &rates);
    let path = save_report(&config.output.dir, args.output.as_deref(), &body)?;

    println!("report saved to: {}", path.display());
    println!("time elapsed: {:.1} seconds", summary.elapsed.as_secs_f64());
    if !summary.excluded.is_empty() {
        println!("excluded companies:");
        for e in &summary.excluded {
            println!("  {} ({} phase, {}): {}", e.company, e.phase, e.kind, e.reason);
        }
    }
    if !args.quiet {
        println!();
        println!("{}", usage_summary(&summary.usage, &rates));
    }

    Ok(())
}
