use chrono::Local;
use clap::Parser;
use news_sift::cli::{Cli, Command, SearchArgs, SiteArgs};
use news_sift::models::SearchRequest;
use news_sift::outputs::{render_console, write_results};
use news_sift::pipeline::SearchPipeline;
use news_sift::registry::Registry;
use news_sift::transport::HttpTransport;
use news_sift::utils::ensure_writable_dir;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(sites = %args.sites.display(), ?args.command, "Parsed CLI arguments");

    let outcome = match args.command {
        Command::Search(search) => run_search(&args.sites, search).await,
        Command::Add(site) => add_site(&args.sites, site),
        Command::Del(site) => delete_site(&args.sites, site),
    };

    let elapsed = start_time.elapsed();
    match outcome {
        Ok(()) => {
            info!(?elapsed, "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, ?elapsed, "Execution failed");
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "info", skip_all, fields(keyword = %args.keyword))]
async fn run_search(sites: &Path, args: SearchArgs) -> Result<(), Box<dyn Error>> {
    let registry = Registry::load(sites)?;

    let mut config = registry.settings().clone();
    if let Some(n) = args.concurrency {
        config.concurrent_requests = n;
    }
    if let Some(secs) = args.run_timeout {
        config.run_timeout = Some(secs);
    }

    let mut request = SearchRequest::new(args.keyword).case_sensitive(args.case_sensitive);
    request.start_date = args.start_date;
    request.end_date = args.end_date;

    // Early check: fail before fetching anything if results cannot be saved
    ensure_writable_dir(&args.output_dir).await?;

    let transport = HttpTransport::new(&config.user_agent)?;
    let pipeline = SearchPipeline::new(transport, &config)?;
    let result = pipeline.search(&request, registry.sources()).await?;

    print!("{}", render_console(&result));

    if result.is_empty() {
        info!("No articles matched the search");
        return Ok(());
    }
    if let Some(path) = write_results(&result.records, &request.keyword, args.format, &args.output_dir, Local::now()).await? {
        println!("\nSaved {} article(s) to {}", result.records.len(), path.display());
    }
    Ok(())
}

fn add_site(sites: &Path, site: SiteArgs) -> Result<(), Box<dyn Error>> {
    let mut registry = Registry::load(sites)?;
    registry.add(&site.name, &site.url)?;
    println!("Added site: {}", site.name);
    Ok(())
}

fn delete_site(sites: &Path, site: SiteArgs) -> Result<(), Box<dyn Error>> {
    let mut registry = Registry::load(sites)?;
    registry.delete(&site.name, &site.url)?;
    println!("Deleted site: {}", site.name);
    Ok(())
}
