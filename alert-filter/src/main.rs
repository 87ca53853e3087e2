use alert_filter::{
    export_json, AlertWorkflow, BatchOrchestrator, CandidateStore, ChatCompletionClient,
    CompletionClient, FilterConfig, FilterStats,
};
use clap::{Parser, Subcommand};
use email_ingestion::{EmailIngester, EmailIngesterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "alert-filter",
    version,
    about = "Fetch Google Alert emails and keep the articles worth reading"
)]
struct Cli {
    /// SQLite database URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch recent alert emails and store their articles
    Fetch {
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
    /// Classify unclassified articles with the LLM
    Filter {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print the report of selected articles
    Report {
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Also write the selected articles to this JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Print database statistics
    Stats,
    /// Fetch, filter and report in one go
    Run {
        #[arg(long, default_value_t = 1)]
        days: u32,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = FilterConfig::from_env()?;
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    let workflow = AlertWorkflow::connect(&config.database_url).await?;

    match cli.command {
        Command::Fetch { days } => {
            fetch(&workflow, &config, days).await?;
        }
        Command::Filter { limit, batch_size } => {
            let stats = filter_articles(&workflow, &mut config, limit, batch_size).await?;
            print_stats(&stats);
        }
        Command::Report { days, export } => {
            let report = workflow.report(days).await?;
            println!("{}", report.render());
            if let Some(path) = export {
                let selected = workflow.store().selected_articles(days).await?;
                export_json(&path, &selected).await?;
                println!("Exported {} articles to {}", selected.len(), path.display());
            }
        }
        Command::Stats => {
            let overview = workflow.overview().await?;
            println!("Emails: {}", overview.total_emails);
            println!("Articles: {}", overview.articles.total_articles);
            println!("Filtered: {}", overview.articles.filtered_articles);
            println!("Selected: {}", overview.articles.selected_articles);
            println!("Filter rate: {:.2}%", overview.articles.filter_rate * 100.0);
            println!("Selection rate: {:.2}%", overview.articles.selection_rate * 100.0);
        }
        Command::Run { days, limit, batch_size } => {
            // Check credentials before touching the mailbox
            config.llm.require_api_key()?;
            fetch(&workflow, &config, days).await?;
            let stats = filter_articles(&workflow, &mut config, Some(limit), batch_size).await?;
            print_stats(&stats);
            println!("{}", workflow.report(days).await?.render());
        }
    }

    Ok(())
}

async fn fetch(workflow: &AlertWorkflow, config: &FilterConfig, days: u32) -> anyhow::Result<()> {
    let imap = config.require_imap()?;
    let ingester_config =
        EmailIngesterConfig::from_uri(&imap.uri, &imap.password)?.with_sender(imap.sender.clone());
    let ingester = EmailIngester::with_config(ingester_config);

    let summary = workflow.fetch_and_store(&ingester, days).await?;
    println!(
        "Processed {} alert emails: {} new emails, {} new articles",
        summary.emails_seen, summary.new_emails, summary.new_articles
    );
    Ok(())
}

async fn filter_articles(
    workflow: &AlertWorkflow,
    config: &mut FilterConfig,
    limit: Option<usize>,
    batch_size: Option<usize>,
) -> anyhow::Result<FilterStats> {
    if let Some(batch_size) = batch_size {
        config.batch.batch_size = batch_size;
    }
    config.validate()?;

    let client: Arc<dyn CompletionClient> =
        Arc::new(ChatCompletionClient::new(config.llm.clone())?);
    let store: Arc<dyn CandidateStore> = workflow.store();
    info!("Using {}", client.client_name());

    let orchestrator = BatchOrchestrator::new(store, client, config.batch.clone());
    Ok(orchestrator.run(limit).await?)
}

fn print_stats(stats: &FilterStats) {
    println!("Filtering finished:");
    println!("  - processed: {}/{}", stats.processed, stats.total);
    println!("  - selected: {}", stats.selected);
    println!("  - rejected: {}", stats.rejected);
    if stats.failed > 0 {
        println!("  - failed: {}", stats.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_is_read_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DATABASE_URL=sqlite://from-env-file.db\n").unwrap();
        dotenvy::from_path_override(&path).unwrap();

        let cli = Cli::try_parse_from(["alert-filter", "stats"]).unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("sqlite://from-env-file.db"));

        let args = ["alert-filter", "stats", "--database-url", "sqlite::memory:"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
    }
}
