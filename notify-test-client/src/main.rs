use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;

#[derive(Parser)]
#[command(name = "notify-test-client")]
#[command(about = "Notification Stream Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test stream registration and disconnect cleanup
    ConnectionLifecycle,
    /// Test that a notification reaches its recipient and nobody else
    TargetedNotify,
    /// Test that one user with several open streams gets one copy per stream
    MultiConnection,
    /// Test that an announcement reaches every connected client
    Broadcast,
    /// Test that a topic-scoped announcement stays within its topic
    TopicScope,
    /// Run every scenario
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    println!("{} Checking backend at {}...", "→".blue(), cli.base_url);
    let client = reqwest::Client::new();
    let api_client = ApiClient::new(client, cli.base_url.clone());
    let connections = api_client
        .connection_count()
        .await
        .context("Backend is not reachable; is the server running?")?;
    println!(
        "{} Backend reachable ({} live connection(s))",
        "✓".green(),
        connections
    );

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionLifecycle => {
            results.push(scenarios::connection_lifecycle(&api_client, &cli.base_url).await?);
        }
        ScenarioChoice::TargetedNotify => {
            results.push(scenarios::targeted_notify(&api_client, &cli.base_url).await?);
        }
        ScenarioChoice::MultiConnection => {
            results.push(scenarios::multi_connection_fanout(&api_client, &cli.base_url).await?);
        }
        ScenarioChoice::Broadcast => {
            results.push(scenarios::broadcast(&api_client, &cli.base_url).await?);
        }
        ScenarioChoice::TopicScope => {
            results.push(scenarios::topic_scope(&api_client, &cli.base_url).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::connection_lifecycle(&api_client, &cli.base_url).await?);
            results.push(scenarios::targeted_notify(&api_client, &cli.base_url).await?);
            results.push(scenarios::multi_connection_fanout(&api_client, &cli.base_url).await?);
            results.push(scenarios::broadcast(&api_client, &cli.base_url).await?);
            results.push(scenarios::topic_scope(&api_client, &cli.base_url).await?);
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
