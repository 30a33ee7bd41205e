//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::config::Config;
use crate::error::{GmailError, Result};
use crate::models::{Email, Label, Token};
use crate::services::{AccountHealth, AccountStatistics, ListOptions, StatisticsOptions};

#[derive(Parser, Debug)]
#[command(name = "gmail-client")]
#[command(version = "0.1.0")]
#[command(about = "Resilient Gmail REST client", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-client/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the OAuth consent URL
    Auth {
        /// Opaque value echoed back on the redirect
        #[arg(long)]
        state: Option<String>,
    },

    /// Exchange an authorization code for tokens and cache them
    ExchangeCode {
        /// Code from the OAuth redirect
        code: String,
    },

    /// List messages
    ListMessages {
        /// Gmail search query (e.g. "is:unread from:github.com")
        #[arg(short, long)]
        query: Option<String>,

        /// Restrict to a label ID (repeatable)
        #[arg(short, long)]
        label: Vec<String>,

        /// Page size
        #[arg(short, long)]
        max: Option<u32>,

        /// Fetch subject and sender for each message
        #[arg(long)]
        full: bool,
    },

    /// List labels
    ListLabels {
        /// Include labels hidden from the label list
        #[arg(long)]
        all: bool,
    },

    /// Show account statistics
    Stats {
        /// Tolerate failures and skip the today query
        #[arg(long)]
        background: bool,
    },

    /// Probe API connectivity
    Health,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed:>4}] {msg}") {
        pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Config file (or defaults) with OAuth client settings filled from the environment
pub async fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load(path).await?;
    config.oauth.merge_env();
    Ok(config)
}

pub async fn load_token(path: &Path) -> Result<Option<Token>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path).await?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub async fn save_token(path: &Path, token: &Token) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_string_pretty(token)?).await?;
    debug!("Cached token at {:?}", path);
    Ok(())
}

/// Connected client using the cached token, refreshing (and re-caching) it if expired
async fn authenticated_client(cli: &Cli) -> Result<GmailClient> {
    let config = load_config(&cli.config).await?;
    let token = load_token(&cli.token_cache)
        .await?
        .ok_or_else(GmailError::missing_token)?;

    let client = GmailClient::connect(config)?;
    let valid = client.auth().ensure_valid(&token).await?;
    if valid != token {
        save_token(&cli.token_cache, &valid).await?;
    }
    Ok(client)
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Auth { state } => {
            let config = load_config(&cli.config).await?;
            let client = GmailClient::connect(config)?;
            let url = client.auth().authorization_url(&[], state.as_deref())?;

            println!("Open this URL in a browser and approve access:\n\n{}\n", url);
            println!("Then run: gmail-client exchange-code <CODE>");
            Ok(())
        }

        Commands::ExchangeCode { code } => {
            let config = load_config(&cli.config).await?;
            let client = GmailClient::connect(config)?;
            let token = client.auth().exchange_code(code).await?;
            save_token(&cli.token_cache, &token).await?;

            println!("Authenticated. Token cached at: {:?}", cli.token_cache);
            Ok(())
        }

        Commands::ListMessages {
            query,
            label,
            max,
            full,
        } => {
            let client = authenticated_client(&cli).await?;
            let options = ListOptions {
                query: query.clone(),
                label_ids: label.clone(),
                max_results: *max,
                full_details: *full,
                ..ListOptions::default()
            };

            let pb = spinner("Fetching messages...");
            let page = client.messages().list_page(&options).await;
            pb.finish_and_clear();
            let page = page?;

            print_messages(&page.messages);
            if let Some(estimate) = page.result_size_estimate {
                println!("\n{} shown, about {} matching", page.messages.len(), estimate);
            }
            if let Some(token) = &page.next_page_token {
                info!(page_token = %token, "More messages available");
            }
            Ok(())
        }

        Commands::ListLabels { all } => {
            let client = authenticated_client(&cli).await?;
            let labels = if *all {
                client.labels().list().await?
            } else {
                client.labels().visible_labels().await?
            };
            print_labels(&labels);
            Ok(())
        }

        Commands::Stats { background } => {
            let client = authenticated_client(&cli).await?;
            let mut options = StatisticsOptions::from_config(&client.config().performance);
            options.background_mode = *background;

            let pb = spinner("Collecting statistics...");
            let stats = client.statistics().account_statistics_with(&options).await;
            pb.finish_and_clear();

            print_statistics(&stats?);
            Ok(())
        }

        Commands::Health => {
            let client = authenticated_client(&cli).await?;
            let health = client.statistics().account_health().await;
            print_health(&health);
            if health.connected {
                Ok(())
            } else {
                Err(GmailError::Network(format!("Account is {}", health.status)))
            }
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(GmailError::Config(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                )));
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - oauth.client_id / oauth.client_secret (or GMAIL_CLIENT_ID / GMAIL_CLIENT_SECRET)");
            println!("  - performance.max_concurrent_requests: Parallel detail fetches");
            println!("  - pagination.default_page_size: Messages per page");
            Ok(())
        }
    }
}

fn print_messages(messages: &[Email]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    println!("{:<18} {:<30} {:<50}", "ID", "From", "Subject");
    println!("{}", "-".repeat(100));
    for email in messages {
        let from = email
            .from
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default();
        let subject = email
            .subject
            .as_deref()
            .or(email.snippet.as_deref())
            .unwrap_or("");
        let marker = if email.is_unread() { "*" } else { " " };
        println!(
            "{}{:<17} {:<30} {:<50}",
            marker,
            truncate_string(&email.id, 17),
            truncate_string(&from, 30),
            truncate_string(subject, 50)
        );
    }
}

fn print_labels(labels: &[Label]) {
    println!("{:<24} {:<40} {:<8} {:>8}", "ID", "Name", "Type", "Unread");
    println!("{}", "-".repeat(83));
    for label in labels {
        println!(
            "{:<24} {:<40} {:<8} {:>8}",
            truncate_string(&label.id, 24),
            truncate_string(&label.name, 40),
            label.label_type.as_str(),
            label
                .messages_unread
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

fn print_statistics(stats: &AccountStatistics) {
    let show = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());

    println!("\n========================================");
    println!("Account Statistics");
    println!("========================================");
    println!(
        "Unread:          {}{}",
        show(stats.unread_count),
        if stats.unread_estimated { " (estimated)" } else { "" }
    );
    println!("Today:           {}", show(stats.today_count));
    println!("Labels:          {}", show(stats.label_count));
    println!("Total (approx):  {}", show(stats.total_estimate));
    println!("API calls:       {}", stats.api_calls_made);
    if stats.partial_failure {
        println!("Partial failure:");
        for error in &stats.errors {
            println!("  - {}", error);
        }
    }
    println!("========================================");
}

fn print_health(health: &AccountHealth) {
    println!("Status:    {}", health.status);
    println!("Connected: {}", health.connected);
    if let Some(remaining) = health.quota_remaining {
        println!("Quota remaining: {}", remaining);
    }
    for error in &health.errors {
        println!("  - {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a very long subject line", 10), "a very ...");
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_parse_list_messages() {
        let cli = Cli::try_parse_from([
            "gmail-client",
            "list-messages",
            "--query",
            "is:unread",
            "--label",
            "INBOX",
            "--max",
            "5",
            "--full",
        ])
        .unwrap();

        match cli.command {
            Commands::ListMessages { query, label, max, full } => {
                assert_eq!(query.as_deref(), Some("is:unread"));
                assert_eq!(label, vec!["INBOX"]);
                assert_eq!(max, Some(5));
                assert!(full);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token.json");

        assert!(load_token(&path).await.unwrap().is_none());

        let token = Token::new("access").with_refresh_token("refresh");
        save_token(&path, &token).await.unwrap();
        assert_eq!(load_token(&path).await.unwrap(), Some(token));
    }
}
