use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "psm-cli")]
#[command(about = "Peer Search Manager CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "PSM_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a search
    Search {
        #[arg(value_name = "QUERY")]
        text: String,

        /// Network-side timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        #[arg(short = 'r', long)]
        response_limit: Option<usize>,

        /// Search only these users
        #[arg(short, long, value_delimiter = ',')]
        users: Vec<String>,

        /// Search a chat room instead of the whole network
        #[arg(long, conflicts_with = "users")]
        room: Option<String>,

        /// Poll until the search completes and print the final record
        #[arg(short, long)]
        wait: bool,
    },

    /// List searches
    List {
        #[arg(short = 'a', long)]
        active_only: bool,

        #[arg(short = 'q', long)]
        search_text: Option<String>,
    },

    /// Get search details
    Get {
        #[arg(value_name = "SEARCH_ID")]
        id: Uuid,

        #[arg(short = 'r', long)]
        include_responses: bool,
    },

    /// Page through a search's responses
    Responses {
        #[arg(value_name = "SEARCH_ID")]
        id: Uuid,

        #[arg(short, long, default_value = "0")]
        skip: usize,

        #[arg(short, long, default_value = "100")]
        take: usize,
    },

    /// Stop an in-flight search
    Stop {
        #[arg(value_name = "SEARCH_ID")]
        id: Uuid,
    },

    /// Delete a finished search
    Delete {
        #[arg(value_name = "SEARCH_ID")]
        id: Uuid,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = format!("{}/api/v0/searches", cli.endpoint);

    match cli.command {
        Commands::Search {
            text,
            timeout,
            response_limit,
            users,
            room,
            wait,
        } => {
            let scope = match (room, users.is_empty()) {
                (Some(name), _) => json!({ "type": "room", "name": name }),
                (None, false) => json!({ "type": "user", "usernames": users }),
                (None, true) => json!({ "type": "network" }),
            };

            let mut options = serde_json::Map::new();
            if let Some(secs) = timeout {
                options.insert("search_timeout_ms".to_string(), json!(secs * 1000));
            }
            if let Some(limit) = response_limit {
                options.insert("response_limit".to_string(), json!(limit));
            }

            let mut body = json!({ "search_text": text, "scope": scope });
            if !options.is_empty() {
                body["options"] = serde_json::Value::Object(options);
            }

            let response = client.post(&base).json(&body).send().await?;
            let search = print_json(response).await?;

            if wait {
                let id = search["id"]
                    .as_str()
                    .context("server response did not contain a search id")?;
                let finished = wait_for_search(&client, &base, id).await?;
                println!("{}", serde_json::to_string_pretty(&finished)?);
            }
        }

        Commands::List {
            active_only,
            search_text,
        } => {
            let mut request = client.get(&base);
            if active_only {
                request = request.query(&[("active_only", "true")]);
            }
            if let Some(text) = search_text {
                request = request.query(&[("search_text", text)]);
            }

            print_json(request.send().await?).await?;
        }

        Commands::Get {
            id,
            include_responses,
        } => {
            let response = client
                .get(format!("{}/{}", base, id))
                .query(&[("include_responses", include_responses)])
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Responses { id, skip, take } => {
            let response = client
                .get(format!("{}/{}/responses", base, id))
                .query(&[("skip", skip), ("take", take)])
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Stop { id } => {
            let response = client.put(format!("{}/{}", base, id)).send().await?;
            match response.status() {
                StatusCode::NO_CONTENT => println!("Search {} stopping", id),
                StatusCode::NOT_MODIFIED => println!("Search {} is not in progress", id),
                status => bail!("unexpected status {}", status),
            }
        }

        Commands::Delete { id } => {
            let response = client.delete(format!("{}/{}", base, id)).send().await?;
            if response.status() == StatusCode::NO_CONTENT {
                println!("Search {} deleted", id);
            } else {
                print_json(response).await?;
            }
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;
            print_json(response).await?;
        }
    }

    Ok(())
}

async fn print_json(response: reqwest::Response) -> anyhow::Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("request failed with status {}", status);
    }
    Ok(body)
}

async fn wait_for_search(client: &Client, base: &str, id: &str) -> anyhow::Result<serde_json::Value> {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        ticker.tick().await;

        let search: serde_json::Value = client
            .get(format!("{}/{}", base, id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !search["ended_at"].is_null() {
            return Ok(search);
        }
    }
}
