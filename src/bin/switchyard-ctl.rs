use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use switchyard::config::{load_config, DEFAULT_ADMIN_LISTEN};

#[derive(Parser)]
#[command(name = "switchyard-ctl")]
#[command(about = "Admin client for a running switchyard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = format!("http://{}", DEFAULT_ADMIN_LISTEN))]
    url: String,

    /// Bearer credential listed in admin.remote.access_control
    #[arg(short, long, env = "SWITCHYARD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active config
    Config,
    /// Replace the active config with a JSON or TOML file
    Load { file: PathBuf },
    /// List registered module ids
    Modules,
    /// Show version, generation and running apps
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Config => client.get(format!("{}/config", cli.url)).headers(headers).send().await?,
        Commands::Load { file } => {
            let doc = serde_json::to_vec(&load_config(&file)?)?;
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            client
                .post(format!("{}/load", cli.url))
                .headers(headers)
                .body(doc)
                .send()
                .await?
        }
        Commands::Modules => client.get(format!("{}/modules", cli.url)).headers(headers).send().await?,
        Commands::Status => client.get(format!("{}/status", cli.url)).headers(headers).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
