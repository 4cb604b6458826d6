use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relay-invoke")]
#[command(about = "Send invocation events to a local lambda-relay endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9000")]
    url: String,

    /// Absolute deadline passed to the relay, in ms from now.
    #[arg(long)]
    deadline_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send an event JSON file as-is
    Event {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Build an HTTP API event from a method and path
    Request {
        #[arg(short, long, default_value = "GET")]
        method: String,

        #[arg(default_value = "/")]
        path: String,

        /// Query string without the leading `?`
        #[arg(short, long)]
        query: Option<String>,

        /// Header as `name: value`, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[arg(short, long)]
        body: Option<String>,
    },
    /// Check the relay's health endpoint
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let event = match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            return print_response(res).await;
        }
        Commands::Event { file } => {
            let content = std::fs::read_to_string(&file)?;
            serde_json::from_str::<Value>(&content)?
        }
        Commands::Request {
            method,
            path,
            query,
            headers,
            body,
        } => http_api_event(&method, &path, query, &headers, body)?,
    };

    let mut request = client.post(format!("{}/invoke", cli.url)).json(&event);
    if let Some(offset) = cli.deadline_ms {
        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?;
        let deadline = now.as_millis() as u64 + offset;
        request = request.header("x-relay-deadline-ms", deadline.to_string());
    }

    let res = request.send().await?;
    print_response(res).await
}

fn http_api_event(
    method: &str,
    path: &str,
    query: Option<String>,
    headers: &[String],
    body: Option<String>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut header_map = serde_json::Map::new();
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header must be `name: value`, got {:?}", header))?;
        header_map.insert(name.trim().to_lowercase(), Value::String(value.trim().to_string()));
    }

    Ok(json!({
        "version": "2.0",
        "rawPath": path,
        "rawQueryString": query.unwrap_or_default(),
        "headers": header_map,
        "requestContext": {
            "http": {
                "method": method.to_uppercase(),
                "path": path,
                "sourceIp": "127.0.0.1",
            },
            "requestId": uuid::Uuid::new_v4().to_string(),
        },
        "body": body,
        "isBase64Encoded": false,
    }))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
