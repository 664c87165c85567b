mod api;
mod state;

use std::sync::{Arc, Mutex};

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use regula_core::Config;
use regula_parser::InstructionParser;
use regula_store::{FileKv, RuleStore};

use crate::state::AppState;

fn load_config() -> Config {
    regula_core::config::load_dotenv();
    Config::from_env()
}

fn open_store(config: &Config) -> RuleStore {
    RuleStore::new(Box::new(FileKv::new(&config.storage.data_dir)))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.log_summary();

    let parser = InstructionParser::from_config(&config);
    if !parser.is_available() {
        tracing::warn!("No LLM provider available — parsing runs in heuristic-only mode");
    }

    let cors = match config.server.cors_origin.as_str() {
        "*" => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        origin => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let state = Arc::new(AppState {
        parser,
        store: Mutex::new(open_store(&config)),
        config: config.clone(),
    });

    let app = api::router().layer(cors).with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", config.server.port);
    axum::serve(listener, app).await?;

    Ok(())
}

/// One-shot conversion: parse a single instruction and print the result.
async fn parse_once(config: &Config, instruction: &str) -> anyhow::Result<()> {
    let parser = InstructionParser::from_config(config);
    if !parser.is_available() {
        tracing::warn!("No LLM provider available — result comes from heuristic extraction");
    }

    let result = parser.parse_instruction(instruction).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn show_stats(config: &Config) -> anyhow::Result<()> {
    let stats = open_store(config).stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = load_config();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") | None => serve(config).await?,
        Some("parse") => {
            let instruction = args[2..].join(" ");
            parse_once(&config, &instruction).await?;
        }
        Some("stats") => show_stats(&config)?,
        Some(other) => {
            println!("regula v{}", env!("CARGO_PKG_VERSION"));
            println!("Unknown command '{}'", other);
            println!("Usage: regula-server <command>");
            println!("  serve                 Start the HTTP server (default)");
            println!("  parse <instruction>   Convert one instruction and print the result");
            println!("  stats                 Print rule store statistics");
        }
    }

    Ok(())
}
