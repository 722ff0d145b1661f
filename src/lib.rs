pub mod accounts;
pub mod agent;
pub mod answer;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod retry;
pub mod search;
pub mod server;
pub mod session;

use accounts::initialize_account_store;
use agent::ResearchAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP API Port: {}", args.http_port.map_or("disabled".to_string(), |p| p.to_string()));
    info!("Handshake Signature: {}", if args.server_api_key.is_some() { "required" } else { "off" });
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or(llm::DEFAULT_BASE_URL));
    info!("Search Base URL: {}", args.search_base_url.as_deref().unwrap_or(search::duckduckgo::DEFAULT_BASE_URL));
    info!("Search Max Results: {}", args.search_max_results);
    info!("Search Attempts: {} (delay {}ms)", args.search_max_attempts, args.search_retry_delay_ms);
    info!("History For Prompt: {}", args.history_for_prompt_len);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Require Login: {}", args.require_login);
    info!("Account Store Type: {}", args.account_store_type);
    if args.account_store_type.eq_ignore_ascii_case("redis") {
        info!("Account Store URL: {}", args.account_store_url);
        info!("Account Key Prefix: {}", args.account_key_prefix);
    }
    info!("-------------------------");

    let agent = Arc::new(ResearchAgent::from_args(&args)?);
    let accounts = initialize_account_store(&args)?;

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, accounts, args);
    server.run().await?;

    Ok(())
}
