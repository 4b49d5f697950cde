pub mod agent;
pub mod cli;
pub mod config;
pub mod document;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;

use agent::DocAgent;
use cli::Args;
use config::prompt::resolve_prompts;
use document::PdfExtractor;
use llm::chat::new_client as new_chat_client;
use log::info;
use server::{ AppState, Server };
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Checked first so a missing key stops us before anything is built.
    let llm_config = args.llm_config()?;
    let tls = args.tls_paths()?.is_some();

    info!("--- Core Configuration ---");
    info!("WebSocket Address: {}", args.server_addr);
    info!("HTTP API Port: {}", args.http_port);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Temperature: {}", args.temperature);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Max Upload Bytes: {}", args.max_upload_bytes);
    info!("TLS Enabled: {}", tls);
    info!("-------------------------");

    let prompt_config = resolve_prompts(args.prompts_path.as_deref())?;
    let chat_client = new_chat_client(&llm_config)?;
    let agent = DocAgent::new(chat_client, prompt_config);
    let state = AppState::new(agent, Arc::new(PdfExtractor));

    let server = Server::new(state, args);
    server.run().await?;

    Ok(())
}
