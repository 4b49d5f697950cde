pub mod api;
pub mod websocket;

use crate::agent::DocAgent;
use crate::cli::Args;
use crate::document::TextExtractor;
use crate::session::Session;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a handler needs: the agent, the one session and the extractor.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<DocAgent>,
    pub session: Arc<Mutex<Session>>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppState {
    pub fn new(agent: DocAgent, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            agent: Arc::new(agent),
            session: Arc::new(Mutex::new(Session::new())),
            extractor,
        }
    }
}

pub struct Server {
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(state: AppState, args: Args) -> Self {
        Self { state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.start_http_server().await?;
        self.start_ws_server().await?;
        Ok(())
    }

    async fn start_http_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(self.args.http_port, self.state.clone(), self.args.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(&self.args.server_addr, self.state.clone(), self.args.clone()).await
    }
}
