pub mod api;
pub mod websocket;

use crate::accounts::AccountStore;
use crate::agent::ResearchAgent;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

use self::websocket::SessionHandler;

pub struct Server {
    addr: String,
    agent: Arc<ResearchAgent>,
    accounts: Arc<dyn AccountStore>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        agent: Arc<ResearchAgent>,
        accounts: Arc<dyn AccountStore>,
        args: Args
    ) -> Self {
        Self {
            addr,
            agent,
            accounts,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.agent.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let handler = SessionHandler::new(
            self.agent.clone(),
            self.accounts.clone(),
            self.args.admin_email.clone()
        );
        websocket::start_ws_server(&self.addr, Arc::new(handler), self.args.server_api_key.clone()).await
    }
}
