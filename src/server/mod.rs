pub mod api;

use crate::cli::Args;
use log::{ info, warn };
use std::error::Error;

pub use api::create_router;

pub struct Server {
    args: Args,
}

impl Server {
    pub fn new(args: Args) -> Self {
        warn!("Gateway answers every origin with permissive CORS headers. Narrow this before exposing it.");
        Self { args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!("Gateway listening on {} (prefix '{}')", self.args.server_addr, self.args.route_prefix);
        api::start_http_server(&self.args).await
    }
}
