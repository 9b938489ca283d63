pub mod cli;
pub mod models;
pub mod gateway;
pub mod server;
pub mod client;
pub mod prober;
pub mod store;
pub mod orchestrator;
pub mod export;
pub mod voice;
pub mod terminal;

use cli::{ Args, RunMode };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mode: RunMode = args.mode.parse()?;

    info!("--- Core Configuration ---");
    info!("Mode: {}", mode);
    match mode {
        RunMode::Serve => {
            info!("Server Address: {}", args.server_addr);
            info!("Route Prefix: {}", args.route_prefix);
            info!("ADK Base URL: {}", args.adk_base_url);
            info!("TLS Enabled: {}", args.enable_tls);
            if args.enable_tls {
                info!("TLS Cert Path: {}", args.tls_cert_path.as_deref().unwrap_or("<unset>"));
                info!("TLS Key Path: {}", args.tls_key_path.as_deref().unwrap_or("<unset>"));
            }
        }
        RunMode::Chat => {
            info!("Gateway URL: {}", args.gateway_url);
            info!("App: {}", args.app_name);
            info!("User: {}", args.user_id);
            info!("Session: {}", args.session_id);
            info!("Health Interval: {}s", args.health_interval_secs);
            info!("Export Dir: {}", args.export_dir);
            info!("Voice Output: {}", args.voice_output);
        }
    }
    info!("-------------------------");

    match mode {
        RunMode::Serve => Server::new(args).run().await,
        RunMode::Chat => terminal::run(&args).await,
    }
}
