use clap::Parser;
use dir_client::MemStore;
use tonic::transport::Server;
use tracing::info;

use dirstore_server::config::ServerConfig;
use dirstore_server::grpc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    if let Some(level) = config.log_level.to_tracing_level() {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let store = MemStore::with_history_window(config.history_window);
    let server = grpc::create_server(store);

    info!(addr = %config.listen, history_window = config.history_window, "serving directory store");
    Server::builder().add_service(server).serve(config.listen).await?;

    Ok(())
}
