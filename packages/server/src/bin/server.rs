//! Irori chat hub server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin irori-server
//! cargo run --bin irori-server -- --host 0.0.0.0 --port 3000 --relay-overflow block
//! ```

use std::sync::Arc;

use clap::Parser;
use irori_server::{
    config::{DEFAULT_MAX_DEVICES_PER_USER, DEFAULT_RELAY_CAPACITY, HubConfig, OverflowPolicy},
    hub::Hub,
    infrastructure::{
        notification::LoggingNotificationSender, repository::InMemoryMessageStore,
    },
    ui::Server,
};
use irori_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "irori-server")]
#[command(about = "Real-time chat hub with rooms and asynchronous persistence", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Outbound queue size per connection
    #[arg(long, default_value_t = 32)]
    outbound_capacity: usize,

    /// Command queue size per room
    #[arg(long, default_value_t = 64)]
    room_queue_capacity: usize,

    /// Command queue size of the server hub
    #[arg(long, default_value_t = 64)]
    server_queue_capacity: usize,

    /// Persistence queue size
    #[arg(long, default_value_t = DEFAULT_RELAY_CAPACITY)]
    relay_capacity: usize,

    /// What to do when the persistence queue is full
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Drop)]
    relay_overflow: OverflowPolicy,

    /// Maximum simultaneous connections per user in one room
    #[arg(long, default_value_t = DEFAULT_MAX_DEVICES_PER_USER)]
    max_devices_per_user: usize,
}

impl From<&Args> for HubConfig {
    fn from(args: &Args) -> Self {
        Self {
            outbound_capacity: args.outbound_capacity,
            room_queue_capacity: args.room_queue_capacity,
            server_queue_capacity: args.server_queue_capacity,
            relay_capacity: args.relay_capacity,
            relay_overflow: args.relay_overflow,
            max_devices_per_user: args.max_devices_per_user,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = HubConfig::from(&args);
    tracing::debug!(?config, "hub configuration");

    // Collaborators: in-memory store and logging push sender
    let store = Arc::new(InMemoryMessageStore::new());
    let notifier = Arc::new(LoggingNotificationSender::new());

    let hub = Hub::start(config, store, notifier);

    if let Err(e) = Server::new(hub).run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
