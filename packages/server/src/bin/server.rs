//! Hiroba chat server.
//!
//! Clients join public or private rooms over WebSocket and exchange messages;
//! messages are persisted in the background.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server -- --port 8080 --database-url sqlite://hiroba.db
//! ```

use clap::Parser;
use hiroba_server::{ServerArgs, run_server};
use hiroba_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    // Run the server
    if let Err(e) = run_server(args).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
