//! Presence client example
//!
//! Subscribes to a presence server and prints every NOTIFY it receives.
//!
//! ```text
//! cargo run -p sipline-dialog-core --example presence_client -- --server 127.0.0.1:5070
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sipline_dialog_core::prelude::*;
use sipline_sip_transport::UdpTransport;

#[derive(Parser, Debug)]
#[command(name = "presence_client")]
#[command(about = "Subscribes to a presence server and prints its NOTIFYs")]
struct Args {
    /// Address of the presence server
    #[arg(short, long, default_value = "127.0.0.1:5070")]
    server: SocketAddr,

    /// User to subscribe to
    #[arg(short, long, default_value = "presence")]
    target: String,

    /// Our own SIP URI
    #[arg(short, long, default_value = "sip:watcher@127.0.0.1")]
    from: String,

    /// Password answering digest challenges
    #[arg(short, long)]
    password: Option<String>,

    /// Subscription lifetime in seconds
    #[arg(short, long, default_value = "600")]
    expires: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Application::new(DialogConfig::default().with_user_agent("sipline-presence-client"));
    let (transport, events) = UdpTransport::bind("0.0.0.0:0".parse()?, None).await?;
    let transport: Arc<dyn Transport> = Arc::new(transport);
    tokio::spawn({
        let app = app.clone();
        let transport = transport.clone();
        async move { app.run(transport, events).await }
    });

    let mut options = DialogOptions::default();
    if let Some(password) = args.password {
        options = options.with_password(password);
    }
    let target = format!("sip:{}@{}", args.target, args.server);
    let dialog = app.connect(transport, args.server)?.create_dialog(&args.from, &target, options)?;

    dialog.register_callback(
        "NOTIFY",
        Callback::from_fn(|dialog, request| {
            info!(call_id = %dialog.call_id(), "NOTIFY {}: {}", request.cseq, request.payload);
            Ok(())
        }),
    );

    let mut headers = Headers::new();
    headers.insert("Event", "presence");
    let response = dialog.subscribe(Some(headers), args.expires).await?.await?;
    info!("Subscription answered with {} {}", response.status_code, response.reason);

    tokio::signal::ctrl_c().await?;
    dialog.close();
    app.close().await?;
    Ok(())
}
