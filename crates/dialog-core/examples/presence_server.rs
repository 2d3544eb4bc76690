//! Presence server example
//!
//! Answers SUBSCRIBE requests for one user with an immediate NOTIFY and keeps
//! notifying every few seconds until the subscriber goes away.
//!
//! ```text
//! cargo run -p sipline-dialog-core --example presence_server -- --port 5070
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sipline_dialog_core::prelude::*;
use sipline_sip_transport::UdpTransport;

#[derive(Parser, Debug)]
#[command(name = "presence_server")]
#[command(about = "Answers SUBSCRIBE requests with presence NOTIFYs")]
struct Args {
    /// SIP listening port
    #[arg(short, long, default_value = "5070")]
    port: u16,

    /// User part the subscriptions are routed on
    #[arg(short, long, default_value = "presence")]
    user: String,

    /// Seconds between NOTIFYs
    #[arg(short, long, default_value = "5")]
    interval: u64,

    /// Optional TOML file with dialog settings
    #[arg(short, long)]
    config: Option<String>,
}

fn subscription_handler(interval: Duration) -> Callback {
    Callback::from_async(move |dialog: Dialog, request: Request| async move {
        let event = request.headers.get("Event").unwrap_or("presence").to_string();
        info!(call_id = %dialog.call_id(), from = %request.from, "New subscription for {}", event);

        let mut version = 0u32;
        loop {
            version += 1;
            let mut headers = Headers::new();
            headers.insert("Event", event.clone());
            headers.insert("Subscription-State", "active");

            let response = dialog.notify(Some(headers), format!("open version={}", version)).await?.await?;
            if !response.is_success() {
                warn!(call_id = %dialog.call_id(), "Subscriber answered {}", response.status_code);
                dialog.close();
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match &args.config {
        Some(path) => DialogConfig::from_file(path)?,
        None => DialogConfig::default().with_user_agent("sipline-presence-server"),
    };

    let router = Router::new();
    router.add_user(args.user.clone(), subscription_handler(Duration::from_secs(args.interval)));
    let app = Application::new(config).with_dialplan(router);

    let (transport, events) = UdpTransport::bind(format!("0.0.0.0:{}", args.port).parse()?, None).await?;
    let transport: Arc<dyn Transport> = Arc::new(transport);
    info!("Serving presence for '{}' on {}", args.user, transport.local_addr()?);

    tokio::select! {
        result = app.run(transport, events) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    app.close().await?;
    Ok(())
}
