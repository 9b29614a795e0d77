//! jsonlink console peer.
//!
//! Connects to a peer, prints every inbound chunk and sends each stdin line
//! as one JSON message.
//!
//! ```text
//! jsonlink                         # use the config file
//! jsonlink <host> <port>           # no reconnect
//! jsonlink <host> <port> --reconnect[=<ms>]
//! ```
//!
//! Type `/quit` (or close stdin, or press Ctrl-C) to disconnect.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jsonlink::{default_config_path, ClientConfig, ClientEvent, DisconnectReason};

/// How long to wait for the engine task after disconnecting.
const ENGINE_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Build the config from the command line, or from the config file when no
/// endpoint is given.
fn config_from_args(args: &[String]) -> Result<ClientConfig> {
    match args {
        [] => {
            let path: PathBuf = default_config_path();
            tracing::info!("Loading config from {}", path.display());
            ClientConfig::load(&path).with_context(|| {
                format!(
                    "No endpoint given and no usable config at {}",
                    path.display()
                )
            })
        }
        [host, port, rest @ ..] => {
            let port: u32 = port
                .parse()
                .with_context(|| format!("Invalid port: {}", port))?;
            let mut config = ClientConfig {
                host: host.clone(),
                port,
                auto_reconnect: false,
                reconnect_period_ms: None,
                connect_timeout_ms: None,
            };

            for flag in rest {
                if flag == "--reconnect" {
                    config.auto_reconnect = true;
                } else if let Some(ms) = flag.strip_prefix("--reconnect=") {
                    config.auto_reconnect = true;
                    config.reconnect_period_ms = Some(
                        ms.parse()
                            .with_context(|| format!("Invalid reconnect period: {}", ms))?,
                    );
                } else {
                    bail!("Unknown option: {}", flag);
                }
            }
            Ok(config)
        }
        [_] => bail!("Usage: jsonlink [<host> <port> [--reconnect[=<ms>]]]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "jsonlink=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting jsonlink v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = config_from_args(&args)?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let client = config
        .client_builder()
        .context("Invalid client configuration")?
        .events(event_tx)
        .build()?;
    let engine = client.start()?;

    // Print events as they arrive
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ClientEvent::MessageReceived { text } => println!("<< {}", text),
                ClientEvent::MessageSent { text } => println!(">> {}", text),
                other => println!("-- {}", other.kind()),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        if let Err(e) = client.write(line).await {
            tracing::warn!("Not sent: {}", e);
        }
    }

    client.disconnect(DisconnectReason::ClientClosing).await;
    // An in-flight connect is not interrupted by disconnect(); don't wait on it forever
    match tokio::time::timeout(ENGINE_SHUTDOWN_GRACE, engine).await {
        Ok(Err(e)) => tracing::error!("Engine task failed: {}", e),
        Ok(Ok(())) => {}
        Err(_) => tracing::debug!("Engine still connecting, leaving it behind"),
    }

    tracing::info!("jsonlink exited cleanly");
    Ok(())
}
