use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod config;
mod device;
mod error;
mod recorder;
mod service;
mod sink;
mod tags;

use config::{Cli, FileConfig};
use device::{DeviceBrowser, DeviceController};
use recorder::Recorder;
use service::state::create_shared_state;
use sink::SinkBinding;
use sink::influx::InfluxSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with colors and stderr output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daq_recorder=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Require a device mode
    let Some(device_config) = cli.to_device_config() else {
        eprintln!("Error: Please specify a device mode (simulated)");
        eprintln!("Use --help for usage information");
        std::process::exit(1);
    };
    let browser = device_config.create_browser();

    // Handle --list-tags
    if cli.list_tags {
        list_device_tags(browser.as_ref())?;
        return Ok(());
    }

    let file_config = FileConfig::load(&cli.config)?;

    // Connect to the device and map configured tags
    let controller = DeviceController::connect(browser.as_ref(), &file_config.tag_map()?)?;
    tracing::info!(
        "Mapped {} tags, recording {:?}",
        controller.registry().len(),
        controller.tag_names()
    );

    let sink = if file_config.sink.enabled {
        let client = InfluxSink::new(
            &file_config.sink.url,
            &file_config.sink.token,
            file_config.sink.batch_size(),
        );
        tracing::info!("Forwarding readings to {}", file_config.sink.url);
        Some(SinkBinding {
            client: Arc::new(client),
            org: file_config.sink.org.clone(),
            bucket: file_config.sink.bucket.clone(),
        })
    } else {
        None
    };

    let recorder = Recorder::new(cli.to_recorder_config(), controller, sink);
    let state = create_shared_state(recorder);

    // Create and run HTTP server
    let router = api::create_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.listen).parse()?;

    tracing::info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Shutting down...");
    state.recorder.stop().await?;

    Ok(())
}

/// Print every item the device exposes
fn list_device_tags(browser: &dyn DeviceBrowser) -> Result<(), error::RecorderError> {
    let items = browser.browse()?;

    if items.is_empty() {
        println!("No items found on {}", browser.name());
    } else {
        println!("Items on {}:", browser.name());
        for (index, item) in items.iter().enumerate() {
            println!("  {:>4}  {}", index, item);
        }
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
