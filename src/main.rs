//! Camera bridge running against the simulated camera

use std::path::PathBuf;
use std::sync::Arc;

use camera_bridge::{BridgeConfig, CameraNode, SimDriver};
use color_eyre::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("camera_bridge=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Camera bridge launching...");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = BridgeConfig::load(path.as_deref())?;
    info!("node {} for camera {}", config.node_name, config.serial_number);

    let driver = Arc::new(SimDriver::new(config.serial_number.clone()));
    // Discovery sleeps between attempts
    let node = tokio::task::spawn_blocking(move || CameraNode::start(config, driver)).await??;

    let images = node.subscribe_images();
    let meta = node.subscribe_meta();

    let image_task = tokio::spawn(async move {
        let mut count = 0u64;
        while let Ok(msg) = images.recv_async().await {
            count += 1;
            debug!(
                "image {} {}x{} {} stamp {}",
                count, msg.image.width, msg.image.height, msg.image.encoding, msg.image.header.stamp
            );
        }
        count
    });
    let meta_task = tokio::spawn(async move {
        while let Ok(m) = meta.recv_async().await {
            debug!(
                "meta brightness {} exposure {}us gain {}db",
                m.brightness, m.exposure_time, m.gain
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // Dropping the node closes both sinks, which ends the subscriber tasks
    tokio::task::spawn_blocking(move || drop(node)).await?;
    let images = image_task.await?;
    meta_task.await?;
    info!("received {} images", images);
    Ok(())
}
