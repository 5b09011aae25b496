//! Set an attenuation and read it back
//!
//! ```text
//! OZ_HOST=192.168.1.50 OZ_PORT=10001 cargo run --example set_attenuation -- 12.5
//! ```

use ozatten::{Controller, ControllerConfig, DeviceModel};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ozatten::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Change to your terminal server
    let host = std::env::var("OZ_HOST").unwrap_or_else(|_| "192.168.1.50".to_string());
    let port = std::env::var("OZ_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(10001);
    let model: DeviceModel = std::env::var("OZ_MODEL")
        .ok()
        .and_then(|m| m.parse().ok())
        .unwrap_or_default();

    let target: f64 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(10.0);

    let config = ControllerConfig::new(model).with_echo(false);
    let mut controller = Controller::from_config(host, port, config);

    controller.connect().await?;
    println!("✓ Connected to {}", controller.identity().await?);

    let set = controller.set_attenuation(target).await?;
    println!("✓ Set {}", set);

    let readout = controller.readout().await?;
    println!("✓ Readout: {}", readout);

    controller.disconnect().await?;
    println!("✓ Disconnected");

    Ok(())
}
