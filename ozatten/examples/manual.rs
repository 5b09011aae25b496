//! Type controller commands by hand
//!
//! Each line is sent verbatim; an empty line quits.

use ozatten::{Controller, ControllerConfig, DeviceModel};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> ozatten::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let host = std::env::var("OZ_HOST").unwrap_or_else(|_| "192.168.1.50".to_string());
    let port = std::env::var("OZ_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(10001);
    let model: DeviceModel = std::env::var("OZ_MODEL")
        .ok()
        .and_then(|m| m.parse().ok())
        .unwrap_or_default();

    let mut controller = Controller::from_config(host, port, ControllerConfig::new(model));
    controller.connect().await?;

    println!("Connected to {} ({}). Empty line quits.", controller.remote_addr(), model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            break;
        }

        match controller.send_raw(&line).await {
            Ok(response) => {
                for data in &response.lines {
                    println!("{}", data);
                }
                println!("{:?}", response.status);
            }
            Err(e) if e.requires_reconnect() => return Err(e),
            Err(e) => println!("! {}", e),
        }
    }

    controller.disconnect().await?;
    Ok(())
}
