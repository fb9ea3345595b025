// Demo consumer: connects to the device pipe and prints every color it receives.

use evga_pipe_bridge::ipc::{PipeClient, PIPE_NAME};
use evga_pipe_bridge::logging;
use log::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    logging::init_logger();

    let pipe_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| PIPE_NAME.to_string());

    let mut client = match PipeClient::connect(&pipe_name).await {
        Ok(client) => client,
        Err(e) => {
            error!("[MONITOR] Could not connect to {}: {}", pipe_name, e);
            std::process::exit(1);
        }
    };

    info!("[MONITOR] Connected to {}", client.path().display());

    loop {
        match client.receive_frame().await {
            Ok(frame) => println!("{}", frame.color()),
            Err(e) => {
                info!("[MONITOR] Pipe closed: {}", e);
                break;
            }
        }
    }
}
