// Demo host: drives the EVGA device with a slow hue cycle, the way a lighting
// application would push one color map per frame.

use evga_pipe_bridge::logging;
use evga_pipe_bridge::{
    Color, ConnectionState, Device, DeviceKey, DeviceSettings, EvgaDevice, KeyColors,
    SettingsHandle,
};
use log::{error, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const DEFAULT_FPS: u64 = 30;

fn main() {
    let _ = dotenvy::dotenv();

    logging::init_logger();
    logging::init_crash_logger();

    if let Ok(dsn) = std::env::var("EVGA_SENTRY_DSN") {
        let environment = std::env::var("SENTRY_ENVIRONMENT").ok();
        logging::init_sentry(Some(&dsn), environment.as_deref());
    } else {
        info!("[HOST] Sentry disabled (no EVGA_SENTRY_DSN configured)");
    }

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("[HOST] {}", e);
            logging::shutdown_sentry();
            std::process::exit(1);
        }
    };

    let fps = env_u64("EVGA_FPS").unwrap_or(DEFAULT_FPS).max(1);
    let frame_limit = env_u64("EVGA_FRAMES");

    let device = match EvgaDevice::new(SettingsHandle::new(settings)) {
        Ok(device) => device,
        Err(e) => {
            error!("[HOST] {}", e);
            logging::shutdown_sentry();
            std::process::exit(1);
        }
    };

    run(&device, fps, frame_limit);

    device.shutdown();
    logging::shutdown_sentry();
    info!("[HOST] Done");
}

fn load_settings() -> Result<DeviceSettings, String> {
    let path = match std::env::var("EVGA_SETTINGS") {
        Ok(path) => PathBuf::from(path),
        Err(_) => DeviceSettings::default_path().map_err(|e| e.to_string())?,
    };

    DeviceSettings::load(&path).map_err(|e| format!("Failed to load {:?}: {}", path, e))
}

fn env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("[HOST] Ignoring {}={:?}: not a number", name, value);
            None
        }
    }
}

fn run(device: &EvgaDevice, fps: u64, frame_limit: Option<u64>) {
    let frame_time = Duration::from_millis(1000 / fps);
    let mut frame: u64 = 0;

    device.initialize();
    info!("[HOST] {}: {}", device.device_name(), device.device_details());

    while frame_limit.map_or(true, |limit| frame < limit) {
        thread::sleep(frame_time);

        match device.state() {
            // The consumer went away (or never came): start listening again.
            ConnectionState::Uninitialized => {
                device.initialize();
                continue;
            }
            ConnectionState::Connecting => continue,
            ConnectionState::Connected => {}
        }

        let colors = KeyColors::from([(DeviceKey::PeripheralLogo, hue_to_color(frame * 2))]);
        if !device.update_device(&colors, false) {
            warn!("[HOST] Update failed: {}", device.device_details());
        }

        if frame % fps == 0 {
            info!("[HOST] Update time: {}", device.device_update_performance());
        }

        frame += 1;
    }
}

/// Fully saturated color for a hue in degrees.
fn hue_to_color(hue: u64) -> Color {
    let h = (hue % 360) as u32;
    let x = ((60 - (h % 120).abs_diff(60)) * 255 / 60) as u8;

    match h / 60 {
        0 => Color::rgb(255, x, 0),
        1 => Color::rgb(x, 255, 0),
        2 => Color::rgb(0, 255, x),
        3 => Color::rgb(0, x, 255),
        4 => Color::rgb(x, 0, 255),
        _ => Color::rgb(255, 0, x),
    }
}
