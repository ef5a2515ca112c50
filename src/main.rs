//! SetuIO - Simulated agent command server
//!
//! ## Endpoints (default ports)
//!
//! - **UDP 9000**: movement, capture rate, agent toggles, scene, objects
//! - **UDP 9001**: metadata requests
//! - **UDP 9002**: image and camera requests
//! - **TCP 9005**: stepped commands, acknowledged with `ack` on completion
//! - **UDP broadcast 9004**: per-tick metadata telemetry
//!
//! Replies are sent over TCP to the requester on ports 9000/9001/9002.

use clap::Parser;
use setu_io::{App, Config, Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base listen port (position; metadata +1, image +2, step +5)
    #[arg(long, alias = "listen_port")]
    listen_port: Option<u16>,

    /// Base reply port (position; metadata +1, image +2, telemetry +4)
    #[arg(long, alias = "send_port")]
    send_port: Option<u16>,

    /// Capture rate in Hz; 0 runs in real time
    #[arg(long, alias = "capture_rate")]
    capture_rate: Option<u32>,

    /// Keyboard drive speed
    #[arg(long)]
    speed: Option<f32>,

    /// Keyboard turn speed
    #[arg(long, alias = "turn_speed")]
    turn_speed: Option<f32>,

    /// Physics tick rate in Hz
    #[arg(long, alias = "imu_update_rate")]
    physics_hz: Option<f64>,

    /// Spawn seed; 0 draws from entropy
    #[arg(long)]
    seed: Option<u64>,

    /// Disable the telemetry broadcast
    #[arg(long)]
    no_telemetry: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.listen_port {
            config.set_listen_base(port);
        }
        if let Some(port) = self.send_port {
            config.set_send_base(port);
        }
        if let Some(rate) = self.capture_rate {
            config.simulation.capture_rate = rate;
        }
        if let Some(speed) = self.speed {
            config.simulation.speed = speed;
        }
        if let Some(turn_speed) = self.turn_speed {
            config.simulation.turn_speed = turn_speed;
        }
        if let Some(hz) = self.physics_hz {
            config.simulation.physics_hz = hz;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if self.no_telemetry {
            config.telemetry.enabled = false;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("SetuIO v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            Config::load(path)?
        }
        None => {
            log::info!("Using built-in configuration");
            Config::default()
        }
    };
    args.apply(&mut config);
    config.validate()?;

    log::info!(
        "Listening on {} (position {}, metadata {}, image {}, step {})",
        config.network.bind_address,
        config.network.position_port,
        config.network.metadata_port,
        config.network.image_port,
        config.network.step_port
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    App::start(config, running)?.run()?;

    log::info!("SetuIO stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore_aliases() {
        let args = Args::parse_from([
            "setu-io",
            "--listen_port",
            "7000",
            "--send_port",
            "8000",
            "--imu_update_rate",
            "100",
            "--capture_rate",
            "5",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.network.step_port, 7005);
        assert_eq!(config.response.image_port, 8002);
        assert_eq!(config.telemetry.port, 8004);
        assert_eq!(config.simulation.physics_hz, 100.0);
        assert_eq!(config.simulation.capture_rate, 5);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args::parse_from(["setu-io"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.network.position_port, Config::default().network.position_port);
        assert!(config.telemetry.enabled == Config::default().telemetry.enabled);
    }
}
