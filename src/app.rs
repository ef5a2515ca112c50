//! Application orchestration for the SetuIO daemon
//!
//! Binds every endpoint, starts the listener and telemetry threads, then runs
//! the tick loop on the calling thread until `running` is cleared.

use crate::config::Config;
use crate::driver::TickDriver;
use crate::error::{Error, Result};
use crate::listeners::{BoundAddrs, ListenerSet, TelemetryBroadcaster};
use crate::response::ResponseSender;
use crate::sim::MockEngine;
use crate::state::{CommandQueue, SessionState};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

pub struct App {
    driver: TickDriver<MockEngine>,
    listeners: ListenerSet,
    telemetry: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl App {
    /// Bind all endpoints and start the background threads. Binding
    /// failures are fatal and name the endpoint.
    pub fn start(config: Config, running: Arc<AtomicBool>) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(CommandQueue::new(SessionState::new(
            config.simulation.capture_rate,
        )));
        let listeners = ListenerSet::start(&config.network, Arc::clone(&queue), Arc::clone(&running))?;

        let sender = ResponseSender::new(config.response.clone(), Arc::clone(&running));
        let engine = MockEngine::new(&config.simulation);
        info!(
            "Mock engine: {} scenes, {} spawnable objects, {} cameras",
            config.simulation.scenes.len(),
            config.simulation.spawnables.len(),
            config.cameras.len()
        );
        let mut driver = TickDriver::new(
            engine,
            queue,
            sender,
            config.camera_rig(),
            config.simulation.physics_dt(),
        );

        let telemetry = if config.telemetry.enabled {
            let (mut broadcaster, frames) =
                TelemetryBroadcaster::new(&config.telemetry, Arc::clone(&running))?;
            driver = driver.with_telemetry(frames);
            let handle = thread::Builder::new()
                .name("telemetry".to_string())
                .spawn(move || broadcaster.run())
                .map_err(|source| Error::ThreadSpawn {
                    name: "telemetry".to_string(),
                    source,
                })?;
            Some(handle)
        } else {
            info!("Telemetry broadcast disabled");
            None
        };

        Ok(Self {
            driver,
            listeners,
            telemetry,
            running,
        })
    }

    pub fn listener_addrs(&self) -> BoundAddrs {
        self.listeners.local_addrs()
    }

    /// Run the tick loop until shutdown, then wait for every thread.
    pub fn run(mut self) -> Result<()> {
        let rate = self.driver.session().capture_rate;
        if rate == 0 {
            info!("Starting in real-time mode");
        } else {
            info!("Starting paused at a capture rate of {} Hz", rate);
        }
        self.driver.run(&self.running);

        info!("Shutting down...");
        self.listeners.join();
        if let Some(handle) = self.telemetry {
            if handle.join().is_err() {
                warn!("Telemetry thread panicked");
            }
        }
        Ok(())
    }
}
