//! Inbound listeners.
//!
//! One thread per endpoint. Each listener decodes a frame, checks that its
//! endpoint carries that command, and publishes it into the shared
//! [`CommandQueue`]:
//!
//! | Endpoint | Transport | Commands |
//! |----------|-----------|----------|
//! | position | UDP | movement, capture rate, agent toggles, scene, objects |
//! | metadata | UDP | `rMET` |
//! | image | UDP | images, camera info and camera settings |
//! | step | TCP | `tlpt`, `fBff`, `fScR` |
//!
//! All sockets are bound before any thread starts, so a port conflict aborts
//! startup with the endpoint named. Threads stop when `running` is cleared,
//! at their next poll timeout.

pub mod datagram;
pub mod step;
pub mod telemetry;

pub use datagram::DatagramListener;
pub use step::StepListener;
pub use telemetry::{TelemetryBroadcaster, TelemetrySender};

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, CommandFamily};
use crate::state::{Admitted, CommandQueue, Rejected};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

/// Inbound endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Position,
    Metadata,
    Image,
    Step,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Position => "position",
            Endpoint::Metadata => "metadata",
            Endpoint::Image => "image",
            Endpoint::Step => "step",
        }
    }

    /// Whether this endpoint carries `command`
    pub fn accepts(&self, command: &Command) -> bool {
        let family = command.family();
        match self {
            Endpoint::Position => matches!(
                family,
                CommandFamily::Movement
                    | CommandFamily::CaptureRate
                    | CommandFamily::Agent
                    | CommandFamily::Scene
                    | CommandFamily::Objects
            ),
            Endpoint::Metadata => family == CommandFamily::Metadata,
            Endpoint::Image => matches!(family, CommandFamily::Image | CommandFamily::Camera),
            Endpoint::Step => command.is_stepped() || family == CommandFamily::CaptureRate,
        }
    }
}

/// Close a step connection without acknowledging it
pub(crate) fn close_ack(stream: TcpStream) {
    let _ = stream.shutdown(Shutdown::Both);
}

/// Publish and log the outcome. Step connections handed back by the queue
/// are closed here, outside its lock.
pub(crate) fn publish(
    queue: &CommandQueue,
    endpoint: Endpoint,
    command: Command,
    requester: SocketAddr,
    ack: Option<TcpStream>,
) -> bool {
    let tag = command.tag();
    match queue.publish(command, requester, ack) {
        Ok(Admitted { displaced_ack }) => {
            if let Some(stream) = displaced_ack {
                log::debug!("{}: {} displaced a pending stepped command", endpoint.name(), tag);
                close_ack(stream);
            }
            log::trace!("{}: {} from {} queued", endpoint.name(), tag, requester);
            true
        }
        Err(Rejected { reason, ack }) => {
            log::debug!(
                "{}: {} from {} rejected: {}",
                endpoint.name(),
                tag,
                requester,
                reason
            );
            if let Some(stream) = ack {
                close_ack(stream);
            }
            false
        }
    }
}

fn endpoint_address(config: &NetworkConfig, port: u16) -> String {
    format!("{}:{}", config.bind_address, port)
}

fn bind_udp(endpoint: Endpoint, config: &NetworkConfig, port: u16) -> Result<UdpSocket> {
    let address = endpoint_address(config, port);
    UdpSocket::bind(&address).map_err(|source| Error::Bind {
        endpoint: endpoint.name(),
        address,
        source,
    })
}

fn bind_tcp(endpoint: Endpoint, config: &NetworkConfig, port: u16) -> Result<TcpListener> {
    let address = endpoint_address(config, port);
    TcpListener::bind(&address).map_err(|source| Error::Bind {
        endpoint: endpoint.name(),
        address,
        source,
    })
}

/// Local addresses of the bound endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub position: SocketAddr,
    pub metadata: SocketAddr,
    pub image: SocketAddr,
    pub step: SocketAddr,
}

/// Running listener threads
pub struct ListenerSet {
    addrs: BoundAddrs,
    handles: Vec<(Endpoint, JoinHandle<()>)>,
}

impl ListenerSet {
    /// Bind every endpoint, then start one thread per endpoint.
    pub fn start(
        config: &NetworkConfig,
        queue: Arc<CommandQueue>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let position = bind_udp(Endpoint::Position, config, config.position_port)?;
        let metadata = bind_udp(Endpoint::Metadata, config, config.metadata_port)?;
        let image = bind_udp(Endpoint::Image, config, config.image_port)?;
        let step = bind_tcp(Endpoint::Step, config, config.step_port)?;

        let addrs = BoundAddrs {
            position: position.local_addr()?,
            metadata: metadata.local_addr()?,
            image: image.local_addr()?,
            step: step.local_addr()?,
        };

        let mut set = Self {
            addrs,
            handles: Vec::with_capacity(4),
        };
        for (endpoint, socket) in [
            (Endpoint::Position, position),
            (Endpoint::Metadata, metadata),
            (Endpoint::Image, image),
        ] {
            let mut listener = DatagramListener::new(
                endpoint,
                socket,
                Arc::clone(&queue),
                Arc::clone(&running),
                config.poll_interval(),
            )?;
            set.spawn(endpoint, move || listener.run())?;
        }

        let mut listener = StepListener::new(
            step,
            Arc::clone(&queue),
            Arc::clone(&running),
            config.poll_interval(),
            config.step_read_timeout(),
        )?;
        set.spawn(Endpoint::Step, move || listener.run())?;

        log::info!(
            "Listening: position {}, metadata {}, image {}, step {}",
            addrs.position,
            addrs.metadata,
            addrs.image,
            addrs.step
        );
        Ok(set)
    }

    fn spawn<F>(&mut self, endpoint: Endpoint, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = format!("{}-listener", endpoint.name());
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| Error::ThreadSpawn { name, source })?;
        self.handles.push((endpoint, handle));
        Ok(())
    }

    pub fn local_addrs(&self) -> BoundAddrs {
        self.addrs
    }

    /// Wait for every listener to observe shutdown
    pub fn join(self) {
        for (endpoint, handle) in self.handles {
            if handle.join().is_err() {
                log::error!("{} listener panicked", endpoint.name());
            }
        }
    }
}
