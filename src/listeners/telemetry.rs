//! High-rate agent metadata broadcast.
//!
//! The tick loop hands one metadata document per tick to a bounded channel;
//! a dedicated thread sends each as a single UDP datagram. When the
//! broadcaster falls behind, new frames are dropped rather than delaying the
//! tick loop.

use crate::config::TelemetryConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long the broadcaster waits for a frame before checking shutdown
const RECV_POLL: Duration = Duration::from_millis(50);

/// Tick-side handle; cheap to clone
#[derive(Clone)]
pub struct TelemetrySender {
    frames: Sender<Vec<u8>>,
}

impl TelemetrySender {
    /// Queue a frame, dropping it when the channel is full.
    /// Returns whether the frame was queued.
    pub fn publish(&self, frame: Vec<u8>) -> bool {
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("telemetry channel full; frame dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub struct TelemetryBroadcaster {
    socket: UdpSocket,
    destination: SocketAddr,
    frames: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
}

impl TelemetryBroadcaster {
    /// Bind the sending socket and create the frame channel.
    pub fn new(config: &TelemetryConfig, running: Arc<AtomicBool>) -> Result<(Self, TelemetrySender)> {
        let target = format!("{}:{}", config.address, config.port);
        let destination = target
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("telemetry address {}: {}", target, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("telemetry address {} did not resolve", target)))?;

        let bind = if destination.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).map_err(|source| Error::Bind {
            endpoint: "telemetry",
            address: bind.to_string(),
            source,
        })?;
        socket.set_broadcast(true)?;

        let (tx, rx) = bounded(config.queue_depth.max(1));
        Ok((
            Self {
                socket,
                destination,
                frames: rx,
                running,
            },
            TelemetrySender { frames: tx },
        ))
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn run(&mut self) {
        log::info!("telemetry broadcaster started -> {}", self.destination);
        let mut failures = 0u64;
        while self.running.load(Ordering::Relaxed) {
            match self.frames.recv_timeout(RECV_POLL) {
                Ok(frame) => {
                    if let Err(e) = self.socket.send_to(&frame, self.destination) {
                        failures += 1;
                        // Log the first failure and then sparsely
                        if failures == 1 || failures % 1000 == 0 {
                            log::warn!("telemetry send failed ({} so far): {}", failures, e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::info!("telemetry broadcaster stopped");
    }
}
