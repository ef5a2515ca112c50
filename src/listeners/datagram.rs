//! UDP command listener (position, metadata and image endpoints)

use super::{Endpoint, publish};
use crate::error::Result;
use crate::protocol::Command;
use crate::state::CommandQueue;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Largest UDP payload over IPv4
const MAX_DATAGRAM: usize = 65_507;

pub struct DatagramListener {
    endpoint: Endpoint,
    socket: UdpSocket,
    queue: Arc<CommandQueue>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    buffer: Vec<u8>,
}

impl DatagramListener {
    /// `poll_interval` bounds how long a receive blocks before the
    /// running flag is checked again.
    pub fn new(
        endpoint: Endpoint,
        socket: UdpSocket,
        queue: Arc<CommandQueue>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(poll_interval))?;
        Ok(Self {
            endpoint,
            socket,
            queue,
            running,
            poll_interval,
            buffer: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn run(&mut self) {
        log::info!("{} listener started", self.endpoint.name());
        while self.running.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, from)) => self.handle(len, from),
                Err(e) => {
                    if let Some(pause) = self.error_backoff(&e) {
                        log::warn!("{} listener receive error: {}", self.endpoint.name(), e);
                        thread::sleep(pause);
                    }
                }
            }
        }
        log::info!("{} listener stopped", self.endpoint.name());
    }

    /// Pause after a receive error; `None` for the poll timeout itself
    fn error_backoff(&self, e: &io::Error) -> Option<Duration> {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => None,
            _ => Some(self.poll_interval),
        }
    }

    fn handle(&self, len: usize, from: SocketAddr) {
        let command = match Command::decode(&self.buffer[..len]) {
            Ok(command) => command,
            Err(e) => {
                log::debug!("{}: dropped datagram from {}: {}", self.endpoint.name(), from, e);
                return;
            }
        };
        if !self.endpoint.accepts(&command) {
            log::warn!(
                "{}: {} from {} is not served on this endpoint",
                self.endpoint.name(),
                command.tag(),
                from
            );
            return;
        }
        publish(&self.queue, self.endpoint, command, from, None);
    }
}
