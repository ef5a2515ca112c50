//! TCP step listener.
//!
//! Serves one connection at a time. A stepped command keeps its connection
//! open as the acknowledgement channel: the queue owns it until the command
//! starts, then the session until the command completes and `ack` is written.
//! A capture-rate change is acknowledged by closing the connection.

use super::{Endpoint, close_ack, publish};
use crate::error::{Error, Result};
use crate::protocol::{Command, DecodeError, LengthRule};
use crate::state::CommandQueue;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Largest frame carried on the step endpoint (`fBff`)
pub const MAX_STEP_FRAME: usize = 20;

pub struct StepListener {
    listener: TcpListener,
    queue: Arc<CommandQueue>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    read_timeout: Duration,
}

impl StepListener {
    pub fn new(
        listener: TcpListener,
        queue: Arc<CommandQueue>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            queue,
            running,
            poll_interval,
            read_timeout,
        })
    }

    pub fn run(&mut self) {
        log::info!("step listener started");
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.serve(stream, peer) {
                        log::debug!("step: connection from {} dropped: {}", peer, e);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    log::warn!("step listener accept error: {}", e);
                    thread::sleep(self.poll_interval);
                }
            }
        }
        log::info!("step listener stopped");
    }

    fn serve(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;

        let command = match read_frame(&mut stream) {
            Ok(command) => command,
            Err(e) => {
                close_ack(stream);
                return Err(e);
            }
        };
        if !Endpoint::Step.accepts(&command) {
            log::warn!("step: {} from {} is not served on this endpoint", command.tag(), peer);
            close_ack(stream);
            return Ok(());
        }

        if command.is_stepped() {
            publish(&self.queue, Endpoint::Step, command, peer, Some(stream));
        } else {
            publish(&self.queue, Endpoint::Step, command, peer, None);
            close_ack(stream);
        }
        Ok(())
    }
}

/// Read until one complete command has arrived.
///
/// Clients may pad a frame to the full 20 bytes; bytes past the fixed
/// payload of a command are ignored.
fn read_frame(stream: &mut TcpStream) -> Result<Command> {
    let mut buf = [0u8; MAX_STEP_FRAME];
    let mut filled = 0;
    loop {
        let n = stream.read(&mut buf[filled..])?;
        filled += n;
        match Command::decode(&buf[..filled]) {
            Ok(command) => return Ok(command),
            Err(DecodeError::MalformedLength {
                expected: LengthRule::Exact(len),
                actual,
                ..
            }) if actual > len => return Ok(Command::decode(&buf[..4 + len])?),
            Err(e @ DecodeError::UnknownTag(_)) => return Err(Error::Decode(e)),
            Err(e) if n == 0 || filled == MAX_STEP_FRAME => return Err(Error::Decode(e)),
            Err(_) => continue,
        }
    }
}
