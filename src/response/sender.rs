//! Outbound TCP replies.
//!
//! Every reply runs on its own short-lived thread so a slow or absent client
//! never stalls the tick loop:
//!
//! ```text
//! connect (retry with fixed backoff) ─▶ write header + payload
//!        ─▶ wait for the client to close (bounded) ─▶ close
//! ```
//!
//! Step acknowledgements reuse the client's own step-port connection: write
//! `ack`, then close.

use super::image::ImageResponse;
use crate::config::ResponseConfig;
use crate::error::{Error, Result};
use crate::protocol::response::ResponseHeader;
use crate::protocol::Tag;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Payload written to a step connection when its command completes
pub const STEP_ACK: &[u8] = b"ack";

/// Poll interval while waiting for the client to close
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Which reply port a response goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRoute {
    /// Scene and object replies
    Position,
    Metadata,
    /// Images and camera info
    Image,
}

/// Spawns one worker per reply
#[derive(Clone)]
pub struct ResponseSender {
    config: Arc<ResponseConfig>,
    running: Arc<AtomicBool>,
}

impl ResponseSender {
    pub fn new(config: ResponseConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            config: Arc::new(config),
            running,
        }
    }

    /// Reply address: the requester's IP on the route's reply port
    pub fn destination(&self, route: ReplyRoute, requester: SocketAddr) -> SocketAddr {
        let port = match route {
            ReplyRoute::Position => self.config.position_port,
            ReplyRoute::Metadata => self.config.metadata_port,
            ReplyRoute::Image => self.config.image_port,
        };
        SocketAddr::new(requester.ip(), port)
    }

    /// Send a tagged text payload
    pub fn send_text(
        &self,
        route: ReplyRoute,
        requester: SocketAddr,
        tag: Tag,
        text: String,
    ) -> Result<JoinHandle<()>> {
        let dest = self.destination(route, requester);
        self.spawn(format!("reply-{}", tag), move |delivery| {
            let mut stream = delivery.connect(dest)?;
            let header = ResponseHeader::new(tag, text.len());
            stream.write_all(&header.encode())?;
            stream.write_all(text.as_bytes())?;
            stream.flush()?;
            delivery.drain(stream);
            Ok(())
        })
    }

    /// Send an assembled multi-camera image response
    pub fn send_images(&self, requester: SocketAddr, response: ImageResponse) -> Result<JoinHandle<()>> {
        let dest = self.destination(ReplyRoute::Image, requester);
        self.spawn("reply-images".to_string(), move |delivery| {
            let mut stream = delivery.connect(dest)?;
            response.write_to(&mut stream)?;
            stream.flush()?;
            delivery.drain(stream);
            Ok(())
        })
    }

    /// Acknowledge a completed stepped command and close its connection
    pub fn send_ack(&self, stream: TcpStream) -> Result<JoinHandle<()>> {
        self.spawn("step-ack".to_string(), move |delivery| {
            let mut stream = stream;
            stream.set_write_timeout(Some(delivery.write_timeout()))?;
            stream.write_all(STEP_ACK)?;
            stream.flush()?;
            Ok(())
        })
    }

    fn spawn<F>(&self, name: String, job: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(&Delivery) -> io::Result<()> + Send + 'static,
    {
        let delivery = Delivery {
            config: Arc::clone(&self.config),
            running: Arc::clone(&self.running),
        };
        let label = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                if let Err(e) = job(&delivery) {
                    log::warn!("{}: reply abandoned: {}", label, e);
                }
            })
            .map_err(|source| Error::ThreadSpawn { name, source })
    }
}

/// Per-worker connection helpers
struct Delivery {
    config: Arc<ResponseConfig>,
    running: Arc<AtomicBool>,
}

impl Delivery {
    fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.config.write_timeout_ms.max(1))
    }

    /// Connect with a per-attempt timeout and a fixed backoff between
    /// attempts. Gives up after the configured attempts or on shutdown.
    fn connect(&self, dest: SocketAddr) -> io::Result<TcpStream> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms.max(1));
        let backoff = Duration::from_millis(self.config.connect_retry_ms);
        let attempts = self.config.connect_attempts.max(1);

        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect_timeout(&dest, timeout) {
                Ok(stream) => break stream,
                Err(e) if attempt < attempts && self.running.load(Ordering::Relaxed) => {
                    log::debug!(
                        "Connect to {} failed (attempt {}/{}): {}",
                        dest,
                        attempt,
                        attempts,
                        e
                    );
                    thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        };

        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.write_timeout()))?;
        Ok(stream)
    }

    /// Wait for the client to close its side so the reply is not truncated,
    /// then close ours. Bounded by `drain_timeout_ms`.
    fn drain(&self, mut stream: TcpStream) {
        let deadline = Instant::now() + Duration::from_millis(self.config.drain_timeout_ms);
        if let Err(e) = stream.set_read_timeout(Some(DRAIN_POLL)) {
            log::debug!("Drain setup failed: {}", e);
            return;
        }
        let mut scratch = [0u8; 64];
        while Instant::now() < deadline && self.running.load(Ordering::Relaxed) {
            match stream.read(&mut scratch) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(_) => return,
            }
        }
        log::debug!("Client did not close within drain timeout; closing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tags;
    use std::net::TcpListener;

    fn sender_for(listener: &TcpListener) -> ResponseSender {
        let port = listener.local_addr().unwrap().port();
        let config = ResponseConfig {
            position_port: port,
            metadata_port: port,
            image_port: port,
            connect_timeout_ms: 200,
            connect_retry_ms: 20,
            connect_attempts: 3,
            write_timeout_ms: 500,
            drain_timeout_ms: 300,
        };
        ResponseSender::new(config, Arc::new(AtomicBool::new(true)))
    }

    fn requester() -> SocketAddr {
        "127.0.0.1:55555".parse().unwrap()
    }

    #[test]
    fn test_destination_uses_route_port() {
        let sender = ResponseSender::new(
            ResponseConfig::default(),
            Arc::new(AtomicBool::new(true)),
        );
        let dest = sender.destination(ReplyRoute::Metadata, "10.1.2.3:4444".parse().unwrap());
        assert_eq!(dest, "10.1.2.3:9001".parse().unwrap());
    }

    #[test]
    fn test_text_reply_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let sender = sender_for(&listener);
        let handle = sender
            .send_text(
                ReplyRoute::Position,
                requester(),
                tags::SCENE_RESPONSE,
                "<scene/>\n".to_string(),
            )
            .unwrap();

        let (mut stream, _) = listener.accept().unwrap();
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).unwrap();
        let header = ResponseHeader::decode(&header).unwrap();
        assert_eq!(header.tag, tags::SCENE_RESPONSE);
        assert_eq!(header.length, 9);
        let mut body = vec![0u8; header.length as usize];
        stream.read_exact(&mut body).unwrap();
        assert_eq!(body, b"<scene/>\n");
        drop(stream);
        handle.join().unwrap();
    }

    #[test]
    fn test_drain_is_bounded_when_client_stays_open() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let sender = sender_for(&listener);
        let start = Instant::now();
        let handle = sender
            .send_text(ReplyRoute::Image, requester(), tags::CAMERA_INFO_RESPONSE, "x".into())
            .unwrap();
        let (_stream, _) = listener.accept().unwrap();
        // Keep the connection open; the worker must still finish
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_connect_gives_up_after_attempts() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let config = ResponseConfig {
            position_port: port,
            connect_timeout_ms: 100,
            connect_retry_ms: 10,
            connect_attempts: 2,
            ..ResponseConfig::default()
        };
        let sender = ResponseSender::new(config, Arc::new(AtomicBool::new(true)));
        let start = Instant::now();
        let handle = sender
            .send_text(ReplyRoute::Position, requester(), tags::OBJECTS_RESPONSE, "x".into())
            .unwrap();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_ack_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let sender = sender_for(&listener);
        sender.send_ack(server_side).unwrap().join().unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        assert_eq!(received, STEP_ACK);
    }
}
