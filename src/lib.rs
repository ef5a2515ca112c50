//! SetuIO - Command server for a simulated agent
//!
//! Remote clients drive the agent and query its state over a small binary
//! protocol (4-byte ASCII tag plus little-endian payload). Commands arrive on
//! UDP datagram endpoints and a TCP step endpoint, are queued, and are
//! applied by a single tick driver between physics steps. Replies go back
//! over short-lived TCP connections to the requester's address.
//!
//! ```text
//! listeners ──publish──▶ CommandQueue ──drain──▶ TickDriver ──▶ engine
//!                                                    │
//!                                                    └──▶ ResponseSender / telemetry
//! ```

pub mod app;
pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod listeners;
pub mod protocol;
pub mod response;
pub mod sim;
pub mod state;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
