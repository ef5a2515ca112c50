//! Wire protocol: inbound commands, response framing and XML payloads
//!
//! All integers and floats are little-endian 32-bit. Every message starts
//! with a four-byte ASCII [`Tag`].

pub mod command;
pub mod payload;
pub mod response;
pub mod tags;

pub use command::{
    CameraParams, CameraRequest, Command, CommandFamily, DecodeError, ForceInput, LengthRule,
    SpawnMethod, SpawnRequest, TeleportDelta,
};
pub use response::{ImageHeader, MultiImageHeader, PixelFormat, ResponseHeader};
pub use tags::Tag;
