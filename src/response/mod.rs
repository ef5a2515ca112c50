//! Outbound replies: text responses, multi-camera image responses and step
//! acknowledgements

pub mod image;
pub mod sender;

pub use self::image::{ImageFrame, ImageResponse, assemble, frame_bound};
pub use sender::{ReplyRoute, ResponseSender, STEP_ACK};
