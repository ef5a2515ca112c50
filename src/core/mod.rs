//! Core types and engine traits

pub mod adapter;
pub mod camera;
pub mod types;

pub use adapter::{CameraAdapter, ObjectHandle, RawImage, SimulationAdapter};
pub use camera::{CameraDescriptor, CameraKind, CameraRig, CameraSelector};
pub use types::{AgentState, Pose, Quat, Vec3};
