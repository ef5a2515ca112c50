//! Shared state between listener threads and the tick driver

pub mod queue;
pub mod registry;
pub mod session;

pub use queue::{
    Addressed, Admitted, CameraCommand, CommandQueue, ImageRequest, Movement, ObjectCommand,
    PendingCommands, PendingMovement, RejectReason, Rejected, TickBatch,
};
pub use registry::{ObjectRegistry, SpawnedObject};
pub use session::{
    ExecutionMode, SessionSnapshot, SessionState, StepCompletion, StepProgress, Transition,
};
