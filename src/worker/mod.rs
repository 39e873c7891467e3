//! Hardware worker: the single thread that owns the receiver, and the
//! command plumbing callers use to reach it.

pub mod command;
pub mod dispatcher;
pub mod hardware;
pub mod lifecycle;

pub use command::{Command, Envelope};
pub use dispatcher::{Dispatcher, WorkerShared};
pub use hardware::HardwareWorker;
pub use lifecycle::{DeviceState, WorkerState};
