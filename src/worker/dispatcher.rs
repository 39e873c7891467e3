//! Synchronous call convention over the worker's command queue.
//!
//! Every call gets its own single-slot reply channel. The caller waits on it
//! in bounded slices and checks between slices whether the worker is still
//! alive, so a dead worker never leaves a caller hanging.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::command::{Command, Envelope};
use super::lifecycle::{DeviceState, WorkerState};
use crate::error::DispatchError;

/// State shared between the worker thread and everyone holding a dispatcher
#[derive(Debug)]
pub struct WorkerShared {
    alive: AtomicBool,
    keep_running: AtomicBool,
    state: Mutex<WorkerState>,
    device_state: Mutex<Option<DeviceState>>,
}

impl WorkerShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            keep_running: AtomicBool::new(true),
            state: Mutex::new(WorkerState::Idle),
            device_state: Mutex::new(None),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn keep_running(&self) -> bool {
        self.keep_running.load(Ordering::Acquire)
    }

    /// Ask the worker to wind down at its next idle wake-up
    pub fn request_stop(&self) {
        self.keep_running.store(false, Ordering::Release);
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Move to `next`; illegal transitions are refused and logged
    pub fn transition(&self, next: WorkerState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            debug!("Refusing worker transition {} -> {}", *state, next);
            return false;
        }
        trace!("Worker {} -> {}", *state, next);
        *state = next;
        true
    }

    pub fn device_state(&self) -> Option<DeviceState> {
        self.device_state.lock().clone()
    }

    pub fn publish(&self, snapshot: &DeviceState) {
        *self.device_state.lock() = Some(snapshot.clone());
    }
}

/// Caller side of the command queue. Cheap to clone; every clone feeds the
/// same FIFO.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Envelope>,
    shared: Arc<WorkerShared>,
    wait_slice: Duration,
}

/// Worker side of the command queue
pub struct CommandQueue {
    rx: Receiver<Envelope>,
}

/// Outcome of one bounded wait on the queue
#[derive(Debug)]
pub enum QueueEvent {
    Command(Envelope),
    Timeout,
    /// Every dispatcher has been dropped
    Closed,
}

/// Create a connected dispatcher/queue pair
pub fn channel(shared: Arc<WorkerShared>, wait_slice: Duration) -> (Dispatcher, CommandQueue) {
    let (tx, rx) = unbounded();
    (
        Dispatcher {
            tx,
            shared,
            wait_slice,
        },
        CommandQueue { rx },
    )
}

impl Dispatcher {
    /// Run `command` on the worker and wait for its result.
    ///
    /// Blocks until the worker has executed the command or is observed dead.
    /// A command the device refused comes back as [`DispatchError::Rejected`].
    pub fn call(&self, command: Command) -> Result<(), DispatchError> {
        if !self.shared.is_alive() {
            return Err(DispatchError::WorkerGone);
        }

        let kind = command.kind();
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Envelope::new(command, reply_tx))
            .map_err(|_| DispatchError::WorkerGone)?;

        loop {
            match reply_rx.recv_timeout(self.wait_slice) {
                Ok(true) => {
                    trace!("{} done", kind);
                    return Ok(());
                }
                Ok(false) => return Err(DispatchError::Rejected),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.shared.is_alive() {
                        debug!("Worker died while {} was pending", kind);
                        return Err(DispatchError::WorkerGone);
                    }
                }
                // envelope dropped unexecuted
                Err(RecvTimeoutError::Disconnected) => return Err(DispatchError::WorkerGone),
            }
        }
    }

    /// Boolean form of [`call`](Self::call): true only if the worker ran the
    /// command and the device accepted it
    pub fn submit(&self, command: Command) -> bool {
        self.call(command).is_ok()
    }

    pub fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }
}

impl CommandQueue {
    pub fn recv(&self, timeout: Duration) -> QueueEvent {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => QueueEvent::Command(envelope),
            Err(RecvTimeoutError::Timeout) => QueueEvent::Timeout,
            Err(RecvTimeoutError::Disconnected) => QueueEvent::Closed,
        }
    }

    pub fn try_next(&self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Drop everything still queued. Waiting callers see their reply channel
    /// close and fail.
    pub fn abandon_pending(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
