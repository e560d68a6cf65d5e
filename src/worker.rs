//! Single-threaded owner of a device session.
//!
//! Devices are driven with blocking I/O, so the session lives on its own
//! thread and async callers submit work through a [`SessionHandle`]. The
//! queue is drained one request at a time: there is never more than one
//! device operation in flight.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::VisionArmConfig;
use crate::dispatcher::{CommandDispatcher, DispatchReport};
use crate::error::BridgeError;
use crate::intent::{MotionIntent, Operation};
use crate::session::{DeviceSession, SessionState};

enum Request {
    Describe {
        reply: oneshot::Sender<DispatchReport>,
    },
    Execute {
        intent: MotionIntent,
        reply: oneshot::Sender<DispatchReport>,
    },
}

pub struct SessionWorker;

impl SessionWorker {
    /// Runs `open` on a fresh worker thread and waits for it. Startup errors
    /// are returned here and no handle is produced.
    pub async fn spawn<F>(config: VisionArmConfig, open: F) -> Result<SessionHandle, BridgeError>
    where
        F: FnOnce(&VisionArmConfig) -> Result<(DeviceSession, CommandDispatcher), BridgeError> + Send + 'static,
    {
        let (requests, queue) = channel::unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();
        let state = Arc::new(RwLock::new(SessionState::Uninitialized));
        let worker_state = Arc::clone(&state);

        let thread = thread::Builder::new()
            .name("session-worker".to_string())
            .spawn(move || {
                let (mut session, dispatcher) = match open(&config) {
                    Ok(parts) => parts,
                    Err(e) => {
                        *worker_state.write() = SessionState::Closed;
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                *worker_state.write() = session.state();
                let _ = ready_tx.send(Ok(()));

                serve(queue, &mut session, &dispatcher);

                session.close();
                *worker_state.write() = session.state();
            })
            .map_err(|e| BridgeError::unavailable("session worker", e))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Session worker started");
                Ok(SessionHandle {
                    requests: Some(requests),
                    thread: Some(thread),
                    state,
                })
            }
            Ok(Err(e)) => {
                error!("Session startup failed: {}", e);
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(BridgeError::SessionNotActive(SessionState::Closed))
            }
        }
    }
}

fn serve(queue: Receiver<Request>, session: &mut DeviceSession, dispatcher: &CommandDispatcher) {
    for request in queue.iter() {
        let (report, reply) = match request {
            Request::Describe { reply } => (dispatcher.describe(session), reply),
            Request::Execute { intent, reply } => (dispatcher.execute(intent, session), reply),
        };
        if reply.send(report).is_err() {
            warn!("Caller went away before its report was delivered");
        }
    }
    debug!("Request queue closed");
}

/// Async front for a session worker. Dropping it closes the queue; the
/// worker finishes what it is doing and then closes the session.
pub struct SessionHandle {
    requests: Option<Sender<Request>>,
    thread: Option<JoinHandle<()>>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub async fn describe(&self) -> Result<DispatchReport, BridgeError> {
        self.submit(|reply| Request::Describe { reply }).await
    }

    pub async fn execute(&self, intent: MotionIntent) -> Result<DispatchReport, BridgeError> {
        self.submit(|reply| Request::Execute { intent, reply }).await
    }

    pub async fn run(&self, operation: Operation) -> Result<DispatchReport, BridgeError> {
        match operation {
            Operation::Describe => self.describe().await,
            Operation::Motion(intent) => self.execute(intent).await,
        }
    }

    async fn submit<F>(&self, build: F) -> Result<DispatchReport, BridgeError>
    where
        F: FnOnce(oneshot::Sender<DispatchReport>) -> Request,
    {
        let requests = self.requests.as_ref().ok_or_else(|| self.not_active())?;
        let (reply, report) = oneshot::channel();
        requests.send(build(reply)).map_err(|_| self.not_active())?;
        report.await.map_err(|_| self.not_active())
    }

    fn not_active(&self) -> BridgeError {
        match self.state() {
            SessionState::Active => BridgeError::SessionNotActive(SessionState::Closed),
            other => BridgeError::SessionNotActive(other),
        }
    }

    /// Closes the queue and waits until the session has released its devices.
    pub async fn shutdown(mut self) {
        self.requests.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => info!("Session worker stopped"),
            Ok(Err(_)) => error!("Session worker panicked"),
            Err(e) => error!("Failed to join session worker: {}", e),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.requests.take();
    }
}
