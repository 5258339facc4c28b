//! Shutdown Coordination
//!
//! Tears the runtime down in a fixed order under one forced deadline:
//!
//! 1. external cleanup hook
//! 2. stop the render loop and the event wiring
//! 3. cancel every overlay timer
//! 4. disconnect the session (clear LEDs and screens, close)
//! 5. release the instance lock
//!
//! Every step swallows its own failures. If the whole sequence overruns the
//! deadline it is abandoned; the lock guard's drop still removes the record.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::lock::InstanceLock;
use crate::render::RenderLoop;
use crate::router::SharedRouter;
use crate::session::DeviceSession;
use crate::wiring::EventWiring;

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every step ran
    Completed,
    /// The deadline passed first
    Forced,
    /// Another caller already ran the shutdown
    AlreadyRunning,
}

/// Everything shutdown tears down. Absent parts are skipped.
#[derive(Debug, Default)]
pub struct Teardown {
    /// Render loop to stop
    pub render: Option<RenderLoop>,
    /// Event wiring to stop
    pub wiring: Option<EventWiring>,
    /// Router whose overlays are cleaned up
    pub router: Option<SharedRouter>,
    /// Session to disconnect
    pub session: Option<Arc<DeviceSession>>,
    /// Lock to release
    pub lock: Option<InstanceLock>,
}

/// Idempotent exit coordinator
#[derive(Debug)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    ran: AtomicBool,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a forced-exit deadline
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            requested: AtomicBool::new(false),
            ran: AtomicBool::new(false),
            timeout,
        }
    }

    /// Mark shutdown as requested.
    ///
    /// Returns true for the first request only; later requests (a second
    /// Ctrl-C) are no-ops.
    pub fn begin(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::SeqCst);
        if first {
            tracing::info!("Shutdown requested");
        } else {
            tracing::info!("Shutdown already in progress");
        }
        first
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// The forced-exit deadline
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the teardown once, bounded by the deadline.
    pub async fn run<F>(&self, cleanup: F, teardown: Teardown) -> ShutdownOutcome
    where
        F: Future<Output = ()>,
    {
        self.requested.store(true, Ordering::SeqCst);
        if self.ran.swap(true, Ordering::SeqCst) {
            return ShutdownOutcome::AlreadyRunning;
        }

        match timeout(self.timeout, run_steps(cleanup, teardown)).await {
            Ok(()) => {
                tracing::info!("Shutdown complete");
                ShutdownOutcome::Completed
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Shutdown did not finish in time, forcing exit"
                );
                ShutdownOutcome::Forced
            }
        }
    }
}

async fn run_steps<F>(cleanup: F, teardown: Teardown)
where
    F: Future<Output = ()>,
{
    let Teardown {
        render,
        wiring,
        router,
        session,
        lock,
    } = teardown;

    cleanup.await;

    if let Some(render) = render {
        tracing::debug!(frames = render.frames(), "Stopping render loop");
        render.stop();
    }
    if let Some(wiring) = wiring {
        wiring.stop();
    }
    if let Some(router) = router {
        router.lock().cleanup();
    }
    if let Some(session) = session {
        session.disconnect().await;
    }
    if let Some(lock) = lock {
        lock.release().await;
    }
}
