//! Render Loop
//!
//! Renders the router's current page into a [`Frame`] and pushes it to the
//! center display: once immediately, then on a fixed interval and whenever a
//! [`RenderSignal`] is raised (page switch, overlay change, config reload).
//!
//! A failed frame is logged and counted; the loop keeps running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::device::DisplayRegion;
use crate::error::Result;
use crate::router::SharedRouter;
use crate::session::DeviceSession;

/// Request for an out-of-band render.
///
/// Raising the signal several times before the loop wakes up produces one
/// render, not several.
#[derive(Debug, Clone, Default)]
pub struct RenderSignal {
    notify: Arc<Notify>,
    requests: Arc<AtomicU64>,
}

impl RenderSignal {
    /// Create an unconnected signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a render as soon as possible
    pub fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Total number of requests raised so far
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Wait for the next request
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Counters shared between a running loop and its handle
#[derive(Debug, Default)]
struct RenderStats {
    frames: AtomicU64,
    failures: AtomicU64,
}

/// Handle to a spawned render loop
#[derive(Debug)]
pub struct RenderLoop {
    handle: JoinHandle<()>,
    stats: Arc<RenderStats>,
    interval: Duration,
}

impl RenderLoop {
    /// Spawn the loop. The first frame renders immediately.
    pub fn spawn(
        router: SharedRouter,
        session: Arc<DeviceSession>,
        interval: Duration,
        signal: RenderSignal,
    ) -> Self {
        let stats = Arc::new(RenderStats::default());
        let loop_stats = Arc::clone(&stats);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = signal.notified() => {}
                }

                match render_frame(&router, &session).await {
                    Ok(()) => {
                        loop_stats.frames.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let failures = loop_stats.failures.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::warn!(error = %e, failures, "Frame render failed");
                    }
                }
            }
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Render loop started");
        Self {
            handle,
            stats,
            interval,
        }
    }

    /// Frames successfully pushed to the device
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.stats.frames.load(Ordering::Relaxed)
    }

    /// Frames that failed to render or push
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    /// Tick interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop rendering
    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::debug!(frames = self.frames(), "Render loop stopped");
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Render the current page once and push it to the center display
pub async fn render_frame(router: &SharedRouter, session: &DeviceSession) -> Result<()> {
    // The router lock is released before the device call suspends.
    let frame = router.lock().render();
    session.draw(DisplayRegion::Center, &frame).await
}
