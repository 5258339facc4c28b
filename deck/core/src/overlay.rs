//! Transient Overlays
//!
//! Show-temporarily / auto-hide / queue behavior shared by the volume, media
//! and notification panels.
//!
//! # State Machine
//!
//! ```text
//!            show_temporarily()            timeout or hide()
//!  Hidden  ─────────────────────▶ Visible ───────────────────▶ Hidden
//!    ▲                              │  ▲                          │
//!    │                              └──┘ show_temporarily()       │ queue not empty
//!    │                                   (timer replaced)         ▼
//!    └──────────────────────────────────────────────────── debounce, show next
//! ```
//!
//! Each overlay owns at most one pending timer: either the hide timer while
//! visible, or the debounce timer that brings up the next queued payload.
//! Arming a timer always aborts the previous one first, and every timer
//! carries a generation number so a timer that already woke up but lost the
//! race against its replacement does nothing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::render::RenderSignal;

/// Timing and queueing behavior of one overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayConfig {
    /// How long the overlay stays up after the last show
    pub timeout: Duration,
    /// Pause between hiding one queued payload and showing the next
    pub debounce: Duration,
    /// Whether shows while visible queue up instead of replacing
    pub queued: bool,
}

impl OverlayConfig {
    /// Volume and media panels: short timeout, no queue
    #[must_use]
    pub fn transient(timeout: Duration) -> Self {
        Self {
            timeout,
            debounce: Duration::ZERO,
            queued: false,
        }
    }

    /// Notification panels: FIFO queue with a debounce between items
    #[must_use]
    pub fn queued(timeout: Duration, debounce: Duration) -> Self {
        Self {
            timeout,
            debounce,
            queued: true,
        }
    }
}

/// What `show_notification` did with the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The payload is on screen now
    Shown,
    /// The payload waits behind the visible one
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Hide,
    ShowNext,
}

#[derive(Debug)]
struct PendingTimer {
    kind: TimerKind,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct OverlayState<P> {
    visible: bool,
    payload: Option<Arc<P>>,
    queue: VecDeque<Arc<P>>,
    timer: Option<PendingTimer>,
    generation: u64,
}

impl<P> OverlayState<P> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

/// Shared handle to one overlay's state.
///
/// Clones share state; the router's component and the feature handler that
/// drives it hold clones of the same overlay.
pub struct Overlay<P> {
    state: Arc<Mutex<OverlayState<P>>>,
    config: OverlayConfig,
    signal: RenderSignal,
}

impl<P> Clone for Overlay<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config,
            signal: self.signal.clone(),
        }
    }
}

impl<P: Send + Sync + 'static> Overlay<P> {
    /// Create a hidden overlay that raises `signal` whenever it changes
    #[must_use]
    pub fn new(config: OverlayConfig, signal: RenderSignal) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState {
                visible: false,
                payload: None,
                queue: VecDeque::new(),
                timer: None,
                generation: 0,
            })),
            config,
            signal,
        }
    }

    /// Timing configuration
    #[must_use]
    pub fn config(&self) -> OverlayConfig {
        self.config
    }

    /// Show the overlay and (re)arm the hide timer.
    ///
    /// `None` keeps the cached payload. Calling this while visible replaces
    /// the pending hide timer, so the overlay hides `timeout` after the last
    /// call.
    pub fn show_temporarily(&self, payload: Option<P>) {
        {
            let mut state = self.state.lock();
            if let Some(payload) = payload {
                state.payload = Some(Arc::new(payload));
            }
            self.show_locked(&mut state);
        }
        self.signal.request();
    }

    /// Show a payload, or queue it behind the one currently visible.
    ///
    /// Non-queueing overlays behave like [`Self::show_temporarily`].
    pub fn show_notification(&self, payload: P) -> NotificationOutcome {
        let outcome = {
            let mut state = self.state.lock();
            let busy = state.visible
                || matches!(
                    state.timer.as_ref().map(|t| t.kind),
                    Some(TimerKind::ShowNext)
                );
            if self.config.queued && busy {
                state.queue.push_back(Arc::new(payload));
                tracing::debug!(queued = state.queue.len(), "Overlay payload queued");
                NotificationOutcome::Queued
            } else {
                state.payload = Some(Arc::new(payload));
                self.show_locked(&mut state);
                NotificationOutcome::Shown
            }
        };
        if outcome == NotificationOutcome::Shown {
            self.signal.request();
        }
        outcome
    }

    /// Hide now. A queued payload comes up after the debounce.
    pub fn hide(&self) {
        {
            let mut state = self.state.lock();
            state.cancel_timer();
            self.hide_locked(&mut state);
        }
        self.signal.request();
    }

    /// Cancel any pending timer without touching visibility or payloads.
    ///
    /// Safe to call any number of times, on shown or never-shown overlays.
    pub fn cleanup(&self) {
        self.state.lock().cancel_timer();
    }

    /// Whether the overlay is on screen
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// The payload to render (a cheap reference clone)
    #[must_use]
    pub fn payload(&self) -> Option<Arc<P>> {
        self.state.lock().payload.clone()
    }

    /// Number of payloads waiting behind the visible one
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether a hide or show-next timer is pending
    #[must_use]
    pub fn has_pending_timer(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    fn show_locked(&self, state: &mut OverlayState<P>) {
        state.cancel_timer();
        state.visible = true;
        self.arm(state, TimerKind::Hide, self.config.timeout);
    }

    fn hide_locked(&self, state: &mut OverlayState<P>) {
        state.visible = false;
        if self.config.queued && !state.queue.is_empty() {
            self.arm(state, TimerKind::ShowNext, self.config.debounce);
        }
    }

    fn arm(&self, state: &mut OverlayState<P>, kind: TimerKind, delay: Duration) {
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let overlay = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            overlay.fire(generation);
        });
        state.timer = Some(PendingTimer {
            kind,
            generation,
            handle,
        });
    }

    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            let kind = match &state.timer {
                Some(timer) if timer.generation == generation => timer.kind,
                _ => return,
            };
            // Our own task is finishing; dropping the handle detaches it.
            state.timer = None;

            match kind {
                TimerKind::Hide => {
                    tracing::trace!("Overlay timed out");
                    self.hide_locked(&mut state);
                }
                TimerKind::ShowNext => {
                    if let Some(next) = state.queue.pop_front() {
                        state.payload = Some(next);
                        self.show_locked(&mut state);
                    }
                }
            }
        }
        self.signal.request();
    }
}

impl<P> std::fmt::Debug for Overlay<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Overlay")
            .field("visible", &state.visible)
            .field("queued", &state.queue.len())
            .field("timer", &state.timer.as_ref().map(|t| t.kind))
            .field("config", &self.config)
            .finish()
    }
}
