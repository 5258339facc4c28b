//! Error Types
//!
//! Errors raised by the session, router, lock and system-control layers.
//! Configuration errors live in [`crate::config::ConfigError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced by the deck core
#[derive(Debug, Error)]
pub enum DeckError {
    /// Discovery found no device to connect to
    #[error("no control surface found: {0}")]
    DeviceNotFound(String),

    /// An operation required a connected device but the session has none
    #[error("device session is not connected")]
    NotConnected,

    /// A device call returned an error
    #[error("device error: {0}")]
    Device(String),

    /// A device call did not complete in time
    #[error("device call `{operation}` timed out after {timeout:?}")]
    Timeout {
        /// The device operation that timed out
        operation: &'static str,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// Drawing into the frame failed
    #[error("render failed: {0}")]
    Render(String),

    /// The instance lock record could not be read or written
    #[error("instance lock at {path}: {source}")]
    Lock {
        /// Path of the lock record
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A shell-level system command could not be spawned
    #[error("system command `{command}` failed to start: {source}")]
    System {
        /// The program that was invoked
        command: String,
        /// The underlying IO error
        source: std::io::Error,
    },
}

impl DeckError {
    /// Whether this error is worth retrying (device busy or slow)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Device(_))
    }

    /// Remediation hints printed when a fatal error ends startup
    #[must_use]
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::DeviceNotFound(_) | Self::NotConnected | Self::Device(_) | Self::Timeout { .. } => &[
                "Check that the device is plugged in and powered",
                "Check device permissions (udev rules for the USB device)",
                "Quit the vendor's official application, it holds the device exclusively",
            ],
            Self::Lock { .. } => &["Check that the runtime directory is writable"],
            Self::Config(_) => &["Fix the configuration file and restart, or send SIGHUP to reload it"],
            Self::Render(_) | Self::System { .. } => &[],
        }
    }
}

/// Convenience alias for results with [`DeckError`]
pub type Result<T> = std::result::Result<T, DeckError>;
