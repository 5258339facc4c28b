//! System Control
//!
//! Shell-level collaborators the feature handlers call: audio mixer, media
//! player, window-manager workspaces and process launching. Each call
//! returns a [`CommandOutput`] with the command's success flag and trimmed
//! stdout; a command that cannot even be spawned is a [`DeckError::System`].
//!
//! [`ShellControl`] drives `pactl`, `playerctl`, `wmctrl` and `sh -c`.
//! [`RecordingControl`] keeps state in memory and records every call.

use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{DeckError, Result};

/// Media player commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCommand {
    /// Toggle playback
    PlayPause,
    /// Skip to the next track
    Next,
    /// Go back to the previous track
    Previous,
}

impl MediaCommand {
    fn playerctl_arg(self) -> &'static str {
        match self {
            Self::PlayPause => "play-pause",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.playerctl_arg())
    }
}

/// Result of one shell command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Trimmed standard output
    pub stdout: String,
}

impl CommandOutput {
    /// A successful result with output
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
        }
    }

    /// A failed result
    #[must_use]
    pub fn failed() -> Self {
        Self::default()
    }
}

/// Current sink volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLevel {
    /// Volume percent, may exceed 100 on boosted sinks
    pub percent: u8,
    /// Whether the sink is muted
    pub muted: bool,
}

/// What the media player is playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track title
    pub title: String,
    /// Artist, possibly empty
    pub artist: String,
    /// Whether playback is running
    pub playing: bool,
}

/// Parse `pactl get-sink-volume` followed by `pactl get-sink-mute` output
#[must_use]
pub fn parse_volume(stdout: &str) -> Option<VolumeLevel> {
    let percent = stdout
        .split_whitespace()
        .find_map(|token| token.strip_suffix('%')?.parse::<u8>().ok())?;
    let muted = stdout
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("mute: yes"));
    Some(VolumeLevel { percent, muted })
}

/// Parse `playerctl metadata --format '{{status}}\t{{artist}}\t{{title}}'`
#[must_use]
pub fn parse_track(stdout: &str) -> Option<TrackInfo> {
    let mut fields = stdout.trim_end_matches(['\n', '\r']).splitn(3, '\t');
    let status = fields.next()?;
    let artist = fields.next()?;
    let title = fields.next()?;
    if title.is_empty() && artist.is_empty() {
        return None;
    }
    Some(TrackInfo {
        title: title.to_string(),
        artist: artist.to_string(),
        playing: status == "Playing",
    })
}

/// Shell-level system control
#[async_trait]
pub trait SystemControl: Send + Sync {
    /// Read the default sink volume and mute state
    async fn volume(&self) -> Result<CommandOutput>;

    /// Change the default sink volume by `delta` percent
    async fn set_volume_delta(&self, delta: i32) -> Result<CommandOutput>;

    /// Toggle mute on the default sink
    async fn toggle_mute(&self) -> Result<CommandOutput>;

    /// Send a media player command
    async fn media(&self, command: MediaCommand) -> Result<CommandOutput>;

    /// Read now-playing metadata
    async fn now_playing(&self) -> Result<CommandOutput>;

    /// Switch to a workspace, numbered from 1
    async fn switch_workspace(&self, workspace: u32) -> Result<CommandOutput>;

    /// Start a shell command without waiting for it
    async fn launch(&self, command: &str) -> Result<CommandOutput>;
}

/// [`SystemControl`] over the usual desktop command-line tools
#[derive(Debug, Clone)]
pub struct ShellControl {
    timeout: Duration,
}

impl Default for ShellControl {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl ShellControl {
    /// Create with the default per-command timeout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-command timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DeckError::Timeout {
                operation: "system command",
                timeout: self.timeout,
            })?
            .map_err(|source| DeckError::System {
                command: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        };
        tracing::debug!(program, ?args, success = result.success, "System command finished");
        Ok(result)
    }
}

#[async_trait]
impl SystemControl for ShellControl {
    async fn volume(&self) -> Result<CommandOutput> {
        let volume = self
            .run("pactl", &["get-sink-volume", "@DEFAULT_SINK@"])
            .await?;
        let mute = self.run("pactl", &["get-sink-mute", "@DEFAULT_SINK@"]).await?;
        Ok(CommandOutput {
            success: volume.success && mute.success,
            stdout: format!("{}\n{}", volume.stdout, mute.stdout),
        })
    }

    async fn set_volume_delta(&self, delta: i32) -> Result<CommandOutput> {
        let arg = format!("{delta:+}%");
        self.run("pactl", &["set-sink-volume", "@DEFAULT_SINK@", &arg])
            .await
    }

    async fn toggle_mute(&self) -> Result<CommandOutput> {
        self.run("pactl", &["set-sink-mute", "@DEFAULT_SINK@", "toggle"])
            .await
    }

    async fn media(&self, command: MediaCommand) -> Result<CommandOutput> {
        self.run("playerctl", &[command.playerctl_arg()]).await
    }

    async fn now_playing(&self) -> Result<CommandOutput> {
        self.run(
            "playerctl",
            &["metadata", "--format", "{{status}}\t{{artist}}\t{{title}}"],
        )
        .await
    }

    async fn switch_workspace(&self, workspace: u32) -> Result<CommandOutput> {
        // wmctrl counts desktops from 0
        let index = workspace.saturating_sub(1).to_string();
        self.run("wmctrl", &["-s", &index]).await
    }

    async fn launch(&self, command: &str) -> Result<CommandOutput> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DeckError::System {
                command: command.to_string(),
                source,
            })?;
        tracing::info!(command, pid = child.id(), "Launched process");
        Ok(CommandOutput::ok(""))
    }
}

/// One call recorded by [`RecordingControl`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCall {
    /// `volume`
    Volume,
    /// `set_volume_delta`
    VolumeDelta(i32),
    /// `toggle_mute`
    ToggleMute,
    /// `media`
    Media(MediaCommand),
    /// `now_playing`
    NowPlaying,
    /// `switch_workspace`
    Workspace(u32),
    /// `launch`
    Launch(String),
}

/// In-memory [`SystemControl`] that records calls
#[derive(Debug)]
pub struct RecordingControl {
    calls: Mutex<Vec<SystemCall>>,
    volume: Mutex<VolumeLevel>,
    track: Mutex<Option<TrackInfo>>,
    failing: AtomicBool,
}

impl Default for RecordingControl {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            volume: Mutex::new(VolumeLevel {
                percent: 50,
                muted: false,
            }),
            track: Mutex::new(None),
            failing: AtomicBool::new(false),
        }
    }
}

impl RecordingControl {
    /// Start at 50% volume with nothing playing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what `now_playing` reports
    pub fn set_track(&self, track: Option<TrackInfo>) {
        *self.track.lock() = track;
    }

    /// Make every command report failure
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls so far
    #[must_use]
    pub fn calls(&self) -> Vec<SystemCall> {
        self.calls.lock().clone()
    }

    /// Current simulated volume
    #[must_use]
    pub fn current_volume(&self) -> VolumeLevel {
        *self.volume.lock()
    }

    fn record(&self, call: SystemCall) -> bool {
        self.calls.lock().push(call);
        !self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemControl for RecordingControl {
    async fn volume(&self) -> Result<CommandOutput> {
        if !self.record(SystemCall::Volume) {
            return Ok(CommandOutput::failed());
        }
        let level = *self.volume.lock();
        let mute = if level.muted { "yes" } else { "no" };
        Ok(CommandOutput::ok(format!(
            "Volume: front-left: 0 / {}% / 0.00 dB\nMute: {mute}",
            level.percent
        )))
    }

    async fn set_volume_delta(&self, delta: i32) -> Result<CommandOutput> {
        if !self.record(SystemCall::VolumeDelta(delta)) {
            return Ok(CommandOutput::failed());
        }
        let mut level = self.volume.lock();
        let next = (i32::from(level.percent) + delta).clamp(0, 100);
        level.percent = u8::try_from(next).unwrap_or(100);
        Ok(CommandOutput::ok(""))
    }

    async fn toggle_mute(&self) -> Result<CommandOutput> {
        if !self.record(SystemCall::ToggleMute) {
            return Ok(CommandOutput::failed());
        }
        let mut level = self.volume.lock();
        level.muted = !level.muted;
        Ok(CommandOutput::ok(""))
    }

    async fn media(&self, command: MediaCommand) -> Result<CommandOutput> {
        if !self.record(SystemCall::Media(command)) {
            return Ok(CommandOutput::failed());
        }
        if command == MediaCommand::PlayPause {
            if let Some(track) = self.track.lock().as_mut() {
                track.playing = !track.playing;
            }
        }
        Ok(CommandOutput::ok(""))
    }

    async fn now_playing(&self) -> Result<CommandOutput> {
        if !self.record(SystemCall::NowPlaying) {
            return Ok(CommandOutput::failed());
        }
        let stdout = self.track.lock().as_ref().map_or_else(String::new, |t| {
            let status = if t.playing { "Playing" } else { "Paused" };
            format!("{status}\t{}\t{}", t.artist, t.title)
        });
        Ok(CommandOutput {
            success: !stdout.is_empty(),
            stdout,
        })
    }

    async fn switch_workspace(&self, workspace: u32) -> Result<CommandOutput> {
        let ok = self.record(SystemCall::Workspace(workspace));
        Ok(if ok { CommandOutput::ok("") } else { CommandOutput::failed() })
    }

    async fn launch(&self, command: &str) -> Result<CommandOutput> {
        let ok = self.record(SystemCall::Launch(command.to_string()));
        Ok(if ok { CommandOutput::ok("") } else { CommandOutput::failed() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pactl_volume() {
        let stdout = "Volume: front-left: 42598 /  65% / -11.23 dB,   front-right: 42598 /  65% / -11.23 dB\n        balance 0.00\nMute: no";
        assert_eq!(
            parse_volume(stdout),
            Some(VolumeLevel {
                percent: 65,
                muted: false
            })
        );
        assert_eq!(parse_volume("Volume: 10%\nMute: yes").map(|v| v.muted), Some(true));
        assert_eq!(parse_volume("no sink"), None);
    }

    #[test]
    fn test_parse_playerctl_track() {
        let track = parse_track("Playing\tBoards of Canada\tRoygbiv\n").unwrap();
        assert_eq!(track.title, "Roygbiv");
        assert_eq!(track.artist, "Boards of Canada");
        assert!(track.playing);

        let paused = parse_track("Paused\t\tUntitled").unwrap();
        assert!(!paused.playing);
        assert_eq!(paused.artist, "");

        assert_eq!(parse_track(""), None);
        assert_eq!(parse_track("Stopped\t\t"), None);
    }

    #[tokio::test]
    async fn test_recording_control_volume_round_trip() {
        let control = RecordingControl::new();
        control.set_volume_delta(30).await.unwrap();
        control.set_volume_delta(40).await.unwrap();
        control.toggle_mute().await.unwrap();

        let output = control.volume().await.unwrap();
        assert!(output.success);
        assert_eq!(
            parse_volume(&output.stdout),
            Some(VolumeLevel {
                percent: 100,
                muted: true
            })
        );
    }

    #[tokio::test]
    async fn test_recording_control_failure_mode() {
        let control = RecordingControl::new();
        control.set_failing(true);
        let output = control.launch("true").await.unwrap();
        assert!(!output.success);
        assert_eq!(control.calls(), vec![SystemCall::Launch("true".into())]);
    }

    #[tokio::test]
    async fn test_shell_control_reports_exit_status() {
        let shell = ShellControl::new();
        let output = shell.run("sh", &["-c", "echo hello; exit 0"]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");

        let failed = shell.run("sh", &["-c", "exit 3"]).await.unwrap();
        assert!(!failed.success);
    }

    #[tokio::test]
    async fn test_shell_control_missing_program() {
        let shell = ShellControl::new();
        let result = shell.run("definitely-not-a-real-program-xyz", &[]).await;
        assert!(matches!(result, Err(DeckError::System { .. })));
    }
}
