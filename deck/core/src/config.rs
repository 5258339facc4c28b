//! TOML Configuration File Support
//!
//! Configuration for the deck daemon lives in a TOML file at
//! `$XDG_CONFIG_HOME/deck/deck.toml`.
//!
//! # Configuration Priority
//!
//! Values are layered with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`DECK_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! A configuration is validated as a whole before it is handed out, so a bad
//! file never reaches the running pages; on hot reload the caller keeps the
//! last good configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [session]
//! ready_attempts = 30
//! led_retries = 3
//!
//! [render]
//! interval_ms = 1000
//!
//! [[pages]]
//! number = 1
//!
//! [[pages.components]]
//! name = "terminal"
//! type = "button"
//! position = { col = 0, row = 0 }
//! command = "alacritty"
//! options = { label = "Term", action = "launch", background = "#202040" }
//!
//! [[pages.components]]
//! name = "volume"
//! type = "volume"
//!
//! [[knobs]]
//! id = "knobTL"
//! action = "volume"
//! step = 5
//!
//! [[buttons]]
//! id = "1"
//! action = "page:2"
//! led = "#00ff00"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::Component;
use crate::device::DeviceGeometry;
use crate::geometry::Cell;
use crate::lock::LockConfig;
use crate::overlay::OverlayConfig;
use crate::session::SessionConfig;
use crate::system::MediaCommand;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A component descriptor does not fit its type
    #[error("component `{name}`: {reason}")]
    Component {
        /// Descriptor name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Validation(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// Parse a `#rrggbb` color
#[must_use]
pub fn parse_color(text: &str) -> Option<Rgb888> {
    let hex = text.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb888::new(channel(0)?, channel(2)?, channel(4)?))
}

/// A color written as `#rrggbb` in the config file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub Rgb888);

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_color(&value)
            .map(HexColor)
            .ok_or_else(|| format!("`{value}` is not a #rrggbb color"))
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        let c = color.0;
        format!("#{:02x}{:02x}{:02x}", c.r(), c.g(), c.b())
    }
}

/// What a touch button or hardware button does when pressed.
///
/// Written as a short string: `launch`, `page:2`, `workspace:3`, `mute`,
/// `play_pause`, `next_track`, `previous_track`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlAction {
    /// Run the descriptor's `command`
    Launch,
    /// Switch to a page
    Page(u32),
    /// Switch the window manager to a workspace
    Workspace(u32),
    /// Toggle audio mute
    Mute,
    /// Media player control
    Media(MediaCommand),
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = |arg: &str| {
            arg.parse::<u32>()
                .map_err(|_| format!("`{s}`: `{arg}` is not a number"))
        };
        match s.split_once(':') {
            Some(("page", n)) => Ok(Self::Page(number(n)?)),
            Some(("workspace", n)) => Ok(Self::Workspace(number(n)?)),
            Some(_) => Err(format!("unknown action `{s}`")),
            None => match s {
                "launch" => Ok(Self::Launch),
                "mute" => Ok(Self::Mute),
                "play_pause" => Ok(Self::Media(MediaCommand::PlayPause)),
                "next_track" => Ok(Self::Media(MediaCommand::Next)),
                "previous_track" => Ok(Self::Media(MediaCommand::Previous)),
                _ => Err(format!("unknown action `{s}`")),
            },
        }
    }
}

impl TryFrom<String> for ControlAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControlAction> for String {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Launch => "launch".into(),
            ControlAction::Page(n) => format!("page:{n}"),
            ControlAction::Workspace(n) => format!("workspace:{n}"),
            ControlAction::Mute => "mute".into(),
            ControlAction::Media(MediaCommand::PlayPause) => "play_pause".into(),
            ControlAction::Media(MediaCommand::Next) => "next_track".into(),
            ControlAction::Media(MediaCommand::Previous) => "previous_track".into(),
        }
    }
}

// =============================================================================
// Pages and Bindings
// =============================================================================

/// Kinds of visual component a descriptor can name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Touch button bound to an action
    Button,
    /// Static text
    Label,
    /// Volume level overlay
    Volume,
    /// Now-playing overlay
    Media,
    /// Queued notification overlay
    Notification,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Button => "button",
            Self::Label => "label",
            Self::Volume => "volume",
            Self::Media => "media",
            Self::Notification => "notification",
        };
        f.write_str(name)
    }
}

/// One named component on a page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Unique name within its page
    pub name: String,
    /// Component kind
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Grid cell; omitted for overlays spanning the grid
    #[serde(default)]
    pub position: Option<Cell>,
    /// Kind-specific visual and action options
    #[serde(default)]
    pub options: toml::Table,
    /// Shell command for `launch` actions
    #[serde(default)]
    pub command: Option<String>,
}

/// A numbered page and its components, in layering order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Page number, starting at 1
    pub number: u32,
    /// Components, later entries on top
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

/// What a knob controls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnobAction {
    /// System volume
    Volume,
    /// Step through pages, wrapping around
    Page,
}

/// Binding for a rotary knob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnobBinding {
    /// Knob id as reported by the device
    pub id: String,
    /// What turning it does
    pub action: KnobAction,
    /// Volume percent per detent
    #[serde(default = "default_knob_step")]
    pub step: i32,
}

fn default_knob_step() -> i32 {
    5
}

/// Binding for a physical LED button
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    /// Button id as reported by the device
    pub id: String,
    /// What pressing it does
    pub action: ControlAction,
    /// Shell command for `launch`
    #[serde(default)]
    pub command: Option<String>,
    /// LED color while the binding is active
    #[serde(default)]
    pub led: Option<HexColor>,
    /// Page this binding's LED belongs to; `None` lights it on every page
    #[serde(default)]
    pub page: Option<u32>,
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Device section: geometry of the virtual device
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceToml {
    /// Cell edge length in pixels
    pub key_size: Option<u32>,
    /// Grid columns
    pub columns: Option<u16>,
    /// Grid rows
    pub rows: Option<u16>,
    /// Center display width in pixels
    pub width: Option<u32>,
    /// Center display height in pixels
    pub height: Option<u32>,
}

/// Session section: readiness probe and LED retry tuning
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Button whose LED is set to probe readiness
    pub probe_button: Option<String>,
    /// Readiness probe attempts
    pub ready_attempts: Option<u32>,
    /// Spacing between readiness probes in milliseconds
    pub ready_interval_ms: Option<u64>,
    /// Timeout for one readiness probe in milliseconds
    pub ready_probe_timeout_ms: Option<u64>,
    /// Wait after a successful probe in milliseconds
    pub ready_grace_ms: Option<u64>,
    /// LED set attempts
    pub led_retries: Option<u32>,
    /// Timeout per LED attempt in milliseconds
    pub led_timeout_ms: Option<u64>,
    /// Backoff between LED attempts in milliseconds
    pub led_backoff_ms: Option<u64>,
    /// Timeout for pushing one frame in milliseconds
    pub draw_timeout_ms: Option<u64>,
    /// Bound on closing the handle in milliseconds
    pub close_timeout_ms: Option<u64>,
    /// Forced-exit bound on shutdown in milliseconds
    pub shutdown_timeout_ms: Option<u64>,
}

/// Lock section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockToml {
    /// Lock record path
    pub path: Option<PathBuf>,
    /// How long to wait for a live holder in milliseconds
    pub wait_ms: Option<u64>,
    /// Poll interval while waiting in milliseconds
    pub poll_ms: Option<u64>,
}

/// Render section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderToml {
    /// Render loop interval in milliseconds
    pub interval_ms: Option<u64>,
}

/// Overlay section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayToml {
    /// Volume overlay timeout in milliseconds
    pub volume_timeout_ms: Option<u64>,
    /// Media overlay timeout in milliseconds
    pub media_timeout_ms: Option<u64>,
    /// Notification timeout in milliseconds
    pub notification_timeout_ms: Option<u64>,
    /// Gap between queued notifications in milliseconds
    pub notification_debounce_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckToml {
    /// Device section
    pub device: DeviceToml,
    /// Session section
    pub session: SessionToml,
    /// Lock section
    pub lock: LockToml,
    /// Render section
    pub render: RenderToml,
    /// Overlay section
    pub overlay: OverlayToml,
    /// Pages
    pub pages: Vec<PageConfig>,
    /// Knob bindings
    pub knobs: Vec<KnobBinding>,
    /// Button bindings
    pub buttons: Vec<ButtonBinding>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Timeouts for the three overlay kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayTimings {
    /// Volume overlay timeout
    pub volume: Duration,
    /// Media overlay timeout
    pub media: Duration,
    /// Notification timeout
    pub notification: Duration,
    /// Gap between queued notifications
    pub notification_debounce: Duration,
}

impl Default for OverlayTimings {
    fn default() -> Self {
        Self {
            volume: Duration::from_millis(2000),
            media: Duration::from_millis(3000),
            notification: Duration::from_millis(5000),
            notification_debounce: Duration::from_millis(300),
        }
    }
}

impl OverlayTimings {
    /// Overlay behavior for the volume panel
    #[must_use]
    pub fn volume_config(&self) -> OverlayConfig {
        OverlayConfig::transient(self.volume)
    }

    /// Overlay behavior for the media panel
    #[must_use]
    pub fn media_config(&self) -> OverlayConfig {
        OverlayConfig::transient(self.media)
    }

    /// Overlay behavior for the notification panel
    #[must_use]
    pub fn notification_config(&self) -> OverlayConfig {
        OverlayConfig::queued(self.notification, self.notification_debounce)
    }
}

/// Centralized configuration for the deck daemon
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct DeckConfig {
    /// Geometry used for validation and for the virtual device
    pub device: DeviceGeometry,
    /// Session tuning
    pub session: SessionConfig,
    /// Instance lock
    pub lock: LockConfig,
    /// Render loop interval
    pub render_interval: Duration,
    /// Overlay timeouts
    pub overlays: OverlayTimings,
    /// Forced-exit bound on shutdown
    pub shutdown_timeout: Duration,
    /// Pages in file order
    pub pages: Vec<PageConfig>,
    /// Knob bindings
    pub knobs: Vec<KnobBinding>,
    /// Button bindings
    pub buttons: Vec<ButtonBinding>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            device: DeviceGeometry {
                key_size: 90,
                columns: 4,
                rows: 3,
                center: Size::new(480, 270),
            },
            session: SessionConfig::default(),
            lock: LockConfig::default(),
            render_interval: Duration::from_millis(1000),
            overlays: OverlayTimings::default(),
            shutdown_timeout: Duration::from_secs(5),
            pages: Vec::new(),
            knobs: Vec::new(),
            buttons: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl DeckConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Page numbers in ascending order, always including page 1
    #[must_use]
    pub fn page_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.pages.iter().map(|p| p.number).collect();
        numbers.push(1);
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    /// LED colors to push when `page` becomes current
    #[must_use]
    pub fn led_colors(&self, page: u32) -> Vec<(String, Rgb888)> {
        self.buttons
            .iter()
            .filter(|b| b.page.map_or(true, |p| p == page))
            .filter_map(|b| b.led.map(|c| (b.id.clone(), c.0)))
            .collect()
    }

    /// Check the whole configuration
    ///
    /// # Errors
    ///
    /// Returns the first problem found: zero timings, a page number of 0 or
    /// used twice, duplicate component names within a page, positions
    /// outside the grid, options that don't fit their component type, or
    /// bindings missing what their action needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let geometry = &self.device;
        if geometry.key_size == 0 || geometry.columns == 0 || geometry.rows == 0 {
            return Err(invalid("device geometry must be non-zero"));
        }
        let grid_width = geometry.key_size.checked_mul(u32::from(geometry.columns));
        let grid_height = geometry.key_size.checked_mul(u32::from(geometry.rows));
        let (Some(grid_width), Some(_)) = (grid_width, grid_height) else {
            return Err(invalid("device grid is too large"));
        };
        if i32::try_from(grid_width).is_err() {
            return Err(invalid("device grid is too large"));
        }
        if geometry.center.width < grid_width {
            return Err(invalid("device width is narrower than the grid"));
        }

        let session = &self.session;
        let timings = [
            ("render.interval_ms", self.render_interval),
            ("session.ready_interval_ms", session.ready_interval),
            ("session.ready_probe_timeout_ms", session.ready_probe_timeout),
            ("session.led_timeout_ms", session.led_timeout),
            ("session.draw_timeout_ms", session.draw_timeout),
            ("session.close_timeout_ms", session.close_timeout),
            ("session.shutdown_timeout_ms", self.shutdown_timeout),
            ("lock.poll_ms", self.lock.poll),
            ("overlay.volume_timeout_ms", self.overlays.volume),
            ("overlay.media_timeout_ms", self.overlays.media),
            ("overlay.notification_timeout_ms", self.overlays.notification),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, d)| d.is_zero()) {
            return Err(invalid(format!("{name} must be greater than zero")));
        }
        if session.led_retries == 0 {
            return Err(invalid("session.led_retries must be at least 1"));
        }

        let mut numbers = HashSet::new();
        for page in &self.pages {
            if page.number == 0 {
                return Err(invalid("page numbers start at 1"));
            }
            if !numbers.insert(page.number) {
                return Err(invalid(format!("page {} is defined twice", page.number)));
            }

            let mut names = HashSet::new();
            for descriptor in &page.components {
                if !names.insert(descriptor.name.as_str()) {
                    return Err(invalid(format!(
                        "page {}: component name `{}` is used twice",
                        page.number, descriptor.name
                    )));
                }
                if let Some(cell) = descriptor.position {
                    if cell.col >= geometry.columns || cell.row >= geometry.rows {
                        return Err(ConfigError::Component {
                            name: descriptor.name.clone(),
                            reason: format!("position {cell} is outside the grid"),
                        });
                    }
                }
                Component::check_descriptor(descriptor)?;
            }
        }

        let mut knob_ids = HashSet::new();
        for knob in &self.knobs {
            if !knob_ids.insert(knob.id.as_str()) {
                return Err(invalid(format!("knob `{}` is bound twice", knob.id)));
            }
        }

        let mut button_ids = HashSet::new();
        for button in &self.buttons {
            if !button_ids.insert((button.id.as_str(), button.page)) {
                return Err(invalid(format!("button `{}` is bound twice", button.id)));
            }
            if button.action == ControlAction::Launch && button.command.is_none() {
                return Err(invalid(format!(
                    "button `{}`: launch needs a command",
                    button.id
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/deck/deck.toml` or `~/.config/deck/deck.toml`
/// if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("deck").join("deck.toml"))
}

/// Load and validate configuration from the default path
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the layered result fails validation.
pub async fn load_config() -> Result<DeckConfig, ConfigError> {
    load_config_from_path(default_config_path()).await
}

/// Load and validate configuration from a specific path
///
/// A missing file is not an error (defaults are used).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// layered result fails validation.
pub async fn load_config_from_path(path: Option<PathBuf>) -> Result<DeckConfig, ConfigError> {
    let mut config = DeckConfig::default();

    if let Some(ref config_path) = path {
        match tokio::fs::read_to_string(config_path).await {
            Ok(content) => {
                let toml_config: DeckToml = toml::from_str(&content)?;
                apply_toml_config(&mut config, toml_config);
                config.config_file_path = Some(config_path.clone());
                config.source = ConfigSource::File;

                tracing::info!(
                    path = %config_path.display(),
                    pages = config.pages.len(),
                    "Loaded configuration from file"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %config_path.display(),
                    "Config file not found, using defaults"
                );
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: config_path.clone(),
                    source: e,
                })
            }
        }
    }

    apply_env_config(&mut config);
    config.validate()?;
    Ok(config)
}

/// Parse and validate configuration text, without environment overrides
///
/// # Errors
///
/// Returns an error if the text is not valid TOML or fails validation.
pub fn parse_config(text: &str) -> Result<DeckConfig, ConfigError> {
    let mut config = DeckConfig::default();
    apply_toml_config(&mut config, toml::from_str(text)?);
    config.source = ConfigSource::File;
    config.validate()?;
    Ok(config)
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut DeckConfig, toml: DeckToml) {
    // Device settings
    let device = &mut config.device;
    if let Some(size) = toml.device.key_size {
        device.key_size = size;
    }
    if let Some(columns) = toml.device.columns {
        device.columns = columns;
    }
    if let Some(rows) = toml.device.rows {
        device.rows = rows;
    }
    if let Some(width) = toml.device.width {
        device.center.width = width;
    }
    if let Some(height) = toml.device.height {
        device.center.height = height;
    }

    // Session settings
    let session = &mut config.session;
    if let Some(button) = toml.session.probe_button {
        session.probe_button = button;
    }
    if let Some(attempts) = toml.session.ready_attempts {
        session.ready_attempts = attempts;
    }
    if let Some(ms) = toml.session.ready_interval_ms {
        session.ready_interval = millis(ms);
    }
    if let Some(ms) = toml.session.ready_probe_timeout_ms {
        session.ready_probe_timeout = millis(ms);
    }
    if let Some(ms) = toml.session.ready_grace_ms {
        session.ready_grace = millis(ms);
    }
    if let Some(retries) = toml.session.led_retries {
        session.led_retries = retries;
    }
    if let Some(ms) = toml.session.led_timeout_ms {
        session.led_timeout = millis(ms);
    }
    if let Some(ms) = toml.session.led_backoff_ms {
        session.led_backoff = millis(ms);
    }
    if let Some(ms) = toml.session.draw_timeout_ms {
        session.draw_timeout = millis(ms);
    }
    if let Some(ms) = toml.session.close_timeout_ms {
        session.close_timeout = millis(ms);
    }
    if let Some(ms) = toml.session.shutdown_timeout_ms {
        config.shutdown_timeout = millis(ms);
    }

    // Lock settings
    if let Some(path) = toml.lock.path {
        config.lock.path = path;
    }
    if let Some(ms) = toml.lock.wait_ms {
        config.lock.wait = millis(ms);
    }
    if let Some(ms) = toml.lock.poll_ms {
        config.lock.poll = millis(ms);
    }

    // Render and overlay settings
    if let Some(ms) = toml.render.interval_ms {
        config.render_interval = millis(ms);
    }
    if let Some(ms) = toml.overlay.volume_timeout_ms {
        config.overlays.volume = millis(ms);
    }
    if let Some(ms) = toml.overlay.media_timeout_ms {
        config.overlays.media = millis(ms);
    }
    if let Some(ms) = toml.overlay.notification_timeout_ms {
        config.overlays.notification = millis(ms);
    }
    if let Some(ms) = toml.overlay.notification_debounce_ms {
        config.overlays.notification_debounce = millis(ms);
    }

    config.pages = toml.pages;
    config.knobs = toml.knobs;
    config.buttons = toml.buttons;
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut DeckConfig) {
    apply_env_with(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`
fn apply_env_with(config: &mut DeckConfig, lookup: impl Fn(&str) -> Option<String>) {
    fn number<T: FromStr>(key: &str, value: &str) -> Option<T> {
        let parsed = value.parse().ok();
        if parsed.is_none() {
            tracing::warn!(var = key, value, "Ignoring unparsable environment override");
        }
        parsed
    }

    if let Some(path) = lookup("DECK_LOCK_PATH") {
        config.lock.path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("DECK_RENDER_INTERVAL_MS").and_then(|v| number("DECK_RENDER_INTERVAL_MS", &v)) {
        config.render_interval = millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(n) = lookup("DECK_READY_ATTEMPTS").and_then(|v| number("DECK_READY_ATTEMPTS", &v)) {
        config.session.ready_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = lookup("DECK_LED_RETRIES").and_then(|v| number("DECK_LED_RETRIES", &v)) {
        config.session.led_retries = n;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = lookup("DECK_SHUTDOWN_TIMEOUT_MS").and_then(|v| number("DECK_SHUTDOWN_TIMEOUT_MS", &v)) {
        config.shutdown_timeout = millis(ms);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Lock record path override
    pub lock_path: Option<PathBuf>,

    /// Render interval override (milliseconds)
    pub render_interval_ms: Option<u64>,

    /// Readiness probe attempts override
    pub ready_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set lock path override
    #[must_use]
    pub fn with_lock_path(mut self, path: PathBuf) -> Self {
        self.lock_path = Some(path);
        self
    }

    /// Set render interval override
    #[must_use]
    pub fn with_render_interval_ms(mut self, ms: u64) -> Self {
        self.render_interval_ms = Some(ms);
        self
    }

    /// Set readiness attempts override
    #[must_use]
    pub fn with_ready_attempts(mut self, attempts: u32) -> Self {
        self.ready_attempts = Some(attempts);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an override makes the configuration invalid.
    pub fn apply(&self, config: &mut DeckConfig) -> Result<(), ConfigError> {
        if self.lock_path.is_some()
            || self.render_interval_ms.is_some()
            || self.ready_attempts.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref path) = self.lock_path {
            config.lock.path = path.clone();
        }
        if let Some(ms) = self.render_interval_ms {
            config.render_interval = millis(ms);
        }
        if let Some(attempts) = self.ready_attempts {
            config.session.ready_attempts = attempts;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio_test::{assert_err, assert_ok};

    const FULL: &str = r##"
[device]
key_size = 90
columns = 4
rows = 2
width = 480
height = 180

[session]
probe_button = "1"
ready_attempts = 10
led_retries = 5
led_backoff_ms = 100
draw_timeout_ms = 750

[lock]
wait_ms = 1000
poll_ms = 50

[render]
interval_ms = 250

[overlay]
volume_timeout_ms = 1500
notification_debounce_ms = 100

[[pages]]
number = 1

[[pages.components]]
name = "term"
type = "button"
position = { col = 0, row = 0 }
command = "alacritty"
options = { label = "Term", action = "launch" }

[[pages.components]]
name = "vol"
type = "volume"

[[pages]]
number = 2

[[pages.components]]
name = "clock"
type = "label"
position = { col = 3, row = 1 }
options = { text = "12:00" }

[[knobs]]
id = "knobTL"
action = "volume"

[[buttons]]
id = "1"
action = "page:1"
led = "#00ff00"
page = 1

[[buttons]]
id = "2"
action = "page:2"
led = "#0000ff"
"##;

    #[test]
    fn test_default_config() {
        let config = DeckConfig::default();
        assert_eq!(config.render_interval, Duration::from_millis(1000));
        assert_eq!(config.session.ready_attempts, 30);
        assert_eq!(config.session.led_retries, 3);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("deck/deck.toml"));
        }
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(FULL).unwrap();

        assert_eq!(config.device.rows, 2);
        assert_eq!(config.session.probe_button, "1");
        assert_eq!(config.session.ready_attempts, 10);
        assert_eq!(config.session.led_retries, 5);
        assert_eq!(config.session.led_backoff, Duration::from_millis(100));
        assert_eq!(config.session.draw_timeout, Duration::from_millis(750));
        // Unset values keep their defaults
        assert_eq!(config.session.ready_interval, Duration::from_millis(1000));
        assert_eq!(config.lock.poll, Duration::from_millis(50));
        assert_eq!(config.render_interval, Duration::from_millis(250));
        assert_eq!(config.overlays.volume, Duration::from_millis(1500));
        assert_eq!(config.overlays.media, Duration::from_millis(3000));

        assert_eq!(config.pages.len(), 2);
        let term = &config.pages[0].components[0];
        assert_eq!(term.kind, ComponentKind::Button);
        assert_eq!(term.position, Some(Cell::new(0, 0)));
        assert_eq!(term.command.as_deref(), Some("alacritty"));
        assert_eq!(config.pages[0].components[1].position, None);

        assert_eq!(config.knobs[0].step, 5);
        assert_eq!(config.buttons[0].action, ControlAction::Page(1));
        assert_eq!(config.page_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_led_colors_filter_by_page() {
        let config = parse_config(FULL).unwrap();
        assert_eq!(
            config.led_colors(1),
            vec![
                ("1".to_string(), Rgb888::new(0, 255, 0)),
                ("2".to_string(), Rgb888::new(0, 0, 255)),
            ]
        );
        assert_eq!(config.led_colors(2), vec![("2".to_string(), Rgb888::new(0, 0, 255))]);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff8000"), Some(Rgb888::new(255, 128, 0)));
        assert_eq!(parse_color("ff8000"), None);
        assert_eq!(parse_color("#ff80"), None);
        assert_eq!(parse_color("#gg0000"), None);
        assert_eq!(String::from(HexColor(Rgb888::new(1, 2, 255))), "#0102ff");
    }

    #[test]
    fn test_control_action_strings() {
        assert_eq!("page:3".parse(), Ok(ControlAction::Page(3)));
        assert_eq!("workspace:2".parse(), Ok(ControlAction::Workspace(2)));
        assert_eq!(
            "next_track".parse(),
            Ok(ControlAction::Media(MediaCommand::Next))
        );
        assert!("page:x".parse::<ControlAction>().is_err());
        assert!("explode".parse::<ControlAction>().is_err());
        assert_eq!(String::from(ControlAction::Page(7)), "page:7");
    }

    #[test]
    fn test_rejects_page_zero() {
        let err = parse_config("[[pages]]\nnumber = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_duplicate_pages() {
        let err = parse_config("[[pages]]\nnumber = 2\n[[pages]]\nnumber = 2\n").unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_rejects_duplicate_component_names() {
        let text = r#"
[[pages]]
number = 1
[[pages.components]]
name = "a"
type = "label"
position = { col = 0, row = 0 }
options = { text = "x" }
[[pages.components]]
name = "a"
type = "label"
position = { col = 1, row = 0 }
options = { text = "y" }
"#;
        let err = parse_config(text).unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn test_rejects_position_outside_grid() {
        let text = r#"
[[pages]]
number = 1
[[pages.components]]
name = "far"
type = "label"
position = { col = 4, row = 0 }
options = { text = "x" }
"#;
        let err = parse_config(text).unwrap_err();
        assert!(matches!(err, ConfigError::Component { ref name, .. } if name == "far"));
    }

    #[test]
    fn test_rejects_unknown_component_type() {
        let text = r#"
[[pages]]
number = 1
[[pages.components]]
name = "x"
type = "slider"
"#;
        assert!(matches!(parse_config(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_mismatched_options() {
        let text = r#"
[[pages]]
number = 1
[[pages.components]]
name = "lbl"
type = "label"
position = { col = 0, row = 0 }
options = { text = 42 }
"#;
        assert!(matches!(
            parse_config(text),
            Err(ConfigError::Component { .. })
        ));
    }

    #[test]
    fn test_led_color_belongs_to_bindings_not_touch_buttons() {
        let text = r##"
[[pages]]
number = 1
[[pages.components]]
name = "b"
type = "button"
position = { col = 0, row = 0 }
options = { label = "x", led = "#ff0000" }
"##;
        assert!(matches!(
            assert_err!(parse_config(text)),
            ConfigError::Component { .. }
        ));

        let text = "[[buttons]]\nid = \"4\"\naction = \"mute\"\nled = \"#ff0000\"\n";
        let config = assert_ok!(parse_config(text));
        assert_eq!(config.led_colors(1), vec![("4".to_string(), Rgb888::RED)]);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = parse_config("[render]\ninterval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("render.interval_ms"));
    }

    #[test]
    fn test_rejects_zero_draw_timeout() {
        let err = assert_err!(parse_config("[session]\ndraw_timeout_ms = 0\n"));
        assert!(err.to_string().contains("session.draw_timeout_ms"));
    }

    #[test]
    fn test_rejects_oversized_grid_without_overflow() {
        let text = "[device]\nkey_size = 4294967295\ncolumns = 4\nrows = 2\nwidth = 480\nheight = 180\n";
        let err = assert_err!(parse_config(text));
        assert!(matches!(err, ConfigError::Validation(_)));

        // Fits in u32 but not in pixel coordinates
        let text = "[device]\nkey_size = 1073741824\ncolumns = 3\nrows = 1\nwidth = 4294967295\nheight = 180\n";
        assert_err!(parse_config(text));

        let mut config = assert_ok!(parse_config(FULL));
        config.device.key_size = u32::MAX / 2;
        assert_err!(config.validate());
    }

    #[test]
    fn test_rejects_launch_binding_without_command() {
        let err = parse_config("[[buttons]]\nid = \"3\"\naction = \"launch\"\n").unwrap_err();
        assert!(err.to_string().contains("needs a command"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DECK_RENDER_INTERVAL_MS", "500"),
            ("DECK_LED_RETRIES", "7"),
            ("DECK_READY_ATTEMPTS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = DeckConfig::default();
        apply_env_with(&mut config, |key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.render_interval, Duration::from_millis(500));
        assert_eq!(config.session.led_retries, 7);
        assert_eq!(config.session.ready_attempts, 30);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_take_priority() {
        let mut config = parse_config("[render]\ninterval_ms = 250\n").unwrap();
        ConfigOverrides::new()
            .with_render_interval_ms(100)
            .with_lock_path(PathBuf::from("/tmp/deck-test.lock"))
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.render_interval, Duration::from_millis(100));
        assert_eq!(config.lock.path, PathBuf::from("/tmp/deck-test.lock"));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_cli_override_is_validated() {
        let mut config = DeckConfig::default();
        let result = ConfigOverrides::new()
            .with_render_interval_ms(0)
            .apply(&mut config);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(config.pages.len(), 2);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let path = PathBuf::from("/nonexistent/path/deck.toml");
        let config = load_config_from_path(Some(path)).await.unwrap();
        assert!(config.pages.is_empty());
        assert!(config.config_file_path.is_none());
    }

    #[tokio::test]
    async fn test_malformed_toml_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[render\ninterval_ms = \"soon\"\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf())).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
