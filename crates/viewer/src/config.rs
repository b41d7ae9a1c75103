//! Viewer configuration management

use crate::control::ControlConfig;
use anyhow::{Context, Result, bail};
use sensor::{CaptureSettings, StreamConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub daemon: DaemonSection,
}

/// Manual capture settings applied on every control tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSection {
    /// IR exposure time in microseconds
    #[serde(default = "CaptureSection::default_exposure_us")]
    pub exposure_us: i32,
    /// IR analog gain
    #[serde(default = "CaptureSection::default_gain")]
    pub gain: i32,
    /// Keep the IR projector laser off
    #[serde(default = "CaptureSection::default_true")]
    pub disable_laser: bool,
    /// Keep laser drive-over-current protection off
    #[serde(default = "CaptureSection::default_true")]
    pub disable_ldp: bool,
    /// Bounded frame wait timeout in milliseconds
    #[serde(default = "CaptureSection::default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    /// Frames discarded after each (re)attach while exposure settles
    #[serde(default = "CaptureSection::default_warmup_frames")]
    pub warmup_frames: u32,
    /// Directory for the one-shot frame-metadata snapshot written after
    /// warm-up; unset disables the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
}

impl CaptureSection {
    fn default_exposure_us() -> i32 {
        3000
    }

    fn default_gain() -> i32 {
        16
    }

    fn default_true() -> bool {
        true
    }

    fn default_frame_timeout_ms() -> u64 {
        100
    }

    fn default_warmup_frames() -> u32 {
        5
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            exposure_us: Self::default_exposure_us(),
            gain: Self::default_gain(),
            disable_laser: true,
            disable_ldp: true,
            frame_timeout_ms: Self::default_frame_timeout_ms(),
            warmup_frames: Self::default_warmup_frames(),
            snapshot_dir: None,
        }
    }
}

/// Stream selection; defaults to both IR sensors at 1280x800@30
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    #[serde(default = "StreamSection::default_true")]
    pub ir_left: bool,
    #[serde(default = "StreamSection::default_true")]
    pub ir_right: bool,
    #[serde(default)]
    pub depth: bool,
    #[serde(default = "StreamSection::default_width")]
    pub width: u32,
    #[serde(default = "StreamSection::default_height")]
    pub height: u32,
    #[serde(default = "StreamSection::default_fps")]
    pub fps: u32,
}

impl StreamSection {
    fn default_true() -> bool {
        true
    }

    fn default_width() -> u32 {
        1280
    }

    fn default_height() -> u32 {
        800
    }

    fn default_fps() -> u32 {
        30
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            ir_left: true,
            ir_right: true,
            depth: false,
            width: Self::default_width(),
            height: Self::default_height(),
            fps: Self::default_fps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "DaemonSection::default_log_level")]
    pub log_level: String,
    /// Sleep between control ticks while no device is attached
    #[serde(default = "DaemonSection::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Log a stats line every N frames
    #[serde(default = "DaemonSection::default_stats_interval_frames")]
    pub stats_interval_frames: u64,
}

impl DaemonSection {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_poll_interval_ms() -> u64 {
        50
    }

    fn default_stats_interval_frames() -> u64 {
        300
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            stats_interval_frames: Self::default_stats_interval_frames(),
        }
    }
}

impl ViewerConfig {
    /// Load a config file, expanding `~` in user-supplied paths
    pub fn load(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        let contents = fs::read_to_string(&expanded)
            .with_context(|| format!("failed to read config file: {}", expanded))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", expanded))?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location, or fall
    /// back to built-in defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Default config location: `~/.config/ir-depth-viewer/config.toml`
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("ir-depth-viewer").join("config.toml")
        } else {
            PathBuf::from("/etc/ir-depth-viewer/config.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.exposure_us <= 0 {
            bail!("capture.exposure_us must be positive");
        }
        if self.capture.gain < 0 {
            bail!("capture.gain must not be negative");
        }
        if self.capture.frame_timeout_ms == 0 {
            bail!("capture.frame_timeout_ms must be positive");
        }
        if !self.stream.ir_left && !self.stream.ir_right && !self.stream.depth {
            bail!("at least one stream must be enabled");
        }
        if self.stream.width == 0 || self.stream.height == 0 || self.stream.fps == 0 {
            bail!("stream.width, stream.height and stream.fps must be positive");
        }
        if self.daemon.poll_interval_ms == 0 {
            bail!("daemon.poll_interval_ms must be positive");
        }
        if self.daemon.stats_interval_frames == 0 {
            bail!("daemon.stats_interval_frames must be positive");
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            ir_left: self.stream.ir_left,
            ir_right: self.stream.ir_right,
            depth: self.stream.depth,
            width: self.stream.width,
            height: self.stream.height,
            fps: self.stream.fps,
        }
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            settings: CaptureSettings {
                exposure_us: self.capture.exposure_us,
                gain: self.capture.gain,
            },
            disable_laser: self.capture.disable_laser,
            disable_ldp: self.capture.disable_ldp,
            frame_timeout: Duration::from_millis(self.capture.frame_timeout_ms),
            poll_interval: Duration::from_millis(self.daemon.poll_interval_ms),
            warmup_frames: self.capture.warmup_frames,
            stats_interval_frames: self.daemon.stats_interval_frames,
            snapshot_dir: self
                .capture
                .snapshot_dir
                .as_ref()
                .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).to_string())),
        }
    }
}
