//! Configuration for the audio driver and the demo tone engine
//!
//! Driver settings are immutable once a driver is constructed. The JSON
//! loader mirrors the rest of the crate's tooling: a missing or malformed
//! file is logged and replaced by defaults so the driver can always start.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::AudioError;

/// Default sample rate in Hz, low enough for older handsets to keep up
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;
/// Default block size in frames handed to the engine per iteration
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;
/// Default headroom multiplier applied to the platform minimum buffer size
pub const DEFAULT_BUFFER_MULTIPLIER: usize = 2;
/// Reference interval between controller polls of the Ended state
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Sample encoding exchanged with the hardware ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit PCM, one `i16` per sample
    Pcm16,
}

impl SampleFormat {
    /// Width of a single sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Pcm16 => 2,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub tone: ToneConfig,
}

/// Audio driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture channel count; 0 runs the driver output-only
    pub input_channels: u16,
    /// Render channel count
    pub output_channels: u16,
    /// Frames per block
    pub block_frames: usize,
    /// Sample encoding for both ports
    pub sample_format: SampleFormat,
    /// Port capacity as a multiple of the negotiated minimum buffer size
    pub buffer_multiplier: usize,
    /// Attempt to move the loop thread to the urgent-audio priority class
    pub realtime_priority: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_channels: 1,
            output_channels: 1,
            block_frames: DEFAULT_BLOCK_FRAMES,
            sample_format: SampleFormat::Pcm16,
            buffer_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            realtime_priority: true,
        }
    }
}

impl DriverConfig {
    /// Output-only variant of the default configuration
    pub fn output_only() -> Self {
        Self {
            input_channels: 0,
            ..Self::default()
        }
    }

    /// Whether a capture port should be negotiated at loop entry
    pub fn wants_capture(&self) -> bool {
        self.input_channels > 0
    }

    /// Number of interleaved samples in one block
    pub fn block_samples(&self) -> usize {
        self.block_frames * self.output_channels as usize
    }

    /// Size of one block in bytes (frames x output channels x sample width)
    pub fn block_bytes(&self) -> usize {
        self.block_samples() * self.sample_format.bytes_per_sample()
    }

    /// Wall-clock duration of one block at the configured sample rate
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Reject configurations the driver cannot run with
    pub fn validate(&self) -> Result<(), AudioError> {
        let reason = if self.sample_rate == 0 {
            Some("sample_rate must be greater than 0".to_string())
        } else if self.output_channels == 0 || self.output_channels > 2 {
            Some(format!(
                "output_channels must be 1 or 2 (got {})",
                self.output_channels
            ))
        } else if self.input_channels > 2 {
            Some(format!(
                "input_channels must be 0, 1 or 2 (got {})",
                self.input_channels
            ))
        } else if self.block_frames == 0 {
            Some("block_frames must be greater than 0".to_string())
        } else if self.buffer_multiplier == 0 {
            Some("buffer_multiplier must be greater than 0".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(AudioError::InvalidConfig { reason }),
            None => Ok(()),
        }
    }
}

/// Controller-side shutdown handshake settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Interval between polls of the Ended state
    pub poll_interval_ms: u64,
    /// Upper bound on the wait; `None` waits for as long as the loop takes
    pub timeout_ms: Option<u64>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: None,
        }
    }
}

/// Settings for the bundled sine tone engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Maximum simultaneously sounding voices; the oldest is dropped beyond this
    pub max_voices: usize,
    /// Capacity of the controller-to-loop voice queue
    pub event_queue_capacity: usize,
    /// Envelope attack time in seconds
    pub attack_secs: f32,
    /// Envelope sustain time in seconds
    pub sustain_secs: f32,
    /// Envelope release time in seconds
    pub release_secs: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            max_voices: 16,
            event_queue_capacity: 64,
            attack_secs: 0.2,
            sustain_secs: 4.0,
            release_secs: 0.5,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset path
    pub fn load() -> Self {
        Self::load_from_file("assets/driver_config.json")
    }
}
