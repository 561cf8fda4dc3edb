//! Hardware port abstraction
//!
//! An [`AudioPlatform`] answers minimum-buffer queries and opens ports. Ports
//! are opened on the audio loop thread and never leave it, so the port traits
//! carry no `Send` bound (cpal streams are not `Send` on every host). The
//! platform itself moves into the loop thread and must be `Send`.
//!
//! Releasing a port consumes it; a released port cannot be written again.

use crate::config::{DriverConfig, SampleFormat};
use crate::error::AudioError;

/// Stream parameters shared by the buffer query and the open call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub block_frames: usize,
}

impl StreamSpec {
    /// Render-side parameters for a driver configuration
    pub fn render(config: &DriverConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.output_channels,
            format: config.sample_format,
            block_frames: config.block_frames,
        }
    }

    /// Capture-side parameters for a driver configuration
    pub fn capture(config: &DriverConfig) -> Self {
        Self {
            channels: config.input_channels,
            ..Self::render(config)
        }
    }

    /// Bytes occupied by one frame
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

/// Back-to-back zero-progress writes a blocking render port tolerates
pub const MAX_STALLED_WRITES: u32 = 3;

/// Counts consecutive device writes that moved no samples.
///
/// A blocking write that times out with nothing written is retried; once
/// `limit` attempts in a row make no progress the device is treated as lost.
#[derive(Debug, Clone, Copy)]
pub struct StallCounter {
    stalled: u32,
    limit: u32,
}

impl StallCounter {
    pub fn new(limit: u32) -> Self {
        Self { stalled: 0, limit }
    }

    /// Record how many samples one write attempt moved
    pub fn record(&mut self, progressed: usize) -> Result<(), AudioError> {
        if progressed > 0 {
            self.stalled = 0;
            return Ok(());
        }
        self.stalled += 1;
        if self.stalled >= self.limit {
            return Err(AudioError::StreamFailure {
                reason: format!(
                    "render device stalled: {} writes in a row made no progress",
                    self.stalled
                ),
            });
        }
        Ok(())
    }
}

/// Readiness reported by a freshly opened capture port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Uninitialized,
    Ready,
}

/// Output side: accepts blocks and plays them
pub trait RenderPort {
    /// Begin accepting writes. Must precede the first write.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Write the whole block, blocking until the device has room.
    ///
    /// Returns the number of samples written.
    fn write(&mut self, block: &[i16]) -> Result<usize, AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn release(self: Box<Self>);
}

/// Input side: yields blocks of captured samples
pub trait CapturePort {
    fn state(&self) -> PortState;

    /// Begin recording. Must precede the first read.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Read up to `block.len()` samples, blocking until the block is full or
    /// the device's short-read timeout elapses.
    ///
    /// Returns the number of samples read; samples past that count are stale.
    fn read(&mut self, block: &mut [i16]) -> Result<usize, AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn release(self: Box<Self>);
}

/// Platform capability queried and opened at loop entry
pub trait AudioPlatform: Send {
    /// Minimum render buffer size in bytes for `spec`
    fn min_render_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError>;

    /// Minimum capture buffer size in bytes for `spec`
    fn min_capture_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError>;

    fn open_render(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn RenderPort>, AudioError>;

    fn open_capture(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn CapturePort>, AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_spec_uses_input_channels() {
        let config = DriverConfig {
            input_channels: 2,
            output_channels: 1,
            ..DriverConfig::default()
        };
        let render = StreamSpec::render(&config);
        let capture = StreamSpec::capture(&config);
        assert_eq!(render.channels, 1);
        assert_eq!(capture.channels, 2);
        assert_eq!(capture.sample_rate, render.sample_rate);
        assert_eq!(capture.bytes_per_frame(), 4);
    }

    #[test]
    fn test_stall_counter_fails_after_limit() {
        let mut stall = StallCounter::new(MAX_STALLED_WRITES);
        for _ in 1..MAX_STALLED_WRITES {
            assert!(stall.record(0).is_ok());
        }
        assert!(matches!(
            stall.record(0),
            Err(AudioError::StreamFailure { .. })
        ));
    }

    #[test]
    fn test_stall_counter_resets_on_progress() {
        let mut stall = StallCounter::new(2);
        assert!(stall.record(0).is_ok());
        assert!(stall.record(64).is_ok());
        assert!(stall.record(0).is_ok());
        assert!(stall.record(0).is_err());
    }
}
