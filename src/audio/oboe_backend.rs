// Android platform over oboe-rs (AAudio / OpenSL ES)
//
// Blocking streams map one-to-one onto the port traits: no ring or callback
// sits between the loop and the device. Mono only, which is what the loop
// is configured with on Android.

use log::info;
use oboe::{
    AudioInputStreamSync, AudioOutputStreamSync, AudioStream, AudioStreamBase,
    AudioStreamBuilder, AudioStreamSafe, AudioStreamSync, Input, Mono, Output, PerformanceMode,
    SharingMode, StreamState,
};

use super::port::{
    AudioPlatform, CapturePort, PortState, RenderPort, StallCounter, StreamSpec, MAX_STALLED_WRITES,
};
use crate::error::AudioError;

/// Per-call timeout for blocking reads and writes
const IO_TIMEOUT_NANOS: i64 = 1_000_000_000;

#[derive(Debug, Default)]
pub struct OboePlatform {
    _private: (),
}

impl OboePlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

fn require_mono(spec: &StreamSpec) -> Result<(), AudioError> {
    if spec.channels == 1 {
        Ok(())
    } else {
        Err(AudioError::StreamOpenFailed {
            reason: format!(
                "Oboe backend supports mono streams only (got {} channels)",
                spec.channels
            ),
        })
    }
}

fn capacity_frames(spec: &StreamSpec, capacity_bytes: usize) -> i32 {
    (capacity_bytes / spec.bytes_per_frame().max(1)) as i32
}

fn open_output(
    spec: &StreamSpec,
    capacity_bytes: Option<usize>,
) -> Result<AudioStreamSync<Output, (i16, Mono)>, AudioError> {
    require_mono(spec)?;
    let builder = AudioStreamBuilder::default()
        .set_performance_mode(PerformanceMode::LowLatency)
        .set_sharing_mode(SharingMode::Exclusive)
        .set_direction::<Output>()
        .set_sample_rate(spec.sample_rate as i32)
        .set_channel_count::<Mono>()
        .set_format::<i16>();
    let builder = match capacity_bytes {
        Some(bytes) => builder.set_buffer_capacity_in_frames(capacity_frames(spec, bytes)),
        None => builder,
    };
    builder
        .open_stream()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to open output stream: {:?}", e),
        })
}

fn open_input(
    spec: &StreamSpec,
    capacity_bytes: Option<usize>,
) -> Result<AudioStreamSync<Input, (i16, Mono)>, AudioError> {
    require_mono(spec)?;
    let builder = AudioStreamBuilder::default()
        .set_performance_mode(PerformanceMode::LowLatency)
        .set_sharing_mode(SharingMode::Exclusive)
        .set_direction::<Input>()
        .set_sample_rate(spec.sample_rate as i32)
        .set_channel_count::<Mono>()
        .set_format::<i16>();
    let builder = match capacity_bytes {
        Some(bytes) => builder.set_buffer_capacity_in_frames(capacity_frames(spec, bytes)),
        None => builder,
    };
    builder
        .open_stream()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to open input stream: {:?}", e),
        })
}

impl AudioPlatform for OboePlatform {
    fn min_render_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError> {
        let scratch = open_output(spec, None).map_err(|e| AudioError::BufferQueryFailed {
            reason: e.to_string(),
        })?;
        let burst = scratch.get_frames_per_burst().max(1) as usize;
        Ok(burst * spec.bytes_per_frame())
    }

    fn min_capture_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError> {
        let scratch = open_input(spec, None).map_err(|e| AudioError::BufferQueryFailed {
            reason: e.to_string(),
        })?;
        let burst = scratch.get_frames_per_burst().max(1) as usize;
        Ok(burst * spec.bytes_per_frame())
    }

    fn open_render(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn RenderPort>, AudioError> {
        let stream = open_output(spec, Some(capacity_bytes))?;
        info!(
            "[OboePlatform] Render port opened: {} Hz, {} bytes",
            spec.sample_rate, capacity_bytes
        );
        Ok(Box::new(OboeRenderPort { stream }))
    }

    fn open_capture(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn CapturePort>, AudioError> {
        let stream = open_input(spec, Some(capacity_bytes))?;
        info!(
            "[OboePlatform] Capture port opened: {} Hz, {} bytes",
            spec.sample_rate, capacity_bytes
        );
        Ok(Box::new(OboeCapturePort { stream }))
    }
}

struct OboeRenderPort {
    stream: AudioStreamSync<Output, (i16, Mono)>,
}

impl RenderPort for OboeRenderPort {
    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start output stream: {:?}", e),
        })
    }

    fn write(&mut self, block: &[i16]) -> Result<usize, AudioError> {
        let mut offset = 0;
        let mut stall = StallCounter::new(MAX_STALLED_WRITES);
        while offset < block.len() {
            let written = self
                .stream
                .write(&block[offset..], IO_TIMEOUT_NANOS)
                .map_err(|e| AudioError::StreamFailure {
                    reason: format!("Output write failed: {:?}", e),
                })?
                .max(0) as usize;
            stall.record(written)?;
            offset += written;
        }
        Ok(offset)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream.stop().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to stop output stream: {:?}", e),
        })
    }

    fn release(self: Box<Self>) {
        // Dropping the stream closes it
    }
}

struct OboeCapturePort {
    stream: AudioStreamSync<Input, (i16, Mono)>,
}

impl CapturePort for OboeCapturePort {
    fn state(&self) -> PortState {
        match self.stream.get_state() {
            StreamState::Uninitialized
            | StreamState::Unknown
            | StreamState::Disconnected
            | StreamState::Closing
            | StreamState::Closed => PortState::Uninitialized,
            _ => PortState::Ready,
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start input stream: {:?}", e),
        })
    }

    fn read(&mut self, block: &mut [i16]) -> Result<usize, AudioError> {
        let read = self
            .stream
            .read(block, IO_TIMEOUT_NANOS)
            .map_err(|e| AudioError::StreamFailure {
                reason: format!("Input read failed: {:?}", e),
            })?;
        Ok(read.max(0) as usize)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream.stop().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to stop input stream: {:?}", e),
        })
    }

    fn release(self: Box<Self>) {}
}
