// Desktop platform over cpal
//
// cpal is callback driven while the driver loop is blocking, so each port
// sits on an rtrb ring sized to the negotiated capacity. The render callback
// drains the ring (silence on underrun) and `write` blocks while it is full;
// the capture callback fills its ring and `read` waits for a block's worth of
// samples, giving up after two block durations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};
use rtrb::{Consumer, Producer, RingBuffer};

use super::port::{AudioPlatform, CapturePort, PortState, RenderPort, StreamSpec};
use crate::error::AudioError;

const WRITE_BACKOFF: Duration = Duration::from_millis(1);
const READ_BACKOFF: Duration = Duration::from_micros(500);

/// Default host devices through cpal
#[derive(Debug, Default)]
pub struct CpalPlatform {
    _private: (),
}

impl CpalPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn output_device(&self) -> Result<cpal::Device, AudioError> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default output device found".to_string(),
            })
    }

    fn input_device(&self) -> Result<cpal::Device, AudioError> {
        cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            })
    }
}

fn min_buffer_bytes(supported: &cpal::SupportedBufferSize, spec: &StreamSpec) -> usize {
    let frames = match supported {
        cpal::SupportedBufferSize::Range { min, .. } => *min as usize,
        cpal::SupportedBufferSize::Unknown => spec.block_frames,
    };
    frames.max(1) * spec.bytes_per_frame()
}

fn stream_config(spec: &StreamSpec) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: spec.channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Ring capacity in samples; always holds at least one block
/// Copy `samples` into the ring in one reserved chunk
fn push_samples(producer: &mut Producer<i16>, samples: &[i16]) -> Result<usize, AudioError> {
    let chunk = producer
        .write_chunk_uninit(samples.len())
        .map_err(|e| AudioError::StreamFailure {
            reason: format!("render ring: {}", e),
        })?;
    Ok(chunk.fill_from_iter(samples.iter().copied()))
}

fn ring_samples(spec: &StreamSpec, capacity_bytes: usize) -> usize {
    let block = spec.block_frames * spec.channels as usize;
    (capacity_bytes / spec.format.bytes_per_sample()).max(block)
}

impl AudioPlatform for CpalPlatform {
    fn min_render_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError> {
        let supported = self
            .output_device()?
            .default_output_config()
            .map_err(|e| AudioError::BufferQueryFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;
        Ok(min_buffer_bytes(supported.buffer_size(), spec))
    }

    fn min_capture_buffer_bytes(&self, spec: &StreamSpec) -> Result<usize, AudioError> {
        let supported = self
            .input_device()?
            .default_input_config()
            .map_err(|e| AudioError::BufferQueryFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;
        Ok(min_buffer_bytes(supported.buffer_size(), spec))
    }

    fn open_render(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn RenderPort>, AudioError> {
        let device = self.output_device()?;
        let (producer, mut consumer) = RingBuffer::<i16>::new(ring_samples(spec, capacity_bytes));
        let failed = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::clone(&failed);

        let stream = device
            .build_output_stream(
                &stream_config(spec),
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = consumer.pop().unwrap_or(0);
                    }
                },
                move |err| {
                    error!("[CpalPlatform] Render stream error: {}", err);
                    error_flag.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Render stream: {:?}", e),
            })?;

        info!(
            "[CpalPlatform] Render port opened: {} Hz, {} ch, {} bytes",
            spec.sample_rate, spec.channels, capacity_bytes
        );

        Ok(Box::new(CpalRenderPort {
            stream,
            producer,
            failed,
            started: false,
        }))
    }

    fn open_capture(
        &mut self,
        spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn CapturePort>, AudioError> {
        let device = self.input_device()?;
        let (mut producer, consumer) = RingBuffer::<i16>::new(ring_samples(spec, capacity_bytes));
        let failed = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::clone(&failed);
        let overruns = Arc::new(AtomicU64::new(0));
        let overrun_counter = Arc::clone(&overruns);

        let stream = device
            .build_input_stream(
                &stream_config(spec),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut dropped = 0_u64;
                    for &sample in data {
                        if producer.push(sample).is_err() {
                            dropped += 1;
                        }
                    }
                    if dropped > 0 {
                        overrun_counter.fetch_add(dropped, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("[CpalPlatform] Capture stream error: {}", err);
                    error_flag.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Capture stream: {:?}", e),
            })?;

        let block_secs = spec.block_frames as f64 / spec.sample_rate.max(1) as f64;

        info!(
            "[CpalPlatform] Capture port opened: {} Hz, {} ch, {} bytes",
            spec.sample_rate, spec.channels, capacity_bytes
        );

        Ok(Box::new(CpalCapturePort {
            stream,
            consumer,
            failed,
            overruns,
            read_timeout: Duration::from_secs_f64(block_secs * 2.0),
            started: false,
        }))
    }
}

struct CpalRenderPort {
    stream: cpal::Stream,
    producer: Producer<i16>,
    failed: Arc<AtomicBool>,
    started: bool,
}

impl RenderPort for CpalRenderPort {
    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start render stream: {:?}", e),
        })?;
        self.started = true;
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<usize, AudioError> {
        if !self.started {
            return Err(AudioError::NotStarted);
        }

        let mut written = 0;
        while written < block.len() {
            if self.failed.load(Ordering::Acquire) || self.producer.is_abandoned() {
                return Err(AudioError::StreamFailure {
                    reason: "render stream stopped consuming".to_string(),
                });
            }

            let free = self.producer.slots();
            if free == 0 {
                thread::sleep(WRITE_BACKOFF);
                continue;
            }

            let end = (written + free).min(block.len());
            written += push_samples(&mut self.producer, &block[written..end])?;
        }
        Ok(written)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.started = false;
        self.stream.pause().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to stop render stream: {:?}", e),
        })
    }

    fn release(self: Box<Self>) {
        // Dropping the stream closes the device
    }
}

struct CpalCapturePort {
    stream: cpal::Stream,
    consumer: Consumer<i16>,
    failed: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    read_timeout: Duration,
    started: bool,
}

impl CapturePort for CpalCapturePort {
    fn state(&self) -> PortState {
        if self.failed.load(Ordering::Acquire) {
            PortState::Uninitialized
        } else {
            PortState::Ready
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start capture stream: {:?}", e),
        })?;
        self.started = true;
        Ok(())
    }

    fn read(&mut self, block: &mut [i16]) -> Result<usize, AudioError> {
        if !self.started {
            return Err(AudioError::NotStarted);
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;
        while filled < block.len() {
            match self.consumer.pop() {
                Ok(sample) => {
                    block[filled] = sample;
                    filled += 1;
                }
                Err(_) => {
                    if self.failed.load(Ordering::Acquire) {
                        return Err(AudioError::StreamFailure {
                            reason: "capture stream reported an error".to_string(),
                        });
                    }
                    if Instant::now() >= deadline {
                        break;
                    }
                    thread::sleep(READ_BACKOFF);
                }
            }
        }
        Ok(filled)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.started = false;
        self.stream.pause().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to stop capture stream: {:?}", e),
        })
    }

    fn release(self: Box<Self>) {
        let overruns = self.overruns.load(Ordering::Relaxed);
        if overruns > 0 {
            warn!(
                "[CpalPlatform] Capture dropped {} samples on a full ring",
                overruns
            );
        }
    }
}
