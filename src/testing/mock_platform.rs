//! Scripted [`AudioPlatform`] with a shared call log.
//!
//! Ports never touch hardware. Capture fills blocks with a constant, render
//! records what it is given and sleeps briefly per write to stand in for
//! device backpressure. Every call is counted in a [`PortLog`] that the test
//! keeps a handle to after the platform has moved into the loop thread.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::audio::port::{AudioPlatform, CapturePort, PortState, RenderPort, StreamSpec};
use crate::error::AudioError;

/// Render blocks kept verbatim in the log; later writes are only counted
pub const RECORDED_BLOCK_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct MockPlatformOptions {
    pub render_min_bytes: usize,
    pub capture_min_bytes: usize,
    /// Sleep inside the render buffer query, delaying loop entry
    pub query_delay: Duration,
    pub fail_render_query: bool,
    pub fail_capture_query: bool,
    pub fail_render_open: bool,
    pub fail_capture_open: bool,
    pub fail_render_start: bool,
    pub capture_state: PortState,
    /// Value every captured sample is set to
    pub capture_value: i16,
    /// Every n-th read returns half a block
    pub short_read_every: Option<usize>,
    /// Sleep per render write
    pub write_delay: Duration,
    /// Render writes after this many successful ones fail
    pub fail_write_after: Option<usize>,
}

impl Default for MockPlatformOptions {
    fn default() -> Self {
        Self {
            render_min_bytes: 4096,
            capture_min_bytes: 4096,
            query_delay: Duration::ZERO,
            fail_render_query: false,
            fail_capture_query: false,
            fail_render_open: false,
            fail_capture_open: false,
            fail_render_start: false,
            capture_state: PortState::Ready,
            capture_value: 100,
            short_read_every: None,
            write_delay: Duration::from_millis(1),
            fail_write_after: None,
        }
    }
}

/// Snapshot of everything the platform and its ports were asked to do
#[derive(Debug, Clone, Default)]
pub struct PortLog {
    pub render_queries: usize,
    pub capture_queries: usize,
    pub render_opens: usize,
    pub capture_opens: usize,
    pub render_capacity_bytes: Option<usize>,
    pub capture_capacity_bytes: Option<usize>,
    pub render_starts: usize,
    pub capture_starts: usize,
    pub render_stops: usize,
    pub capture_stops: usize,
    pub render_releases: usize,
    pub capture_releases: usize,
    pub writes: usize,
    pub writes_before_start: usize,
    pub reads: usize,
    pub short_reads: usize,
    pub written_blocks: Vec<Vec<i16>>,
}

impl PortLog {
    /// Every opened port was released
    pub fn all_released(&self) -> bool {
        self.render_releases == self.render_opens && self.capture_releases == self.capture_opens
    }
}

/// Cloneable handle onto the log of a [`MockPlatform`]
#[derive(Debug, Clone, Default)]
pub struct PortLogHandle(Arc<Mutex<PortLog>>);

impl PortLogHandle {
    pub fn snapshot(&self) -> PortLog {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PortLog> {
        // A panicking test thread must not hide the log from the assertions
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record<F: FnOnce(&mut PortLog)>(&self, update: F) {
        update(&mut self.lock());
    }
}

pub struct MockPlatform {
    options: MockPlatformOptions,
    log: PortLogHandle,
}

impl MockPlatform {
    pub fn new(options: MockPlatformOptions) -> Self {
        Self {
            options,
            log: PortLogHandle::default(),
        }
    }

    pub fn log(&self) -> PortLog {
        self.log.snapshot()
    }

    pub fn log_handle(&self) -> PortLogHandle {
        self.log.clone()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new(MockPlatformOptions::default())
    }
}

impl AudioPlatform for MockPlatform {
    fn min_render_buffer_bytes(&self, _spec: &StreamSpec) -> Result<usize, AudioError> {
        self.log.record(|log| log.render_queries += 1);
        if !self.options.query_delay.is_zero() {
            thread::sleep(self.options.query_delay);
        }
        if self.options.fail_render_query {
            return Err(AudioError::BufferQueryFailed {
                reason: "mock render query failure".to_string(),
            });
        }
        Ok(self.options.render_min_bytes)
    }

    fn min_capture_buffer_bytes(&self, _spec: &StreamSpec) -> Result<usize, AudioError> {
        self.log.record(|log| log.capture_queries += 1);
        if self.options.fail_capture_query {
            return Err(AudioError::BufferQueryFailed {
                reason: "mock capture query failure".to_string(),
            });
        }
        Ok(self.options.capture_min_bytes)
    }

    fn open_render(
        &mut self,
        _spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn RenderPort>, AudioError> {
        if self.options.fail_render_open {
            return Err(AudioError::StreamOpenFailed {
                reason: "mock render open failure".to_string(),
            });
        }
        self.log.record(|log| {
            log.render_opens += 1;
            log.render_capacity_bytes = Some(capacity_bytes);
        });
        Ok(Box::new(MockRenderPort {
            log: self.log.clone(),
            write_delay: self.options.write_delay,
            fail_start: self.options.fail_render_start,
            fail_write_after: self.options.fail_write_after,
            started: false,
            successful_writes: 0,
        }))
    }

    fn open_capture(
        &mut self,
        _spec: &StreamSpec,
        capacity_bytes: usize,
    ) -> Result<Box<dyn CapturePort>, AudioError> {
        if self.options.fail_capture_open {
            return Err(AudioError::StreamOpenFailed {
                reason: "mock capture open failure".to_string(),
            });
        }
        self.log.record(|log| {
            log.capture_opens += 1;
            log.capture_capacity_bytes = Some(capacity_bytes);
        });
        Ok(Box::new(MockCapturePort {
            log: self.log.clone(),
            state: self.options.capture_state,
            value: self.options.capture_value,
            short_read_every: self.options.short_read_every,
            started: false,
            reads: 0,
        }))
    }
}

struct MockRenderPort {
    log: PortLogHandle,
    write_delay: Duration,
    fail_start: bool,
    fail_write_after: Option<usize>,
    started: bool,
    successful_writes: usize,
}

impl RenderPort for MockRenderPort {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::HardwareError {
                details: "mock render start failure".to_string(),
            });
        }
        self.started = true;
        self.log.record(|log| log.render_starts += 1);
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<usize, AudioError> {
        if !self.started {
            self.log.record(|log| log.writes_before_start += 1);
            return Err(AudioError::NotStarted);
        }
        if let Some(limit) = self.fail_write_after {
            if self.successful_writes >= limit {
                return Err(AudioError::StreamFailure {
                    reason: "mock render write failure".to_string(),
                });
            }
        }
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        self.successful_writes += 1;
        self.log.record(|log| {
            log.writes += 1;
            if log.written_blocks.len() < RECORDED_BLOCK_LIMIT {
                log.written_blocks.push(block.to_vec());
            }
        });
        Ok(block.len())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.started = false;
        self.log.record(|log| log.render_stops += 1);
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.log.record(|log| log.render_releases += 1);
    }
}

struct MockCapturePort {
    log: PortLogHandle,
    state: PortState,
    value: i16,
    short_read_every: Option<usize>,
    started: bool,
    reads: usize,
}

impl CapturePort for MockCapturePort {
    fn state(&self) -> PortState {
        self.state
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.started = true;
        self.log.record(|log| log.capture_starts += 1);
        Ok(())
    }

    fn read(&mut self, block: &mut [i16]) -> Result<usize, AudioError> {
        if !self.started {
            return Err(AudioError::NotStarted);
        }
        self.reads += 1;
        let short = matches!(self.short_read_every, Some(n) if n > 0 && self.reads % n == 0);
        let count = if short { block.len() / 2 } else { block.len() };
        block[..count].fill(self.value);
        self.log.record(|log| {
            log.reads += 1;
            if short {
                log.short_reads += 1;
            }
        });
        Ok(count)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.started = false;
        self.log.record(|log| log.capture_stops += 1);
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.log.record(|log| log.capture_releases += 1);
    }
}
