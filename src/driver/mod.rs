//! Audio driver: owns one engine host and the thread that feeds it
//!
//! The controller thread constructs an [`AudioDriver`], starts it, forwards
//! parameter changes while it runs, then asks it to stop and polls
//! [`AudioDriver::has_ended`] before destroying the engine.
//!
//! ```text
//! controller                         loop thread
//! ----------                         -----------
//! new()      -> engine created
//! start()    -> spawn ------------>  elevate priority, open ports
//!                                    Idle -> Running
//! set_parameter() -> engine          read / process / write ...
//! request_stop()  -> Draining        loop exits, ports released
//! poll has_ended() <--------------   Ended
//! destroy_engine()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use tokio::sync::broadcast;

use crate::audio::block::SampleBlock;
use crate::audio::port::AudioPlatform;
use crate::config::DriverConfig;
use crate::engine::{EngineFactory, EngineHandle, STATUS_RELEASED};
use crate::error::{log_audio_error, AudioError};

pub mod events;
pub(crate) mod run_loop;
pub mod shutdown;
pub mod state;


pub use events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
pub use shutdown::{poll_until_ended, ShutdownPolicy};
pub use state::{DriverOutcome, DriverStatus, LifecycleState};

use run_loop::LoopContext;

/// Name given to the loop thread
pub const LOOP_THREAD_NAME: &str = "ugen-audio-loop";

/// Resources handed to the loop thread on start
struct PendingLaunch {
    platform: Box<dyn AudioPlatform>,
    block: SampleBlock,
}

pub struct AudioDriver {
    config: DriverConfig,
    engine: Arc<dyn EngineHandle>,
    status: Arc<DriverStatus>,
    events: broadcast::Sender<DriverEvent>,
    pending: Mutex<Option<PendingLaunch>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    destroyed: AtomicBool,
}

impl AudioDriver {
    /// Validate the configuration, create the engine host and allocate the
    /// sample block. No hardware is touched until [`start`](Self::start).
    pub fn new<F>(
        config: DriverConfig,
        platform: Box<dyn AudioPlatform>,
        factory: &F,
    ) -> Result<Self, AudioError>
    where
        F: EngineFactory + ?Sized,
    {
        config.validate()?;
        let engine = factory.create_host(&config).map_err(|err| {
            log_audio_error(&err, "AudioDriver::new(create_host)");
            err
        })?;
        Self::with_engine(config, platform, engine)
    }

    /// Build a driver around an engine host that already exists
    pub fn with_engine(
        config: DriverConfig,
        platform: Box<dyn AudioPlatform>,
        engine: Arc<dyn EngineHandle>,
    ) -> Result<Self, AudioError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let block = SampleBlock::new(&config);

        info!(
            "[AudioDriver] Created: {} Hz, in={} out={}, {} frames/block",
            config.sample_rate, config.input_channels, config.output_channels, config.block_frames
        );

        Ok(Self {
            config,
            engine,
            status: Arc::new(DriverStatus::new()),
            events,
            pending: Mutex::new(Some(PendingLaunch { platform, block })),
            thread: Mutex::new(None),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Spawn the loop thread. The driver can be started once.
    pub fn start(&self) -> Result<(), AudioError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(AudioError::EngineReleased);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(AudioError::AlreadyStarted);
        }

        let launch = self
            .lock_pending()?
            .take()
            .ok_or(AudioError::AlreadyStarted)?;

        let ctx = LoopContext {
            config: self.config.clone(),
            engine: Arc::clone(&self.engine),
            status: Arc::clone(&self.status),
            events: self.events.clone(),
        };

        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || run_loop::run(ctx, launch.platform, launch.block));

        match spawned {
            Ok(handle) => {
                *self.lock_thread()? = Some(handle);
                info!("[AudioDriver] Loop thread spawned");
                Ok(())
            }
            Err(err) => {
                // Nothing will ever run; let the controller destroy the engine
                self.status.finish(DriverOutcome::FailedToStart);
                let err = AudioError::ThreadSpawnFailed {
                    reason: err.to_string(),
                };
                log_audio_error(&err, "AudioDriver::start");
                Err(err)
            }
        }
    }

    /// Ask the loop to stop after the current iteration.
    ///
    /// Returns `true` if this call moved the driver towards Ended. Repeated
    /// calls, calls after Ended and calls on a never-started driver do
    /// nothing.
    pub fn request_stop(&self) -> bool {
        if !self.started.load(Ordering::Acquire) {
            return false;
        }
        let changed = self.status.request_stop();
        if changed {
            info!("[AudioDriver] Stop requested");
        }
        changed
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn has_ended(&self) -> bool {
        self.status.has_ended()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.state()
    }

    pub fn outcome(&self) -> Option<DriverOutcome> {
        self.status.outcome()
    }

    /// Shared status handle, usable after the driver is moved elsewhere
    pub fn status(&self) -> Arc<DriverStatus> {
        Arc::clone(&self.status)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    /// Forward a parameter change to the engine, returning its status code
    pub fn set_parameter(&self, index: i32, value: f32) -> i32 {
        if self.destroyed.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        self.engine.set_parameter(index, value)
    }

    /// Double-precision variant; the value is narrowed to `f32`
    pub fn set_parameter_f64(&self, index: i32, value: f64) -> i32 {
        self.set_parameter(index, value as f32)
    }

    pub fn send_trigger(&self, index: i32) -> i32 {
        if self.destroyed.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        self.engine.send_trigger(index)
    }

    pub fn send_bytes(&self, index: i32, payload: &[u8]) -> i32 {
        if self.destroyed.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        self.engine.send_bytes(index, payload)
    }

    /// Destroy the engine host.
    ///
    /// # Errors
    /// * [`AudioError::EngineInUse`] if the driver was started and the loop
    ///   has not reached Ended yet
    /// * [`AudioError::EngineReleased`] if the engine was already destroyed
    pub fn destroy_engine(&self) -> Result<(), AudioError> {
        if self.started.load(Ordering::Acquire) && !self.status.has_ended() {
            let err = AudioError::EngineInUse {
                state: format!("{:?}", self.status.state()),
            };
            log_audio_error(&err, "AudioDriver::destroy_engine");
            return Err(err);
        }
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(AudioError::EngineReleased);
        }

        if let Some(handle) = self.lock_thread()?.take() {
            if handle.join().is_err() {
                warn!("[AudioDriver] Loop thread panicked before join");
            }
        }

        self.engine.destroy_host();
        info!("[AudioDriver] Engine host destroyed");
        Ok(())
    }

    /// Poll until the loop reaches Ended (immediately true if never started)
    pub fn wait_until_ended(&self, policy: &ShutdownPolicy) -> Result<(), AudioError> {
        if !self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        poll_until_ended(policy, || self.status.has_ended())
    }

    /// Full controller shutdown: request stop, poll for Ended, destroy the
    /// engine.
    ///
    /// On timeout the engine is left alive and the error is returned; the
    /// caller may retry.
    pub fn shutdown(&self, policy: &ShutdownPolicy) -> Result<Option<DriverOutcome>, AudioError> {
        self.request_stop();
        self.wait_until_ended(policy)?;
        match self.destroy_engine() {
            Ok(()) | Err(AudioError::EngineReleased) => Ok(self.status.outcome()),
            Err(err) => Err(err),
        }
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Option<PendingLaunch>>, AudioError> {
        self.pending.lock().map_err(|_| AudioError::LockPoisoned {
            component: "pending_launch".to_string(),
        })
    }

    fn lock_thread(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>, AudioError> {
        self.thread.lock().map_err(|_| AudioError::LockPoisoned {
            component: "loop_thread".to_string(),
        })
    }
}

impl Drop for AudioDriver {
    /// Ask a running loop to wind down; never blocks
    fn drop(&mut self) {
        if self.request_stop() {
            warn!("[AudioDriver] Dropped while running; loop will stop on its own");
        }
    }
}

impl std::fmt::Debug for AudioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDriver")
            .field("config", &self.config)
            .field("state", &self.status.state())
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish()
    }
}
