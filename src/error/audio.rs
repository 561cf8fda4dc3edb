// Audio driver error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio driver error code constants
///
/// Single source of truth for the numeric codes handed to Java through the
/// JNI surface and printed by the CLI.
///
/// Error code range: 1001-1014
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Driver configuration rejected by validation
    pub const INVALID_CONFIG: i32 = 1001;

    /// start() was already called on this driver instance
    pub const ALREADY_STARTED: i32 = 1002;

    /// Operation requires a driver that has been launched
    pub const NOT_STARTED: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1004;

    /// Platform refused to report a minimum buffer size
    pub const BUFFER_QUERY_FAILED: i32 = 1005;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// Engine host could not be created
    pub const ENGINE_CREATE_FAILED: i32 = 1008;

    /// Engine teardown attempted while the loop may still reference it
    pub const ENGINE_IN_USE: i32 = 1009;

    /// Audio stream disconnected or channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1010;

    /// Engine host was already destroyed
    pub const ENGINE_RELEASED: i32 = 1011;

    /// Controller gave up waiting for the loop to end
    pub const SHUTDOWN_TIMED_OUT: i32 = 1012;

    /// Loop thread could not be spawned
    pub const THREAD_SPAWN_FAILED: i32 = 1013;

    /// JNI initialization failed on Android
    pub const JNI_INIT_FAILED: i32 = 1014;
}

/// Log an audio error with structured context
///
/// This function logs audio errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioDriver, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio driver errors
///
/// These errors cover driver construction, port negotiation, the controller
/// handshake and hardware access. Conditions inside the loop never surface
/// here; they are reported through the driver outcome instead.
///
/// Error code ranges: 1001-1014
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Driver configuration rejected by validation
    InvalidConfig { reason: String },

    /// start() was already called on this driver instance
    AlreadyStarted,

    /// Operation requires a driver that has been launched
    NotStarted,

    /// Hardware error occurred
    HardwareError { details: String },

    /// Platform refused to report a minimum buffer size
    BufferQueryFailed { reason: String },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Engine host could not be created
    EngineCreateFailed { reason: String },

    /// Engine teardown attempted before the loop reached Ended
    EngineInUse { state: String },

    /// Stream channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Engine host was already destroyed
    EngineReleased,

    /// Controller gave up waiting for the loop to end
    ShutdownTimedOut { waited_ms: u64 },

    /// Loop thread could not be spawned
    ThreadSpawnFailed { reason: String },

    /// JNI initialization failed on Android
    JniInitFailed { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::InvalidConfig { .. } => AudioErrorCodes::INVALID_CONFIG,
            AudioError::AlreadyStarted => AudioErrorCodes::ALREADY_STARTED,
            AudioError::NotStarted => AudioErrorCodes::NOT_STARTED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::BufferQueryFailed { .. } => AudioErrorCodes::BUFFER_QUERY_FAILED,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::EngineCreateFailed { .. } => AudioErrorCodes::ENGINE_CREATE_FAILED,
            AudioError::EngineInUse { .. } => AudioErrorCodes::ENGINE_IN_USE,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::EngineReleased => AudioErrorCodes::ENGINE_RELEASED,
            AudioError::ShutdownTimedOut { .. } => AudioErrorCodes::SHUTDOWN_TIMED_OUT,
            AudioError::ThreadSpawnFailed { .. } => AudioErrorCodes::THREAD_SPAWN_FAILED,
            AudioError::JniInitFailed { .. } => AudioErrorCodes::JNI_INIT_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::InvalidConfig { reason } => {
                format!("Invalid driver configuration: {}", reason)
            }
            AudioError::AlreadyStarted => {
                "Audio driver already started. Create a fresh driver to run again.".to_string()
            }
            AudioError::NotStarted => "Audio driver not started. Call start() first.".to_string(),
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::BufferQueryFailed { reason } => {
                format!("Failed to query minimum buffer size: {}", reason)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::EngineCreateFailed { reason } => {
                format!("Failed to create engine host: {}", reason)
            }
            AudioError::EngineInUse { state } => {
                format!(
                    "Engine still referenced by the audio loop (state {}). Wait for has_ended() first.",
                    state
                )
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::EngineReleased => "Engine host already destroyed".to_string(),
            AudioError::ShutdownTimedOut { waited_ms } => {
                format!("Audio loop did not end within {} ms", waited_ms)
            }
            AudioError::ThreadSpawnFailed { reason } => {
                format!("Failed to spawn audio thread: {}", reason)
            }
            AudioError::JniInitFailed { reason } => {
                format!("JNI initialization failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
