//! Engine handle: the opaque synthesis backend the driver feeds blocks through.
//!
//! The driver never looks inside an engine. It hands the engine the shared
//! sample block once per iteration and forwards control-plane messages from
//! the controller thread. Engines are `Send + Sync` and take `&self`
//! everywhere because parameter calls race with block processing; each
//! implementation owns its own synchronisation.

use std::sync::Arc;

use crate::config::DriverConfig;
use crate::error::AudioError;

pub mod tone;

pub use tone::{ToneEngine, ToneParam};

/// Engine call succeeded
pub const STATUS_OK: i32 = 0;
/// Engine refused the call (unknown index, bad value, queue full)
pub const STATUS_REJECTED: i32 = -1;
/// Engine host has already been destroyed
pub const STATUS_RELEASED: i32 = -2;

/// Trait implemented by synthesis backends.
///
/// Processing calls return [`STATUS_OK`] to keep the loop going; any other
/// value asks the driver to stop after the current block is written.
pub trait EngineHandle: Send + Sync {
    /// Consume the captured samples in `block` and overwrite it with output.
    fn process_duplex(&self, block: &mut [i16]) -> i32;

    /// Fill `block` with output; there is no capture input.
    fn process_render_only(&self, block: &mut [i16]) -> i32;

    fn set_parameter(&self, index: i32, value: f32) -> i32;

    fn send_trigger(&self, index: i32) -> i32;

    fn send_bytes(&self, index: i32, payload: &[u8]) -> i32;

    /// Release engine resources. Called once, after the loop has ended.
    fn destroy_host(&self);
}

/// Creates an engine host sized for a driver configuration.
pub trait EngineFactory {
    fn create_host(&self, config: &DriverConfig) -> Result<Arc<dyn EngineHandle>, AudioError>;
}

impl<F> EngineFactory for F
where
    F: Fn(&DriverConfig) -> Result<Arc<dyn EngineHandle>, AudioError>,
{
    fn create_host(&self, config: &DriverConfig) -> Result<Arc<dyn EngineHandle>, AudioError> {
        self(config)
    }
}
