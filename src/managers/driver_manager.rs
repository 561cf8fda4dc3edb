// DriverManager: single-slot owner of the process-wide audio driver
//
// Single Responsibility: hold at most one AudioDriver and route controller
// calls to it. Used by the JNI bindings, which only ever see integer handles
// and need somewhere long-lived to keep the driver.

use std::sync::{Mutex, MutexGuard};

use log::info;

use crate::driver::{AudioDriver, DriverOutcome, LifecycleState, ShutdownPolicy};
use crate::engine::STATUS_REJECTED;
use crate::error::{log_audio_error, AudioError};

/// Owns the active driver, if any
///
/// # Example
/// ```ignore
/// let manager = DriverManager::new(ShutdownPolicy::default());
/// manager.install(driver)?;
/// manager.start()?;
/// manager.set_parameter(0, 440.0);
/// manager.stop()?;
/// ```
pub struct DriverManager {
    driver: Mutex<Option<AudioDriver>>,
    policy: ShutdownPolicy,
}

impl DriverManager {
    pub fn new(policy: ShutdownPolicy) -> Self {
        Self {
            driver: Mutex::new(None),
            policy,
        }
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// Take ownership of a constructed, not yet started driver
    ///
    /// # Errors
    /// - A driver is already installed
    /// - Lock poisoning
    pub fn install(&self, driver: AudioDriver) -> Result<(), AudioError> {
        let mut guard = self.lock_driver()?;
        self.check_slot_empty(&guard)?;
        *guard = Some(driver);
        Ok(())
    }

    /// Start the installed driver
    ///
    /// # Errors
    /// - No driver installed
    /// - The driver was already started
    pub fn start(&self) -> Result<(), AudioError> {
        let guard = self.lock_driver()?;
        let driver = guard.as_ref().ok_or_else(|| {
            let err = AudioError::NotStarted;
            log_audio_error(&err, "DriverManager::start");
            err
        })?;
        driver.start()
    }

    /// Install and start in one step
    pub fn launch(&self, driver: AudioDriver) -> Result<(), AudioError> {
        let mut guard = self.lock_driver()?;
        self.check_slot_empty(&guard)?;
        driver.start()?;
        *guard = Some(driver);
        Ok(())
    }

    /// Ask the installed driver to stop without waiting
    pub fn request_stop(&self) -> Result<bool, AudioError> {
        let guard = self.lock_driver()?;
        Ok(guard.as_ref().map(AudioDriver::request_stop).unwrap_or(false))
    }

    /// Stop the driver, wait for Ended, destroy the engine and empty the slot
    ///
    /// Safe to call when nothing is installed. On a shutdown timeout the
    /// driver stays installed so the call can be retried.
    pub fn stop(&self) -> Result<Option<DriverOutcome>, AudioError> {
        let driver = match self.lock_driver()?.take() {
            Some(driver) => driver,
            None => return Ok(None),
        };

        // The slot lock is not held while polling
        match driver.shutdown(&self.policy) {
            Ok(outcome) => {
                info!("[DriverManager] Driver shut down: {:?}", outcome);
                Ok(outcome)
            }
            Err(err) => {
                log_audio_error(&err, "DriverManager::stop");
                let mut guard = self.lock_driver()?;
                if guard.is_none() {
                    *guard = Some(driver);
                }
                Err(err)
            }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.with_driver(|_| true).unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.with_driver(AudioDriver::is_running).unwrap_or(false)
    }

    /// True when nothing is installed, or the installed driver has ended
    pub fn has_ended(&self) -> bool {
        self.with_driver(AudioDriver::has_ended).unwrap_or(true)
    }

    pub fn state(&self) -> Option<LifecycleState> {
        self.with_driver(AudioDriver::state)
    }

    pub fn set_parameter(&self, index: i32, value: f32) -> i32 {
        self.with_driver(|driver| driver.set_parameter(index, value))
            .unwrap_or(STATUS_REJECTED)
    }

    pub fn send_trigger(&self, index: i32) -> i32 {
        self.with_driver(|driver| driver.send_trigger(index))
            .unwrap_or(STATUS_REJECTED)
    }

    pub fn send_bytes(&self, index: i32, payload: &[u8]) -> i32 {
        self.with_driver(|driver| driver.send_bytes(index, payload))
            .unwrap_or(STATUS_REJECTED)
    }

    // ========================================================================
    // PRIVATE HELPER METHODS
    // ========================================================================

    fn with_driver<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&AudioDriver) -> T,
    {
        let guard = self.lock_driver().ok()?;
        guard.as_ref().map(f)
    }

    /// Safely acquire lock on the driver slot
    fn lock_driver(&self) -> Result<MutexGuard<'_, Option<AudioDriver>>, AudioError> {
        self.driver.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "audio_driver".to_string(),
            };
            log_audio_error(&err, "lock_driver");
            err
        })
    }

    fn check_slot_empty(&self, guard: &Option<AudioDriver>) -> Result<(), AudioError> {
        if guard.is_some() {
            let err = AudioError::AlreadyStarted;
            log_audio_error(&err, "check_slot_empty");
            return Err(err);
        }
        Ok(())
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new(ShutdownPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::engine::STATUS_OK;
    use crate::testing::{MockEngine, MockPlatform};
    use std::sync::Arc;
    use std::time::Duration;

    fn driver(engine: Arc<MockEngine>) -> AudioDriver {
        let config = DriverConfig {
            block_frames: 32,
            realtime_priority: false,
            ..DriverConfig::default()
        };
        AudioDriver::with_engine(config, Box::new(MockPlatform::default()), engine).unwrap()
    }

    fn manager() -> DriverManager {
        DriverManager::new(ShutdownPolicy::bounded(
            Duration::from_millis(2),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn test_empty_manager() {
        let manager = manager();
        assert!(!manager.is_installed());
        assert!(!manager.is_running());
        assert!(manager.has_ended());
        assert_eq!(manager.set_parameter(0, 1.0), STATUS_REJECTED);
        assert_eq!(manager.stop().unwrap(), None);
        assert!(matches!(manager.start(), Err(AudioError::NotStarted)));
    }

    #[test]
    fn test_single_slot() {
        let manager = manager();
        manager
            .install(driver(Arc::new(MockEngine::passthrough())))
            .unwrap();
        let second = manager.install(driver(Arc::new(MockEngine::passthrough())));
        assert!(matches!(second, Err(AudioError::AlreadyStarted)));
    }

    #[test]
    fn test_launch_route_and_stop() {
        let manager = manager();
        let engine = Arc::new(MockEngine::passthrough());
        manager.launch(driver(engine.clone())).unwrap();
        assert!(manager.is_installed());
        assert_eq!(manager.set_parameter(1, 0.25), STATUS_OK);

        let outcome = manager.stop().unwrap();
        assert_eq!(outcome, Some(DriverOutcome::Stopped));
        assert!(!manager.is_installed());
        assert_eq!(engine.destroy_calls(), 1);
        assert_eq!(engine.parameters(), vec![(1, 0.25)]);
    }

    #[test]
    fn test_stop_installed_but_never_started() {
        let manager = manager();
        let engine = Arc::new(MockEngine::passthrough());
        manager.install(driver(engine.clone())).unwrap();
        assert_eq!(manager.stop().unwrap(), None);
        assert_eq!(engine.destroy_calls(), 1);
    }
}
