//! Lifecycle state shared between the controller and the loop thread
//!
//! Every cross-thread flag lives here as an atomic. Transitions are
//! compare-and-swap so they only ever move forward:
//!
//! ```text
//! Idle ──loop entry──> Running ──stop / engine status──> Draining ──ports released──> Ended
//!   └──stop before entry──────────────────────────────────┘                            ▲
//!   └──render failed to open───────────────────────────────────────────────────────────┘
//! ```
//!
//! The outcome is published before the Ended store (release), so a reader
//! that observes Ended (acquire) also observes the outcome.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Ended = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Ended,
        }
    }
}

/// How a run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverOutcome {
    /// The controller requested the stop
    Stopped,
    /// The engine returned a non-zero status from a processing call
    EngineHalted { status: i32 },
    /// The render port failed mid-run
    RenderFailed,
    /// The render port could not be opened; the loop never reached Running
    FailedToStart,
    /// The loop thread unwound from a panic
    Panicked,
}

const OUTCOME_NONE: u8 = 0;
const OUTCOME_STOPPED: u8 = 1;
const OUTCOME_ENGINE_HALTED: u8 = 2;
const OUTCOME_RENDER_FAILED: u8 = 3;
const OUTCOME_FAILED_TO_START: u8 = 4;
const OUTCOME_PANICKED: u8 = 5;

/// Lock-free status handle shared by the driver, its loop and observers
#[derive(Debug)]
pub struct DriverStatus {
    state: AtomicU8,
    outcome: AtomicU8,
    engine_status: AtomicI32,
    duplex: AtomicBool,
    blocks_processed: AtomicU64,
    short_reads: AtomicU64,
}

impl DriverStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
            outcome: AtomicU8::new(OUTCOME_NONE),
            engine_status: AtomicI32::new(0),
            duplex: AtomicBool::new(false),
            blocks_processed: AtomicU64::new(0),
            short_reads: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn has_ended(&self) -> bool {
        self.state() == LifecycleState::Ended
    }

    /// Outcome of the run; `None` until the loop has recorded one
    pub fn outcome(&self) -> Option<DriverOutcome> {
        match self.outcome.load(Ordering::Acquire) {
            OUTCOME_STOPPED => Some(DriverOutcome::Stopped),
            OUTCOME_ENGINE_HALTED => Some(DriverOutcome::EngineHalted {
                status: self.engine_status.load(Ordering::Acquire),
            }),
            OUTCOME_RENDER_FAILED => Some(DriverOutcome::RenderFailed),
            OUTCOME_FAILED_TO_START => Some(DriverOutcome::FailedToStart),
            OUTCOME_PANICKED => Some(DriverOutcome::Panicked),
            _ => None,
        }
    }

    /// Whether the current run has a capture port
    pub fn is_duplex(&self) -> bool {
        self.duplex.load(Ordering::Relaxed)
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn short_reads(&self) -> u64 {
        self.short_reads.load(Ordering::Relaxed)
    }

    /// Idle -> Running. Fails if a stop was requested before loop entry.
    pub(crate) fn enter_running(&self) -> bool {
        self.transition(LifecycleState::Idle, LifecycleState::Running)
    }

    /// Controller stop request: Idle or Running -> Draining.
    ///
    /// Idle is tried first. The loop can only move Idle -> Running, never
    /// back, so a failed Idle swap leaves Running as the only live state to
    /// catch.
    pub(crate) fn request_stop(&self) -> bool {
        self.transition(LifecycleState::Idle, LifecycleState::Draining)
            || self.transition(LifecycleState::Running, LifecycleState::Draining)
    }

    /// Loop-initiated stop: record why, then leave Running
    pub(crate) fn halt(&self, outcome: DriverOutcome) {
        self.record_outcome(outcome);
        self.transition(LifecycleState::Running, LifecycleState::Draining);
    }

    /// Publish Ended. Call only after every port is released.
    pub(crate) fn finish(&self, fallback: DriverOutcome) -> DriverOutcome {
        self.record_outcome(fallback);
        self.state
            .store(LifecycleState::Ended as u8, Ordering::Release);
        self.outcome().unwrap_or(fallback)
    }

    pub(crate) fn set_duplex(&self, duplex: bool) {
        self.duplex.store(duplex, Ordering::Relaxed);
    }

    pub(crate) fn note_block(&self) -> u64 {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn note_short_read(&self) -> u64 {
        self.short_reads.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// First recorded outcome wins
    fn record_outcome(&self, outcome: DriverOutcome) {
        let code = match outcome {
            DriverOutcome::Stopped => OUTCOME_STOPPED,
            DriverOutcome::EngineHalted { status } => {
                self.engine_status.store(status, Ordering::Release);
                OUTCOME_ENGINE_HALTED
            }
            DriverOutcome::RenderFailed => OUTCOME_RENDER_FAILED,
            DriverOutcome::FailedToStart => OUTCOME_FAILED_TO_START,
            DriverOutcome::Panicked => OUTCOME_PANICKED,
        };
        let _ = self.outcome.compare_exchange(
            OUTCOME_NONE,
            code,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for DriverStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let status = DriverStatus::new();
        assert_eq!(status.state(), LifecycleState::Idle);
        assert!(!status.is_running());
        assert!(!status.has_ended());
        assert_eq!(status.outcome(), None);
    }

    #[test]
    fn test_normal_lifecycle() {
        let status = DriverStatus::new();
        assert!(status.enter_running());
        assert!(status.is_running());
        assert!(status.request_stop());
        assert_eq!(status.state(), LifecycleState::Draining);
        assert_eq!(status.finish(DriverOutcome::Stopped), DriverOutcome::Stopped);
        assert!(status.has_ended());
    }

    #[test]
    fn test_running_entered_only_once() {
        let status = DriverStatus::new();
        assert!(status.enter_running());
        assert!(!status.enter_running());
        status.finish(DriverOutcome::Stopped);
        assert!(!status.enter_running());
        assert_eq!(status.state(), LifecycleState::Ended);
    }

    #[test]
    fn test_stop_before_entry_blocks_running() {
        let status = DriverStatus::new();
        assert!(status.request_stop());
        assert!(!status.enter_running());
        assert_eq!(status.state(), LifecycleState::Draining);
    }

    #[test]
    fn test_engine_halt_records_status() {
        let status = DriverStatus::new();
        status.enter_running();
        status.halt(DriverOutcome::EngineHalted { status: 7 });
        assert_eq!(status.state(), LifecycleState::Draining);
        assert_eq!(
            status.finish(DriverOutcome::Stopped),
            DriverOutcome::EngineHalted { status: 7 }
        );
    }

    #[test]
    fn test_first_outcome_wins() {
        let status = DriverStatus::new();
        status.enter_running();
        status.request_stop();
        status.halt(DriverOutcome::RenderFailed);
        status.halt(DriverOutcome::EngineHalted { status: 3 });
        assert_eq!(
            status.finish(DriverOutcome::Stopped),
            DriverOutcome::RenderFailed
        );
    }

    #[test]
    fn test_request_stop_after_end_is_noop() {
        let status = DriverStatus::new();
        status.finish(DriverOutcome::FailedToStart);
        assert!(!status.request_stop());
        assert!(status.has_ended());
        assert_eq!(status.outcome(), Some(DriverOutcome::FailedToStart));
    }

    #[test]
    fn test_stop_never_lost_when_racing_loop_entry() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        for _ in 0..2_000 {
            let status = Arc::new(DriverStatus::new());
            let barrier = Arc::new(Barrier::new(2));
            let entry = {
                let status = Arc::clone(&status);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    status.enter_running()
                })
            };

            barrier.wait();
            let stopped = status.request_stop();
            let entered = entry.join().unwrap();

            assert!(stopped, "stop request lost (entered running: {})", entered);
            assert_eq!(status.state(), LifecycleState::Draining);
        }
    }

    #[test]
    fn test_counters() {
        let status = DriverStatus::new();
        assert_eq!(status.note_block(), 1);
        assert_eq!(status.note_block(), 2);
        assert_eq!(status.note_short_read(), 1);
        assert_eq!(status.blocks_processed(), 2);
        assert_eq!(status.short_reads(), 1);
    }
}
