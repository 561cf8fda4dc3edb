//! Lifecycle events broadcast by the loop thread.

use serde::Serialize;

use super::state::DriverOutcome;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    Started {
        duplex: bool,
        capacity_bytes: usize,
    },
    EngineHalted {
        status: i32,
    },
    FailedToStart {
        reason: String,
    },
    Ended {
        outcome: DriverOutcome,
        blocks: u64,
        short_reads: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = DriverEvent::Ended {
            outcome: DriverOutcome::EngineHalted { status: 7 },
            blocks: 3,
            short_reads: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "ended");
        assert_eq!(json["outcome"]["kind"], "engine_halted");
        assert_eq!(json["outcome"]["status"], 7);
        assert_eq!(json["blocks"], 3);
    }
}
