//! Integration tests for the driver lifecycle
//!
//! These tests drive the full controller / loop-thread handshake through the
//! public API using the hardware-free platform and engine doubles:
//! - duplex pass-through, engine-initiated stop, output-only runs
//! - the destroy contract and idempotent stop requests
//! - the bundled tone engine producing audio through the loop

use std::sync::Arc;
use std::time::Duration;

use ugen_audio::audio::PortState;
use ugen_audio::driver::{
    poll_until_ended, AudioDriver, DriverEvent, DriverOutcome, LifecycleState, ShutdownPolicy,
};
use ugen_audio::engine::{ToneEngine, ToneParam, STATUS_OK, STATUS_REJECTED, STATUS_RELEASED};
use ugen_audio::error::AudioError;
use ugen_audio::managers::DriverManager;
use ugen_audio::testing::{MockEngine, MockPlatform, MockPlatformOptions};
use ugen_audio::{DriverConfig, ToneConfig};

fn config(input_channels: u16) -> DriverConfig {
    DriverConfig {
        input_channels,
        block_frames: 128,
        realtime_priority: false,
        ..DriverConfig::default()
    }
}

fn policy() -> ShutdownPolicy {
    ShutdownPolicy::bounded(Duration::from_millis(5), Duration::from_secs(5))
}

fn wait_for_blocks(driver: &AudioDriver, blocks: u64) {
    let status = driver.status();
    poll_until_ended(&policy(), || {
        status.blocks_processed() >= blocks || status.has_ended()
    })
    .unwrap();
}

#[test]
fn test_duplex_round_trip() {
    let platform = MockPlatform::new(MockPlatformOptions {
        capture_value: 100,
        ..MockPlatformOptions::default()
    });
    let log = platform.log_handle();
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(config(1), Box::new(platform), engine.clone()).unwrap();

    driver.start().unwrap();
    wait_for_blocks(&driver, 10);
    assert!(driver.is_running());

    assert!(driver.request_stop());
    driver.wait_until_ended(&policy()).unwrap();
    assert!(!driver.is_running());
    assert!(driver.has_ended());
    driver.destroy_engine().unwrap();

    let log = log.snapshot();
    assert!(log.writes >= 10);
    for block in &log.written_blocks {
        assert_eq!(block.len(), 128);
        assert!(block.iter().all(|&s| s == 100));
    }
    assert!(log.all_released());
    assert_eq!(engine.destroy_calls(), 1);
    assert_eq!(engine.calls_after_destroy(), 0);
}

#[test]
fn test_default_configuration_renders_captured_blocks() {
    let config = DriverConfig {
        realtime_priority: false,
        ..DriverConfig::default()
    };
    assert_eq!(
        (
            config.sample_rate,
            config.input_channels,
            config.output_channels,
            config.block_frames,
            config.buffer_multiplier
        ),
        (22050, 1, 1, 1024, 2)
    );

    let platform = MockPlatform::new(MockPlatformOptions {
        capture_value: 100,
        ..MockPlatformOptions::default()
    });
    let log = platform.log_handle();
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(config, Box::new(platform), engine.clone()).unwrap();

    driver.start().unwrap();
    wait_for_blocks(&driver, 1);
    assert_eq!(
        driver.shutdown(&policy()).unwrap(),
        Some(DriverOutcome::Stopped)
    );

    let log = log.snapshot();
    assert!(!log.written_blocks.is_empty());
    assert_eq!(log.written_blocks[0], vec![100_i16; 1024]);
    assert!(engine.duplex_calls() >= 1);
}

#[test]
fn test_engine_initiated_stop() {
    let platform = MockPlatform::default();
    let log = platform.log_handle();
    let engine = Arc::new(MockEngine::passthrough().halt_on_call(3, 7));
    let driver = AudioDriver::with_engine(config(1), Box::new(platform), engine.clone()).unwrap();

    driver.start().unwrap();
    // No stop request: the engine's status alone ends the run
    driver.wait_until_ended(&policy()).unwrap();

    assert_eq!(engine.process_calls(), 3);
    assert_eq!(log.snapshot().writes, 3);
    assert_eq!(
        driver.outcome(),
        Some(DriverOutcome::EngineHalted { status: 7 })
    );
    assert!(!driver.request_stop());
    driver.destroy_engine().unwrap();
}

#[test]
fn test_output_only_never_touches_capture() {
    let platform = MockPlatform::default();
    let log = platform.log_handle();
    let engine = Arc::new(MockEngine::passthrough().with_render_fill(42));
    let driver = AudioDriver::with_engine(config(0), Box::new(platform), engine.clone()).unwrap();

    driver.start().unwrap();
    wait_for_blocks(&driver, 4);
    driver.shutdown(&policy()).unwrap();

    let log = log.snapshot();
    assert_eq!(log.capture_queries, 0);
    assert_eq!(log.capture_opens, 0);
    assert_eq!(engine.duplex_calls(), 0);
    assert!(engine.render_only_calls() >= 4);
    assert!(log
        .written_blocks
        .iter()
        .all(|block| block.iter().all(|&s| s == 42)));
}

#[test]
fn test_every_input_channel_count() {
    for input_channels in [0_u16, 1, 2] {
        let engine = Arc::new(MockEngine::passthrough());
        let driver = AudioDriver::with_engine(
            config(input_channels),
            Box::new(MockPlatform::default()),
            engine.clone(),
        )
        .unwrap();
        driver.start().unwrap();
        wait_for_blocks(&driver, 2);
        assert_eq!(driver.status().is_duplex(), input_channels > 0);
        assert_eq!(
            driver.shutdown(&policy()).unwrap(),
            Some(DriverOutcome::Stopped)
        );
    }
}

#[test]
fn test_capture_fallback_still_runs() {
    let platform = MockPlatform::new(MockPlatformOptions {
        capture_state: PortState::Uninitialized,
        ..MockPlatformOptions::default()
    });
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(config(1), Box::new(platform), engine.clone()).unwrap();
    let mut events = driver.subscribe_events();

    driver.start().unwrap();
    wait_for_blocks(&driver, 2);
    driver.shutdown(&policy()).unwrap();

    assert!(matches!(
        events.try_recv(),
        Ok(DriverEvent::Started { duplex: false, .. })
    ));
    assert_eq!(engine.duplex_calls(), 0);
}

#[test]
fn test_destroy_contract() {
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(
        config(1),
        Box::new(MockPlatform::default()),
        engine.clone(),
    )
    .unwrap();

    driver.start().unwrap();
    wait_for_blocks(&driver, 1);
    assert!(matches!(
        driver.destroy_engine(),
        Err(AudioError::EngineInUse { .. })
    ));

    driver.request_stop();
    assert!(!driver.request_stop());
    driver.wait_until_ended(&policy()).unwrap();
    driver.destroy_engine().unwrap();
    assert!(matches!(
        driver.destroy_engine(),
        Err(AudioError::EngineReleased)
    ));
    assert_eq!(engine.destroy_calls(), 1);
    assert_eq!(driver.set_parameter(0, 1.0), STATUS_RELEASED);
}

#[test]
fn test_failed_start_reaches_ended() {
    let platform = MockPlatform::new(MockPlatformOptions {
        fail_render_open: true,
        ..MockPlatformOptions::default()
    });
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(config(1), Box::new(platform), engine.clone()).unwrap();

    driver.start().unwrap();
    driver.wait_until_ended(&policy()).unwrap();
    assert_eq!(driver.state(), LifecycleState::Ended);
    assert_eq!(driver.outcome(), Some(DriverOutcome::FailedToStart));
    assert_eq!(engine.process_calls(), 0);
    driver.destroy_engine().unwrap();
}

#[test]
fn test_tone_engine_through_driver() {
    let tone = ToneConfig {
        attack_secs: 0.0,
        ..ToneConfig::default()
    };
    let platform = MockPlatform::default();
    let log = platform.log_handle();
    let factory = ToneEngine::factory(tone);
    let driver = AudioDriver::new(config(0), Box::new(platform), &factory).unwrap();

    assert_eq!(
        driver.set_parameter(ToneParam::Frequency as i32, 440.0),
        STATUS_OK
    );
    assert_eq!(
        driver.set_parameter(ToneParam::Amplitude as i32, 0.5),
        STATUS_OK
    );
    assert_eq!(driver.set_parameter(99, 1.0), STATUS_REJECTED);

    driver.start().unwrap();
    assert_eq!(
        driver.set_parameter_f64(ToneParam::Enable as i32, 1.0),
        STATUS_OK
    );
    wait_for_blocks(&driver, 8);
    driver.shutdown(&policy()).unwrap();

    let log = log.snapshot();
    let peak = log
        .written_blocks
        .iter()
        .flat_map(|block| block.iter())
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0);
    assert!(peak > 0, "tone voice never reached the render port");
    assert!(peak <= 32767 / 2 + 1);
}

#[test]
fn test_manager_owns_driver() {
    let manager = DriverManager::new(policy());
    let engine = Arc::new(MockEngine::passthrough());
    let driver = AudioDriver::with_engine(
        config(1),
        Box::new(MockPlatform::default()),
        engine.clone(),
    )
    .unwrap();

    manager.install(driver).unwrap();
    assert!(!manager.is_running());
    manager.start().unwrap();
    assert_eq!(manager.send_trigger(3), STATUS_OK);

    assert_eq!(manager.stop().unwrap(), Some(DriverOutcome::Stopped));
    assert!(manager.has_ended());
    assert_eq!(engine.triggers(), vec![3]);
    assert_eq!(engine.destroy_calls(), 1);
}
