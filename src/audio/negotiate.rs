//! Buffer-size negotiation and port setup at loop entry
//!
//! The common floor is the platform minimum for render, raised to the
//! capture minimum when capture is wanted. Both ports are opened with
//! `floor * buffer_multiplier` bytes. Capture problems degrade the run to
//! render-only; render problems are fatal for the run.

use log::{info, warn};
use serde::Serialize;

use super::port::{AudioPlatform, CapturePort, PortState, RenderPort, StreamSpec};
use crate::config::DriverConfig;
use crate::error::{log_audio_error, AudioError};

/// Result of the minimum-buffer queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferPlan {
    pub render_min_bytes: usize,
    /// `None` when capture is not wanted or its query failed
    pub capture_min_bytes: Option<usize>,
    pub floor_bytes: usize,
    pub capacity_bytes: usize,
}

/// Query the platform minimums and derive the shared port capacity
pub fn plan_buffers(
    platform: &dyn AudioPlatform,
    config: &DriverConfig,
) -> Result<BufferPlan, AudioError> {
    let render_min_bytes = platform.min_render_buffer_bytes(&StreamSpec::render(config))?;

    let capture_min_bytes = if config.wants_capture() {
        match platform.min_capture_buffer_bytes(&StreamSpec::capture(config)) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log_audio_error(&err, "plan_buffers(capture)");
                None
            }
        }
    } else {
        None
    };

    let floor_bytes = render_min_bytes.max(capture_min_bytes.unwrap_or(0));
    let capacity_bytes = floor_bytes * config.buffer_multiplier;

    info!(
        "[Negotiate] render_min={} capture_min={:?} floor={} capacity={}",
        render_min_bytes, capture_min_bytes, floor_bytes, capacity_bytes
    );

    Ok(BufferPlan {
        render_min_bytes,
        capture_min_bytes,
        floor_bytes,
        capacity_bytes,
    })
}

/// Ports owned by the loop thread for one run
pub struct OpenedPorts {
    pub render: Box<dyn RenderPort>,
    pub capture: Option<Box<dyn CapturePort>>,
    pub plan: BufferPlan,
}

impl OpenedPorts {
    pub fn is_duplex(&self) -> bool {
        self.capture.is_some()
    }

    /// Stop and release every port. Errors are logged; release always happens.
    pub fn close(self) {
        let mut render = self.render;
        if let Err(err) = render.stop() {
            log_audio_error(&err, "close(render stop)");
        }
        render.release();

        if let Some(mut capture) = self.capture {
            if let Err(err) = capture.stop() {
                log_audio_error(&err, "close(capture stop)");
            }
            capture.release();
        }
    }
}

/// Negotiate buffers, open and start the ports for one run
///
/// # Errors
/// Returns an error only for render-side failures. Capture failures fall
/// back to render-only operation.
pub fn open_ports(
    platform: &mut dyn AudioPlatform,
    config: &DriverConfig,
) -> Result<OpenedPorts, AudioError> {
    let plan = plan_buffers(&*platform, config)?;

    let mut render = platform.open_render(&StreamSpec::render(config), plan.capacity_bytes)?;

    let capture = if plan.capture_min_bytes.is_some() {
        open_capture(platform, config, plan.capacity_bytes)
    } else {
        None
    };

    if let Err(err) = render.start() {
        render.release();
        if let Some(capture) = capture {
            capture.release();
        }
        return Err(err);
    }

    let capture = capture.and_then(start_capture);

    Ok(OpenedPorts {
        render,
        capture,
        plan,
    })
}

fn open_capture(
    platform: &mut dyn AudioPlatform,
    config: &DriverConfig,
    capacity_bytes: usize,
) -> Option<Box<dyn CapturePort>> {
    match platform.open_capture(&StreamSpec::capture(config), capacity_bytes) {
        Ok(port) if port.state() == PortState::Ready => Some(port),
        Ok(port) => {
            warn!("[Negotiate] Capture port not ready, continuing render-only");
            port.release();
            None
        }
        Err(err) => {
            log_audio_error(&err, "open_capture");
            warn!("[Negotiate] Capture unavailable, continuing render-only");
            None
        }
    }
}

fn start_capture(mut port: Box<dyn CapturePort>) -> Option<Box<dyn CapturePort>> {
    match port.start() {
        Ok(()) => Some(port),
        Err(err) => {
            log_audio_error(&err, "start_capture");
            port.release();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPlatform, MockPlatformOptions};

    fn platform(options: MockPlatformOptions) -> MockPlatform {
        MockPlatform::new(options)
    }

    #[test]
    fn test_floor_takes_larger_minimum() {
        let platform = platform(MockPlatformOptions {
            render_min_bytes: 1000,
            capture_min_bytes: 3000,
            ..MockPlatformOptions::default()
        });
        let plan = plan_buffers(&platform, &DriverConfig::default()).unwrap();
        assert_eq!(plan.floor_bytes, 3000);
        assert_eq!(plan.capacity_bytes, 6000);
    }

    #[test]
    fn test_output_only_skips_capture_query() {
        let platform = platform(MockPlatformOptions {
            render_min_bytes: 1000,
            capture_min_bytes: 3000,
            ..MockPlatformOptions::default()
        });
        let plan = plan_buffers(&platform, &DriverConfig::output_only()).unwrap();
        assert_eq!(plan.capture_min_bytes, None);
        assert_eq!(plan.floor_bytes, 1000);
        assert_eq!(platform.log().capture_queries, 0);
    }

    #[test]
    fn test_multiplier_scales_capacity() {
        let platform = platform(MockPlatformOptions {
            render_min_bytes: 512,
            ..MockPlatformOptions::default()
        });
        let config = DriverConfig {
            buffer_multiplier: 3,
            ..DriverConfig::output_only()
        };
        let plan = plan_buffers(&platform, &config).unwrap();
        assert_eq!(plan.capacity_bytes, 1536);
    }

    #[test]
    fn test_capture_not_ready_falls_back() {
        let mut platform = platform(MockPlatformOptions {
            capture_state: PortState::Uninitialized,
            ..MockPlatformOptions::default()
        });
        let ports = open_ports(&mut platform, &DriverConfig::default()).unwrap();
        assert!(!ports.is_duplex());
        ports.close();

        let log = platform.log();
        assert_eq!(log.capture_opens, 1);
        assert_eq!(log.capture_starts, 0);
        assert_eq!(log.capture_releases, 1);
        assert_eq!(log.render_releases, 1);
    }

    #[test]
    fn test_capture_open_failure_falls_back() {
        let mut platform = platform(MockPlatformOptions {
            fail_capture_open: true,
            ..MockPlatformOptions::default()
        });
        let ports = open_ports(&mut platform, &DriverConfig::default()).unwrap();
        assert!(!ports.is_duplex());
        ports.close();
    }

    #[test]
    fn test_render_open_failure_is_fatal() {
        let mut platform = platform(MockPlatformOptions {
            fail_render_open: true,
            ..MockPlatformOptions::default()
        });
        let result = open_ports(&mut platform, &DriverConfig::default());
        assert!(matches!(result, Err(AudioError::StreamOpenFailed { .. })));
        assert_eq!(platform.log().capture_opens, 0);
    }

    #[test]
    fn test_ports_opened_with_negotiated_capacity() {
        let mut platform = platform(MockPlatformOptions {
            render_min_bytes: 4096,
            capture_min_bytes: 2048,
            ..MockPlatformOptions::default()
        });
        let ports = open_ports(&mut platform, &DriverConfig::default()).unwrap();
        assert!(ports.is_duplex());
        ports.close();

        let log = platform.log();
        assert_eq!(log.render_capacity_bytes, Some(8192));
        assert_eq!(log.capture_capacity_bytes, Some(8192));
        assert_eq!(log.render_starts, 1);
        assert_eq!(log.capture_starts, 1);
        assert_eq!(log.render_stops, 1);
        assert_eq!(log.capture_stops, 1);
    }
}
