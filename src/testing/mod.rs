//! Hardware-free doubles for exercising the driver.
//!
//! The real ports need a sound card (or a handset), which makes local and CI
//! testing painful. These doubles stand in for the platform and the engine
//! and record every call so tests can assert on ordering and counts.
//!
//! Only compiled for unit tests or with the `test-support` Cargo feature, so
//! the shipped library carries no doubles. The integration tests enable the
//! feature through the crate's own dev-dependency entry.

pub mod mock_engine;
pub mod mock_platform;

pub use mock_engine::MockEngine;
pub use mock_platform::{MockPlatform, MockPlatformOptions, PortLog, PortLogHandle};
