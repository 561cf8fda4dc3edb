// Managers Module
//
// Long-lived owners for state that outlives a single controller call:
// - DriverManager: the process-wide audio driver slot used by the JNI bindings

pub mod driver_manager;

pub use driver_manager::DriverManager;
