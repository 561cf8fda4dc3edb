// UGen Audio - real-time audio driver loop for pluggable synthesis engines
// Blocking read / process / write loop on a dedicated thread, with a
// controller-side lifecycle and shutdown handshake

// Module declarations
pub mod audio;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod managers;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(target_os = "android")]
pub mod ffi;

// Re-exports for convenience
pub use config::{AppConfig, DriverConfig, ShutdownConfig, ToneConfig};
pub use driver::{AudioDriver, DriverEvent, DriverOutcome, LifecycleState, ShutdownPolicy};
pub use engine::{EngineFactory, EngineHandle, ToneEngine, ToneParam};
pub use error::AudioError;

/// Route `tracing` and `log` records to logcat
#[cfg(target_os = "android")]
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    match tracing_android::layer("UGenAudio") {
        Ok(layer) => {
            let _ = tracing_subscriber::registry()
                .with(level)
                .with(layer)
                .try_init();
        }
        Err(e) => eprintln!("UGenAudio: failed to create logcat layer: {}", e),
    }
}

/// Install a stderr subscriber that also captures `log` records
#[cfg(not(target_os = "android"))]
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging(true);
    log::info!("JNI_OnLoad: ugen_audio loaded");
    jni::sys::JNI_VERSION_1_6
}
