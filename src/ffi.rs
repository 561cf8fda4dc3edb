//! JNI entry points for the Java `org.ugen.audio.UGenAudio` controller.
//!
//! The Java side holds no native handles. One driver lives in a process-wide
//! [`DriverManager`]; every native call routes through it. Calls that can fail
//! return `0` on success or an [`AudioErrorCodes`](crate::error::AudioErrorCodes)
//! value. Engine pass-throughs return the engine's status code unchanged.

use jni::objects::{GlobalRef, JByteArray, JClass, JObject};
use jni::sys::{jboolean, jdouble, jint, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{error, info};
use once_cell::sync::{Lazy, OnceCell};

use crate::audio::default_platform;
use crate::config::{AppConfig, DriverConfig};
use crate::driver::AudioDriver;
use crate::engine::{ToneEngine, STATUS_REJECTED};
use crate::error::{log_audio_error, AudioError, ErrorCode};
use crate::managers::DriverManager;

static APP_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::default);

static DRIVER: Lazy<DriverManager> =
    Lazy::new(|| DriverManager::new(APP_CONFIG.shutdown.clone().into()));

/// Keeps the application context alive for as long as Oboe may use it
static ANDROID_CONTEXT: OnceCell<GlobalRef> = OnceCell::new();

fn to_code(result: Result<(), AudioError>) -> jint {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn channel_count(value: jint) -> Result<u16, AudioError> {
    u16::try_from(value).map_err(|_| AudioError::InvalidConfig {
        reason: format!("channel count out of range: {}", value),
    })
}

/// Hand the application context to ndk-context. Must run before the first
/// driver is created.
#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeInitContext(
    env: JNIEnv,
    _class: JClass,
    context: JObject,
) -> jint {
    to_code(init_android_context(&env, &context))
}

fn init_android_context(env: &JNIEnv, context: &JObject) -> Result<(), AudioError> {
    if ANDROID_CONTEXT.get().is_some() {
        return Ok(());
    }

    let jni_err = |e: jni::errors::Error| AudioError::JniInitFailed {
        reason: e.to_string(),
    };
    let vm = env.get_java_vm().map_err(jni_err)?;
    let global = env.new_global_ref(context).map_err(jni_err)?;

    // SAFETY: the VM pointer is valid for the life of the process and the
    // context is pinned by a global reference that is never dropped.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer().cast(),
            global.as_obj().as_raw().cast(),
        );
    }

    if ANDROID_CONTEXT.set(global).is_err() {
        error!("[ffi] Android context initialized twice");
    }
    info!("[ffi] Android context initialized");
    Ok(())
}

/// Create the driver and its engine host. Does not start audio.
#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeCreate(
    _env: JNIEnv,
    _class: JClass,
    sample_rate: jint,
    input_channels: jint,
    output_channels: jint,
    block_frames: jint,
) -> jint {
    let result = (|| {
        let config = DriverConfig {
            sample_rate: u32::try_from(sample_rate).unwrap_or(0),
            input_channels: channel_count(input_channels)?,
            output_channels: channel_count(output_channels)?,
            block_frames: usize::try_from(block_frames).unwrap_or(0),
            ..APP_CONFIG.driver.clone()
        };
        let factory = ToneEngine::factory(APP_CONFIG.tone.clone());
        let driver = AudioDriver::new(config, default_platform(), &factory)?;
        DRIVER.install(driver)
    })();

    if let Err(err) = &result {
        log_audio_error(err, "nativeCreate");
    }
    to_code(result)
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeStart(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    to_code(DRIVER.start())
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeRequestStop(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    to_jboolean(DRIVER.request_stop().unwrap_or(false))
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeIsRunning(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    to_jboolean(DRIVER.is_running())
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeHasEnded(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    to_jboolean(DRIVER.has_ended())
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeSetParameter(
    _env: JNIEnv,
    _class: JClass,
    index: jint,
    value: jdouble,
) -> jint {
    DRIVER.set_parameter(index, value as f32)
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeSendTrigger(
    _env: JNIEnv,
    _class: JClass,
    index: jint,
) -> jint {
    DRIVER.send_trigger(index)
}

#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeSendBytes(
    env: JNIEnv,
    _class: JClass,
    index: jint,
    data: JByteArray,
) -> jint {
    match env.convert_byte_array(&data) {
        Ok(payload) => DRIVER.send_bytes(index, &payload),
        Err(e) => {
            error!("[ffi] sendBytes: could not read byte array: {}", e);
            STATUS_REJECTED
        }
    }
}

/// Stop (if running), wait for the loop to end and destroy the engine host
#[no_mangle]
pub extern "system" fn Java_org_ugen_audio_UGenAudio_nativeDestroy(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    to_code(DRIVER.stop().map(|_| ()))
}
