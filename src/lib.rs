// Stride Calibrator Core - step-length calibration and distance estimation
// Single-owner state machine fed by step counter readings and position fixes

// Module declarations
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod managers;
pub mod replay;
pub mod telemetry;

use once_cell::sync::Lazy;

use engine::EngineHandle;

/// Process-wide engine used by the native entry points.
static ENGINE: Lazy<EngineHandle> = Lazy::new(EngineHandle::new);

/// Access the process-wide engine, creating it on first use.
pub fn engine() -> &'static EngineHandle {
    &ENGINE
}

/// Initialize Android logging
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    match tracing_android::layer("StrideCalibrator") {
        Ok(layer) => {
            // A second call finds a subscriber already installed.
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => eprintln!("Failed to create Android log layer: {err}"),
    }
}

/// Initialize desktop logging on stderr; stdout stays free for JSON output.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("JNI_OnLoad called - stride calibrator loaded");
    http::spawn_if_enabled(engine());
    jni::sys::JNI_VERSION_1_6
}

/// Android bindings for `com.stride.calibrator.StrideNative`
///
/// Input functions return 0 on success or the rejection's error code.
#[cfg(target_os = "android")]
mod android {
    use jni::objects::JClass;
    use jni::sys::{jdouble, jint, jlong, jstring};
    use jni::JNIEnv;

    use crate::calibration::TrackerSnapshot;
    use crate::error::{ErrorCode, TrackerError};

    fn status(result: Result<TrackerSnapshot, TrackerError>) -> jint {
        match result {
            Ok(_) => 0,
            Err(err) => err.code(),
        }
    }

    #[no_mangle]
    pub extern "system" fn Java_com_stride_calibrator_StrideNative_onStepUpdate<'local>(
        _env: JNIEnv<'local>,
        _class: JClass<'local>,
        raw_step_count: jlong,
    ) -> jint {
        status(super::engine().on_step_update(raw_step_count))
    }

    #[no_mangle]
    pub extern "system" fn Java_com_stride_calibrator_StrideNative_onDisplacementFix<'local>(
        _env: JNIEnv<'local>,
        _class: JClass<'local>,
        latitude: jdouble,
        longitude: jdouble,
    ) -> jint {
        status(super::engine().on_displacement_fix(latitude, longitude))
    }

    #[no_mangle]
    pub extern "system" fn Java_com_stride_calibrator_StrideNative_reset<'local>(
        _env: JNIEnv<'local>,
        _class: JClass<'local>,
    ) -> jint {
        status(super::engine().reset())
    }

    /// Current snapshot as JSON, or null when it cannot be produced
    #[no_mangle]
    pub extern "system" fn Java_com_stride_calibrator_StrideNative_snapshotJson<'local>(
        env: JNIEnv<'local>,
        _class: JClass<'local>,
    ) -> jstring {
        let json = super::engine()
            .snapshot()
            .ok()
            .and_then(|snapshot| serde_json::to_string(&snapshot).ok());

        match json.map(|json| env.new_string(json)) {
            Some(Ok(value)) => value.into_raw(),
            _ => std::ptr::null_mut(),
        }
    }
}
