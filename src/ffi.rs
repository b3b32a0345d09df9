//! FFI bindings for relapse-sentinel
//!
//! C-compatible functions for embedding the engine in a mobile host. All
//! functions use null-terminated C strings and return allocated memory that
//! must be freed by the caller using `sentinel_free_string`. The engine
//! handle from `sentinel_engine_new` is owned by the caller and released
//! with `sentinel_engine_free`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::{RiskEngine, TrainSettings, TrainingReport};
use crate::store::{FileStore, MemoryStore, StateStore};
use crate::types::UserData;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert a C string to a Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert a Rust string to a C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Training result envelope mirrored to the host as JSON.
#[derive(Serialize)]
struct TrainEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<TrainingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Create an engine persisting to `state_path`, or in memory when the path
/// is NULL.
///
/// # Safety
/// - `state_path` must be NULL or a valid null-terminated C string.
/// - The returned handle must be released with `sentinel_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_engine_new(state_path: *const c_char) -> *mut RiskEngine {
    clear_last_error();
    let store: Box<dyn StateStore> = match cstr_to_string(state_path) {
        Some(path) => Box::new(FileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };
    Box::into_raw(Box::new(RiskEngine::new(EngineConfig::default(), store)))
}

/// Release an engine handle.
///
/// # Safety
/// - `engine` must be a handle from `sentinel_engine_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn sentinel_engine_free(engine: *mut RiskEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Load persisted state. Returns false only on an invalid handle; a corrupt
/// blob falls back to a fresh engine.
///
/// # Safety
/// - `engine` must be a valid handle from `sentinel_engine_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_initialize(engine: *mut RiskEngine) -> bool {
    clear_last_error();
    let Some(engine) = engine.as_ref() else {
        set_last_error("null engine handle");
        return false;
    };
    match engine.initialize() {
        Ok(()) => true,
        Err(e) => {
            set_last_error(&e.to_string());
            false
        }
    }
}

/// Train on user-data JSON. Always returns a JSON envelope
/// `{"success": bool, "report"?: ..., "error"?: ...}`; NULL only when the
/// handle or input string is invalid.
///
/// # Safety
/// - `engine` must be a valid handle; `user_json` a valid C string.
/// - The returned string must be freed with `sentinel_free_string`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_train(
    engine: *mut RiskEngine,
    user_json: *const c_char,
) -> *mut c_char {
    clear_last_error();
    let Some(engine) = engine.as_ref() else {
        set_last_error("null engine handle");
        return ptr::null_mut();
    };
    let Some(json) = cstr_to_string(user_json) else {
        set_last_error("invalid user data string pointer");
        return ptr::null_mut();
    };

    let envelope = match serde_json::from_str::<UserData>(&json) {
        Ok(user) => match engine.train(&user, TrainSettings::default()) {
            Ok(report) => TrainEnvelope {
                success: true,
                report: Some(report),
                error: None,
            },
            Err(e) => TrainEnvelope {
                success: false,
                report: None,
                error: Some(e.to_string()),
            },
        },
        Err(e) => TrainEnvelope {
            success: false,
            report: None,
            error: Some(format!("invalid user data: {e}")),
        },
    };

    match serde_json::to_string(&envelope) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Assess current risk from user-data JSON. Returns the assessment as JSON.
///
/// # Safety
/// - `engine` must be a valid handle; `user_json` a valid C string.
/// - The returned string must be freed with `sentinel_free_string`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_predict(
    engine: *mut RiskEngine,
    user_json: *const c_char,
) -> *mut c_char {
    clear_last_error();
    let Some(engine) = engine.as_ref() else {
        set_last_error("null engine handle");
        return ptr::null_mut();
    };
    let Some(json) = cstr_to_string(user_json) else {
        set_last_error("invalid user data string pointer");
        return ptr::null_mut();
    };

    let user = match serde_json::from_str::<UserData>(&json) {
        Ok(user) => user,
        Err(e) => {
            set_last_error(&format!("invalid user data: {e}"));
            return ptr::null_mut();
        }
    };

    let assessment = engine.predict(&user);
    match serde_json::to_string(&assessment) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Model readiness and quality snapshot as JSON.
///
/// # Safety
/// - `engine` must be a valid handle.
/// - The returned string must be freed with `sentinel_free_string`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_model_info(engine: *mut RiskEngine) -> *mut c_char {
    clear_last_error();
    let Some(engine) = engine.as_ref() else {
        set_last_error("null engine handle");
        return ptr::null_mut();
    };
    match serde_json::to_string(&engine.get_model_info()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Last error message, or NULL when the previous call succeeded.
///
/// # Safety
/// - The returned string must be freed with `sentinel_free_string`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_last_error() -> *mut c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(msg) => string_to_cstr(msg.to_str().unwrap_or("invalid error message")),
        None => ptr::null_mut(),
    })
}

/// Free a string returned by any `sentinel_*` function.
///
/// # Safety
/// - `ptr` must be a string returned by this library, or NULL.
#[no_mangle]
pub unsafe extern "C" fn sentinel_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
