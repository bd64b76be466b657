//! Raw native ABI of the Stream Engine library.
//!
//! Opaque handles, `#[repr(C)]` payload structs, enumerant values and the
//! function-pointer shapes bound by [`crate::library`]. Nothing in here is
//! safe on its own; the safe surface is [`crate::RootContext`] and
//! [`crate::DeviceSession`].

use std::ffi::{c_char, c_int, c_void};

/// Opaque root handle (`tobii_api_t`).
#[repr(C)]
pub struct RawApi {
    _private: [u8; 0],
}

/// Opaque device handle (`tobii_device_t`).
#[repr(C)]
pub struct RawDevice {
    _private: [u8; 0],
}

/// Native status code (`tobii_error_t`).
pub type Status = c_int;

pub const ERROR_NO_ERROR: Status = 0;
pub const ERROR_INTERNAL: Status = 1;
pub const ERROR_INSUFFICIENT_LICENSE: Status = 2;
pub const ERROR_NOT_SUPPORTED: Status = 3;
pub const ERROR_NOT_AVAILABLE: Status = 4;
pub const ERROR_CONNECTION_FAILED: Status = 5;
pub const ERROR_TIMED_OUT: Status = 6;
pub const ERROR_ALLOCATION_FAILED: Status = 7;
pub const ERROR_INVALID_PARAMETER: Status = 8;
pub const ERROR_CALIBRATION_ALREADY_STARTED: Status = 9;
pub const ERROR_CALIBRATION_NOT_STARTED: Status = 10;
pub const ERROR_ALREADY_SUBSCRIBED: Status = 11;
pub const ERROR_NOT_SUBSCRIBED: Status = 12;
pub const ERROR_OPERATION_FAILED: Status = 13;
pub const ERROR_CONFLICTING_API_INSTANCES: Status = 14;
pub const ERROR_CALIBRATION_BUSY: Status = 15;
pub const ERROR_CALLBACK_IN_PROGRESS: Status = 16;
pub const ERROR_TOO_MANY_SUBSCRIBERS: Status = 17;
pub const ERROR_CONNECTION_FAILED_DRIVER: Status = 18;
pub const ERROR_UNAUTHORIZED: Status = 19;
pub const ERROR_FIRMWARE_UPGRADE_IN_PROGRESS: Status = 20;

pub const FIELD_OF_USE_INTERACTIVE: c_int = 1;
pub const FIELD_OF_USE_ANALYTICAL: c_int = 2;

pub const VALIDITY_INVALID: c_int = 0;
pub const VALIDITY_VALID: c_int = 1;

pub const NOT_SUPPORTED: c_int = 0;
pub const SUPPORTED: c_int = 1;

pub const STATE_BOOL_FALSE: c_int = 0;
pub const STATE_BOOL_TRUE: c_int = 1;

pub const NOTIFICATION_VALUE_TYPE_NONE: c_int = 0;
pub const NOTIFICATION_VALUE_TYPE_FLOAT: c_int = 1;
pub const NOTIFICATION_VALUE_TYPE_STATE: c_int = 2;
pub const NOTIFICATION_VALUE_TYPE_DISPLAY_AREA: c_int = 3;
pub const NOTIFICATION_VALUE_TYPE_UINT: c_int = 4;
pub const NOTIFICATION_VALUE_TYPE_ENABLED_EYE: c_int = 5;
pub const NOTIFICATION_VALUE_TYPE_STRING: c_int = 6;

// -- Fixed block sizes --
pub const DEVICE_INFO_V2_SIZE: usize = 384;
pub const DEVICE_INFO_V3_SIZE: usize = 2048;
pub const TRACK_BOX_SIZE: usize = 8 * 3 * 4;
pub const DISPLAY_AREA_SIZE: usize = 3 * 3 * 4;
pub const STATE_STRING_SIZE: usize = 512;
pub const DEVICE_NAME_SIZE: usize = 64;

/// `tobii_version_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawVersion {
    pub major: c_int,
    pub minor: c_int,
    pub revision: c_int,
    pub build: c_int,
}

/// `tobii_custom_log_t`.
#[repr(C)]
pub struct RawCustomLog {
    pub log_context: *mut c_void,
    pub log_func: Option<LogFn>,
}

/// `tobii_gaze_point_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawGazePoint {
    pub timestamp_us: i64,
    pub validity: c_int,
    pub position_xy: [f32; 2],
}

/// `tobii_gaze_origin_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawGazeOrigin {
    pub timestamp_us: i64,
    pub left_validity: c_int,
    pub left_xyz: [f32; 3],
    pub right_validity: c_int,
    pub right_xyz: [f32; 3],
}

/// `tobii_head_pose_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHeadPose {
    pub timestamp_us: i64,
    pub position_validity: c_int,
    pub position_xyz: [f32; 3],
    pub rotation_validity_xyz: [c_int; 3],
    pub rotation_xyz: [f32; 3],
}

/// `tobii_user_position_guide_t`, identical in shape to the v2
/// `tobii_eye_position_normalized_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawUserPositionGuide {
    pub timestamp_us: i64,
    pub left_validity: c_int,
    pub left_xyz: [f32; 3],
    pub right_validity: c_int,
    pub right_xyz: [f32; 3],
}

/// Payload union of `tobii_notification_t`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawNotificationValue {
    pub float_: f32,
    pub state: c_int,
    pub display_area: [f32; 9],
    pub uint_: u32,
    pub enabled_eye: c_int,
    pub string_: [c_char; STATE_STRING_SIZE],
}

/// `tobii_notification_t`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawNotification {
    pub kind: c_int,
    pub value_type: c_int,
    pub value: RawNotificationValue,
}

// -- Callback shapes the native side calls back into --

pub type LogFn = unsafe extern "C" fn(log_context: *mut c_void, level: c_int, text: *const c_char);
pub type UrlReceiverFn = unsafe extern "C" fn(url: *const c_char, user_data: *mut c_void);
/// Shared shape of every struct-carrying stream callback.
pub type DataCallbackFn = unsafe extern "C" fn(data: *const c_void, user_data: *mut c_void);
pub type PresenceCallbackFn =
    unsafe extern "C" fn(status: c_int, timestamp_us: i64, user_data: *mut c_void);

// -- Entry point shapes --

pub type GetApiVersionFn = unsafe extern "C" fn(version: *mut RawVersion) -> Status;
pub type ErrorMessageFn = unsafe extern "C" fn(code: Status) -> *const c_char;
pub type ApiCreateFn = unsafe extern "C" fn(
    api: *mut *mut RawApi,
    custom_alloc: *const c_void,
    custom_log: *const RawCustomLog,
) -> Status;
pub type ApiDestroyFn = unsafe extern "C" fn(api: *mut RawApi) -> Status;
pub type SystemClockFn = unsafe extern "C" fn(api: *mut RawApi, timestamp_us: *mut i64) -> Status;
pub type EnumerateUrlsFn = unsafe extern "C" fn(
    api: *mut RawApi,
    receiver: UrlReceiverFn,
    user_data: *mut c_void,
    device_generations: u32,
) -> Status;
/// `tobii_device_create` before v4.
pub type DeviceCreateFn = unsafe extern "C" fn(
    api: *mut RawApi,
    url: *const c_char,
    device: *mut *mut RawDevice,
) -> Status;
/// `tobii_device_create` from v4, with the field-of-use selector.
pub type DeviceCreateFieldOfUseFn = unsafe extern "C" fn(
    api: *mut RawApi,
    url: *const c_char,
    field_of_use: c_int,
    device: *mut *mut RawDevice,
) -> Status;
/// Any call taking only the device handle: destroy, reconnect, process,
/// clear, timesync and every unsubscribe.
pub type DeviceFn = unsafe extern "C" fn(device: *mut RawDevice) -> Status;
/// `tobii_wait_for_callbacks` before v3.
pub type WaitWithApiFn = unsafe extern "C" fn(
    api: *mut RawApi,
    device_count: c_int,
    devices: *const *mut RawDevice,
) -> Status;
/// `tobii_wait_for_callbacks` from v3.
pub type WaitFn = unsafe extern "C" fn(device_count: c_int, devices: *const *mut RawDevice) -> Status;
/// Any query writing one fixed-size block through an out pointer.
pub type ReadBlockFn = unsafe extern "C" fn(device: *mut RawDevice, out: *mut c_void) -> Status;
pub type SupportQueryFn =
    unsafe extern "C" fn(device: *mut RawDevice, id: c_int, supported: *mut c_int) -> Status;
pub type StateBoolFn =
    unsafe extern "C" fn(device: *mut RawDevice, state: c_int, value: *mut c_int) -> Status;
pub type StateUintFn =
    unsafe extern "C" fn(device: *mut RawDevice, state: c_int, value: *mut u32) -> Status;
pub type StateStringFn =
    unsafe extern "C" fn(device: *mut RawDevice, state: c_int, value: *mut c_char) -> Status;
pub type DataSubscribeFn = unsafe extern "C" fn(
    device: *mut RawDevice,
    callback: DataCallbackFn,
    user_data: *mut c_void,
) -> Status;
pub type PresenceSubscribeFn = unsafe extern "C" fn(
    device: *mut RawDevice,
    callback: PresenceCallbackFn,
    user_data: *mut c_void,
) -> Status;

/// Read a NUL-terminated C string owned by the native side.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
pub unsafe fn c_str_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
