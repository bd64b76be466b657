//! In-process fake of the native library for unit tests.
//!
//! Every entry point is an `extern "C"` function over thread-local state, so
//! each test thread drives its own library instance. Symbol tables are built
//! per major version with that version's call shapes and symbol names.

use crate::ffi::{
    ApiCreateFn, ApiDestroyFn, DataCallbackFn, DataSubscribeFn, DeviceCreateFieldOfUseFn,
    DeviceCreateFn, DeviceFn, EnumerateUrlsFn, ErrorMessageFn, GetApiVersionFn, LogFn,
    PresenceCallbackFn, PresenceSubscribeFn, RawApi, RawCustomLog, RawDevice, RawGazeOrigin,
    RawGazePoint, RawHeadPose, RawNotification, RawNotificationValue, RawUserPositionGuide,
    RawVersion, ReadBlockFn, StateBoolFn, StateStringFn, StateUintFn, Status, SupportQueryFn,
    SystemClockFn, UrlReceiverFn, WaitFn, WaitWithApiFn, DEVICE_NAME_SIZE, ERROR_ALREADY_SUBSCRIBED,
    ERROR_CONNECTION_FAILED, ERROR_INVALID_PARAMETER, ERROR_NOT_SUBSCRIBED, ERROR_NOT_SUPPORTED,
    ERROR_NO_ERROR, ERROR_TIMED_OUT, NOTIFICATION_VALUE_TYPE_STATE, NOT_SUPPORTED,
    STATE_BOOL_FALSE, STATE_BOOL_TRUE, STATE_STRING_SIZE, SUPPORTED,
};
use crate::layout::encode;
use crate::library::{NativeLibrary, SymbolSource};
use crate::stream::{NativeCallback, StreamKind};
use crate::types::{DeviceInfo, DisplayArea, TrackBox};
use crate::version::{InfoLayout, Version};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

/// One recorded entry-point invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    ApiCreate,
    ApiDestroy,
    SystemClock,
    Enumerate { generations: u32 },
    DeviceCreate { url: String, field_of_use: Option<c_int> },
    DeviceDestroy,
    Reconnect,
    Process,
    ClearBuffers,
    Timesync,
    WaitWithApi { devices: usize },
    Wait { devices: usize },
    Subscribe(StreamKind),
    Unsubscribe(StreamKind),
    Query(&'static str),
}

/// A sample queued on a fake device, delivered by `process_callbacks`.
#[derive(Clone, Copy)]
pub(crate) enum Sample {
    GazePoint(RawGazePoint),
    GazeOrigin(RawGazeOrigin),
    Presence { status: c_int, timestamp_us: i64 },
    HeadPose(RawHeadPose),
    Notification(RawNotification),
    UserPositionGuide(RawUserPositionGuide),
}

impl Sample {
    pub(crate) fn gaze_point(timestamp_us: i64, x: f32, y: f32) -> Self {
        Sample::GazePoint(RawGazePoint {
            timestamp_us,
            validity: 1,
            position_xy: [x, y],
        })
    }

    pub(crate) fn power_save_changed(active: bool) -> Self {
        Sample::Notification(RawNotification {
            kind: 5,
            value_type: NOTIFICATION_VALUE_TYPE_STATE,
            value: RawNotificationValue {
                state: if active { STATE_BOOL_TRUE } else { STATE_BOOL_FALSE },
            },
        })
    }

    fn kind(&self) -> StreamKind {
        match self {
            Sample::GazePoint(_) => StreamKind::GazePoint,
            Sample::GazeOrigin(_) => StreamKind::GazeOrigin,
            Sample::Presence { .. } => StreamKind::UserPresence,
            Sample::HeadPose(_) => StreamKind::HeadPose,
            Sample::Notification(_) => StreamKind::Notification,
            Sample::UserPositionGuide(_) => StreamKind::UserPositionGuide,
        }
    }

    fn payload(&self) -> *const c_void {
        match self {
            Sample::GazePoint(raw) => raw as *const RawGazePoint as *const c_void,
            Sample::GazeOrigin(raw) => raw as *const RawGazeOrigin as *const c_void,
            Sample::HeadPose(raw) => raw as *const RawHeadPose as *const c_void,
            Sample::Notification(raw) => raw as *const RawNotification as *const c_void,
            Sample::UserPositionGuide(raw) => raw as *const RawUserPositionGuide as *const c_void,
            Sample::Presence { .. } => ptr::null(),
        }
    }
}

struct FakeDevice {
    url: String,
    subscriptions: [Option<(NativeCallback, *mut c_void)>; 6],
    queue: VecDeque<Sample>,
}

/// Mutable behaviour of the fake library on the current thread.
pub(crate) struct FakeState {
    calls: Vec<Call>,
    failures: Vec<(Call, Status)>,
    next_handle: usize,
    apis: Vec<usize>,
    devices: HashMap<usize, FakeDevice>,
    log_sink: Option<(LogFn, *mut c_void)>,
    pub urls: Vec<String>,
    pub clock_us: i64,
    pub info: DeviceInfo,
    /// `None` makes the track-box query report not supported.
    pub track_box: Option<TrackBox>,
    pub display_area: DisplayArea,
    pub enabled_eye: c_int,
    /// Known capability ids; anything else is an invalid parameter.
    pub capabilities: HashMap<c_int, bool>,
    pub streams: HashMap<c_int, bool>,
    pub bool_states: HashMap<c_int, bool>,
    pub uint_states: HashMap<c_int, u32>,
    pub string_states: HashMap<c_int, String>,
    /// Emitted through the custom log while the root context is created.
    pub create_log: Option<(c_int, String)>,
    pub device_name: String,
    pub output_frequency: f32,
    /// Deliver queued samples of a stream from inside its unsubscribe call.
    pub deliver_on_unsubscribe: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            failures: Vec::new(),
            next_handle: 0,
            apis: Vec::new(),
            devices: HashMap::new(),
            log_sink: None,
            urls: vec!["tobii-ttp://IS514-100203080613".to_string()],
            clock_us: 1_000_000,
            info: DeviceInfo {
                serial_number: "IS514-100203080613".into(),
                model: "Tobii Eye Tracker 5".into(),
                generation: "IS5".into(),
                firmware_version: "1.4.2".into(),
                integration_id: Some("tobii-prp".into()),
                hw_calibration_version: Some("3".into()),
                hw_calibration_date: Some("2020-10-01".into()),
                lot_id: Some("LOT-77".into()),
                integration_type: Some("peripheral".into()),
                runtime_build_version: Some("4.1.0.5".into()),
            },
            track_box: None,
            display_area: DisplayArea {
                top_left_mm: [-260.0, 150.0, 20.0],
                top_right_mm: [260.0, 150.0, 20.0],
                bottom_left_mm: [-260.0, 0.0, 0.0],
            },
            enabled_eye: 2,
            capabilities: (0..=8).map(|id| (id, id == 1)).collect(),
            streams: (0..=7).map(|id| (id, id <= 4)).collect(),
            bool_states: [(0, false), (1, false), (2, false), (3, false), (7, false)]
                .into_iter()
                .collect(),
            uint_states: [(6, 42)].into_iter().collect(),
            string_states: [(4, "ok".to_string()), (5, "ok".to_string())]
                .into_iter()
                .collect(),
            create_log: None,
            device_name: "Living room tracker".into(),
            output_frequency: 90.0,
            deliver_on_unsubscribe: false,
        }
    }
}

impl FakeState {
    fn new_handle(&mut self) -> usize {
        self.next_handle += 1;
        0x1000 + self.next_handle * 0x10
    }
}

thread_local! {
    static FAKE: RefCell<FakeState> = RefCell::new(FakeState::default());
}

pub(crate) fn with_state<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    FAKE.with(|s| f(&mut s.borrow_mut()))
}

pub(crate) fn reset() {
    with_state(|s| *s = FakeState::default());
}

pub(crate) fn calls() -> Vec<Call> {
    with_state(|s| s.calls.clone())
}

pub(crate) fn clear_calls() {
    with_state(|s| s.calls.clear());
}

/// Make the next invocation matching `call` return `status` without effect.
pub(crate) fn fail_next(call: Call, status: Status) {
    with_state(|s| s.failures.push((call, status)));
}

/// Queue a sample on the open device with `url`.
pub(crate) fn push_sample(url: &str, sample: Sample) {
    with_state(|s| {
        let device = s
            .devices
            .values_mut()
            .find(|d| d.url == url)
            .expect("no open fake device with that url");
        device.queue.push_back(sample);
    });
}

pub(crate) fn live_apis() -> usize {
    with_state(|s| s.apis.len())
}

pub(crate) fn live_devices() -> usize {
    with_state(|s| s.devices.len())
}

/// Native subscriptions currently held across all devices.
pub(crate) fn native_subscriptions() -> usize {
    with_state(|s| {
        s.devices
            .values()
            .map(|d| d.subscriptions.iter().filter(|e| e.is_some()).count())
            .sum()
    })
}

/// Emit one line through the registered custom log. Returns whether a log
/// sink was registered.
pub(crate) fn emit_log(level: c_int, text: &str) -> bool {
    let sink = with_state(|s| s.log_sink);
    match sink {
        Some((func, context)) => {
            let text = CString::new(text).unwrap_or_default();
            unsafe { func(context, level, text.as_ptr()) };
            true
        }
        None => false,
    }
}

/// Record `call` and return an injected status for it, if any.
fn enter(call: Call) -> Option<Status> {
    with_state(|s| {
        let injected = s
            .failures
            .iter()
            .position(|(c, _)| *c == call)
            .map(|i| s.failures.remove(i).1);
        s.calls.push(call);
        injected
    })
}

fn with_device(device: *mut RawDevice, f: impl FnOnce(&mut FakeState, usize) -> Status) -> Status {
    with_state(|s| {
        let key = device as usize;
        if s.devices.contains_key(&key) {
            f(s, key)
        } else {
            ERROR_INVALID_PARAMETER
        }
    })
}

unsafe fn write_c_string(out: *mut c_char, capacity: usize, text: &str) {
    let len = text.len().min(capacity - 1);
    ptr::copy_nonoverlapping(text.as_ptr() as *const c_char, out, len);
    *out.add(len) = 0;
}

unsafe fn write_block(out: *mut c_void, block: &[u8]) {
    ptr::copy_nonoverlapping(block.as_ptr(), out as *mut u8, block.len());
}

unsafe fn deliver(callback: NativeCallback, user_data: *mut c_void, sample: &Sample) {
    match (callback, sample) {
        (
            NativeCallback::Presence(cb),
            Sample::Presence {
                status,
                timestamp_us,
            },
        ) => cb(*status, *timestamp_us, user_data),
        (NativeCallback::Data(cb), _) => cb(sample.payload(), user_data),
        _ => {}
    }
}

// -- Entry points --

unsafe extern "C" fn get_api_version<const MAJOR: c_int>(out: *mut RawVersion) -> Status {
    *out = RawVersion {
        major: MAJOR,
        minor: 1,
        revision: 0,
        build: 7,
    };
    ERROR_NO_ERROR
}

unsafe extern "C" fn error_message(code: Status) -> *const c_char {
    let text: &'static [u8] = match code {
        0 => b"TOBII_ERROR_NO_ERROR\0",
        1 => b"TOBII_ERROR_INTERNAL\0",
        2 => b"TOBII_ERROR_INSUFFICIENT_LICENSE\0",
        3 => b"TOBII_ERROR_NOT_SUPPORTED\0",
        4 => b"TOBII_ERROR_NOT_AVAILABLE\0",
        5 => b"TOBII_ERROR_CONNECTION_FAILED\0",
        6 => b"TOBII_ERROR_TIMED_OUT\0",
        7 => b"TOBII_ERROR_ALLOCATION_FAILED\0",
        8 => b"TOBII_ERROR_INVALID_PARAMETER\0",
        9 => b"TOBII_ERROR_CALIBRATION_ALREADY_STARTED\0",
        10 => b"TOBII_ERROR_CALIBRATION_NOT_STARTED\0",
        11 => b"TOBII_ERROR_ALREADY_SUBSCRIBED\0",
        12 => b"TOBII_ERROR_NOT_SUBSCRIBED\0",
        13 => b"TOBII_ERROR_OPERATION_FAILED\0",
        14 => b"TOBII_ERROR_CONFLICTING_API_INSTANCES\0",
        15 => b"TOBII_ERROR_CALIBRATION_BUSY\0",
        16 => b"TOBII_ERROR_CALLBACK_IN_PROGRESS\0",
        17 => b"TOBII_ERROR_TOO_MANY_SUBSCRIBERS\0",
        18 => b"TOBII_ERROR_CONNECTION_FAILED_DRIVER\0",
        19 => b"TOBII_ERROR_UNAUTHORIZED\0",
        20 => b"TOBII_ERROR_FIRMWARE_UPGRADE_IN_PROGRESS\0",
        _ => b"\0",
    };
    text.as_ptr() as *const c_char
}

unsafe extern "C" fn api_create(
    api: *mut *mut RawApi,
    _custom_alloc: *const c_void,
    custom_log: *const RawCustomLog,
) -> Status {
    if let Some(status) = enter(Call::ApiCreate) {
        return status;
    }
    if api.is_null() {
        return ERROR_INVALID_PARAMETER;
    }
    let sink = if custom_log.is_null() {
        None
    } else {
        let custom = &*custom_log;
        custom.log_func.map(|func| (func, custom.log_context))
    };
    let (handle, create_log) = with_state(|s| {
        let handle = s.new_handle();
        s.apis.push(handle);
        s.log_sink = sink;
        (handle, s.create_log.clone())
    });
    if let Some((level, text)) = create_log {
        emit_log(level, &text);
    }
    *api = handle as *mut RawApi;
    ERROR_NO_ERROR
}

unsafe extern "C" fn api_destroy(api: *mut RawApi) -> Status {
    if let Some(status) = enter(Call::ApiDestroy) {
        return status;
    }
    with_state(|s| match s.apis.iter().position(|&h| h == api as usize) {
        Some(i) => {
            s.apis.remove(i);
            s.log_sink = None;
            ERROR_NO_ERROR
        }
        None => ERROR_INVALID_PARAMETER,
    })
}

unsafe extern "C" fn system_clock(api: *mut RawApi, timestamp_us: *mut i64) -> Status {
    if let Some(status) = enter(Call::SystemClock) {
        return status;
    }
    let now = with_state(|s| {
        if !s.apis.contains(&(api as usize)) {
            return None;
        }
        let now = s.clock_us;
        s.clock_us += 1_000;
        Some(now)
    });
    match now {
        Some(now) => {
            *timestamp_us = now;
            ERROR_NO_ERROR
        }
        None => ERROR_INVALID_PARAMETER,
    }
}

unsafe extern "C" fn enumerate_urls(
    api: *mut RawApi,
    receiver: UrlReceiverFn,
    user_data: *mut c_void,
    device_generations: u32,
) -> Status {
    if let Some(status) = enter(Call::Enumerate {
        generations: device_generations,
    }) {
        return status;
    }
    let urls = with_state(|s| s.apis.contains(&(api as usize)).then(|| s.urls.clone()));
    let Some(urls) = urls else {
        return ERROR_INVALID_PARAMETER;
    };
    for url in urls {
        let url = CString::new(url).unwrap_or_default();
        receiver(url.as_ptr(), user_data);
    }
    ERROR_NO_ERROR
}

unsafe fn create_device(
    api: *mut RawApi,
    url: *const c_char,
    field_of_use: Option<c_int>,
    device: *mut *mut RawDevice,
) -> Status {
    let url = CStr::from_ptr(url).to_string_lossy().into_owned();
    if let Some(status) = enter(Call::DeviceCreate {
        url: url.clone(),
        field_of_use,
    }) {
        return status;
    }
    let created = with_state(|s| {
        if !s.apis.contains(&(api as usize)) {
            return Err(ERROR_INVALID_PARAMETER);
        }
        if !s.urls.contains(&url) {
            return Err(ERROR_CONNECTION_FAILED);
        }
        let handle = s.new_handle();
        s.devices.insert(
            handle,
            FakeDevice {
                url,
                subscriptions: [None; 6],
                queue: VecDeque::new(),
            },
        );
        Ok(handle)
    });
    match created {
        Ok(handle) => {
            *device = handle as *mut RawDevice;
            ERROR_NO_ERROR
        }
        Err(status) => status,
    }
}

unsafe extern "C" fn device_create(
    api: *mut RawApi,
    url: *const c_char,
    device: *mut *mut RawDevice,
) -> Status {
    create_device(api, url, None, device)
}

unsafe extern "C" fn device_create_field_of_use(
    api: *mut RawApi,
    url: *const c_char,
    field_of_use: c_int,
    device: *mut *mut RawDevice,
) -> Status {
    create_device(api, url, Some(field_of_use), device)
}

unsafe extern "C" fn device_destroy(device: *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::DeviceDestroy) {
        return status;
    }
    with_device(device, |s, key| {
        s.devices.remove(&key);
        ERROR_NO_ERROR
    })
}

unsafe extern "C" fn device_reconnect(device: *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::Reconnect) {
        return status;
    }
    with_device(device, |_, _| ERROR_NO_ERROR)
}

unsafe extern "C" fn process_callbacks(device: *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::Process) {
        return status;
    }
    let mut deliveries = Vec::new();
    let status = with_device(device, |s, key| {
        let Some(dev) = s.devices.get_mut(&key) else {
            return ERROR_INVALID_PARAMETER;
        };
        while let Some(sample) = dev.queue.pop_front() {
            if let Some((callback, user_data)) = dev.subscriptions[sample.kind().index()] {
                deliveries.push((callback, user_data, sample));
            }
        }
        ERROR_NO_ERROR
    });
    // Callbacks run with the state unborrowed, as they would on a real
    // library.
    for (callback, user_data, sample) in &deliveries {
        deliver(*callback, *user_data, sample);
    }
    status
}

unsafe extern "C" fn clear_callback_buffers(device: *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::ClearBuffers) {
        return status;
    }
    with_device(device, |s, key| {
        if let Some(dev) = s.devices.get_mut(&key) {
            dev.queue.clear();
        }
        ERROR_NO_ERROR
    })
}

unsafe extern "C" fn update_timesync(device: *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::Timesync) {
        return status;
    }
    with_device(device, |_, _| ERROR_NO_ERROR)
}

unsafe fn wait(device_count: c_int, devices: *const *mut RawDevice) -> Status {
    if device_count <= 0 || devices.is_null() {
        return ERROR_INVALID_PARAMETER;
    }
    let handles = std::slice::from_raw_parts(devices, device_count as usize);
    with_state(|s| {
        let mut ready = false;
        for handle in handles {
            match s.devices.get(&(*handle as usize)) {
                Some(dev) => ready |= !dev.queue.is_empty(),
                None => return ERROR_INVALID_PARAMETER,
            }
        }
        if ready {
            ERROR_NO_ERROR
        } else {
            ERROR_TIMED_OUT
        }
    })
}

unsafe extern "C" fn wait_with_api(
    _api: *mut RawApi,
    device_count: c_int,
    devices: *const *mut RawDevice,
) -> Status {
    if let Some(status) = enter(Call::WaitWithApi {
        devices: device_count.max(0) as usize,
    }) {
        return status;
    }
    wait(device_count, devices)
}

unsafe extern "C" fn wait_contextless(device_count: c_int, devices: *const *mut RawDevice) -> Status {
    if let Some(status) = enter(Call::Wait {
        devices: device_count.max(0) as usize,
    }) {
        return status;
    }
    wait(device_count, devices)
}

unsafe extern "C" fn get_device_info<const V3: bool>(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_device_info")) {
        return status;
    }
    let layout = if V3 { InfoLayout::V3 } else { InfoLayout::V2 };
    let mut block = Vec::new();
    let status = with_device(device, |s, _| {
        block = encode::device_info(&s.info, layout);
        ERROR_NO_ERROR
    });
    if status == ERROR_NO_ERROR {
        write_block(out, &block);
    }
    status
}

unsafe extern "C" fn get_track_box(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_track_box")) {
        return status;
    }
    let mut block = Vec::new();
    let status = with_device(device, |s, _| match &s.track_box {
        Some(tb) => {
            block = encode::track_box(tb);
            ERROR_NO_ERROR
        }
        None => ERROR_NOT_SUPPORTED,
    });
    if status == ERROR_NO_ERROR {
        write_block(out, &block);
    }
    status
}

unsafe extern "C" fn get_display_area(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_display_area")) {
        return status;
    }
    let mut block = Vec::new();
    let status = with_device(device, |s, _| {
        block = encode::display_area(&s.display_area);
        ERROR_NO_ERROR
    });
    if status == ERROR_NO_ERROR {
        write_block(out, &block);
    }
    status
}

unsafe extern "C" fn get_enabled_eye(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_enabled_eye")) {
        return status;
    }
    let mut eye = 0;
    let status = with_device(device, |s, _| {
        eye = s.enabled_eye;
        ERROR_NO_ERROR
    });
    if status == ERROR_NO_ERROR {
        *(out as *mut c_int) = eye;
    }
    status
}

unsafe extern "C" fn get_device_name(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_device_name")) {
        return status;
    }
    let mut name = String::new();
    let status = with_device(device, |s, _| {
        name = s.device_name.clone();
        ERROR_NO_ERROR
    });
    if status == ERROR_NO_ERROR {
        write_c_string(out as *mut c_char, DEVICE_NAME_SIZE, &name);
    }
    status
}

unsafe extern "C" fn get_output_frequency(device: *mut RawDevice, out: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_output_frequency")) {
        return status;
    }
    let mut hz = 0.0;
    let status = with_device(device, |s, _| {
        hz = s.output_frequency;
        ERROR_NO_ERROR
    });
    if status == ERROR_NO_ERROR {
        *(out as *mut f32) = hz;
    }
    status
}

unsafe fn support_query(
    op: &'static str,
    device: *mut RawDevice,
    id: c_int,
    supported: *mut c_int,
    table: fn(&FakeState) -> &HashMap<c_int, bool>,
) -> Status {
    if let Some(status) = enter(Call::Query(op)) {
        return status;
    }
    let mut answer = None;
    let status = with_device(device, |s, _| {
        answer = table(s).get(&id).copied();
        match answer {
            Some(_) => ERROR_NO_ERROR,
            None => ERROR_INVALID_PARAMETER,
        }
    });
    if let Some(yes) = answer {
        *supported = if yes { SUPPORTED } else { NOT_SUPPORTED };
    }
    status
}

unsafe extern "C" fn capability_supported(
    device: *mut RawDevice,
    id: c_int,
    supported: *mut c_int,
) -> Status {
    support_query("tobii_capability_supported", device, id, supported, |s| &s.capabilities)
}

unsafe extern "C" fn stream_supported(
    device: *mut RawDevice,
    id: c_int,
    supported: *mut c_int,
) -> Status {
    support_query("tobii_stream_supported", device, id, supported, |s| &s.streams)
}

unsafe extern "C" fn get_state_bool(device: *mut RawDevice, state: c_int, value: *mut c_int) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_state_bool")) {
        return status;
    }
    let mut read = None;
    let status = with_device(device, |s, _| {
        read = s.bool_states.get(&state).copied();
        if read.is_some() {
            ERROR_NO_ERROR
        } else {
            ERROR_NOT_SUPPORTED
        }
    });
    if let Some(on) = read {
        *value = if on { STATE_BOOL_TRUE } else { STATE_BOOL_FALSE };
    }
    status
}

unsafe extern "C" fn get_state_uint32(device: *mut RawDevice, state: c_int, value: *mut u32) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_state_uint32")) {
        return status;
    }
    let mut read = None;
    let status = with_device(device, |s, _| {
        read = s.uint_states.get(&state).copied();
        if read.is_some() {
            ERROR_NO_ERROR
        } else {
            ERROR_NOT_SUPPORTED
        }
    });
    if let Some(v) = read {
        *value = v;
    }
    status
}

unsafe extern "C" fn get_state_string(device: *mut RawDevice, state: c_int, value: *mut c_char) -> Status {
    if let Some(status) = enter(Call::Query("tobii_get_state_string")) {
        return status;
    }
    let mut read = None;
    let status = with_device(device, |s, _| {
        read = s.string_states.get(&state).cloned();
        if read.is_some() {
            ERROR_NO_ERROR
        } else {
            ERROR_NOT_SUPPORTED
        }
    });
    if let Some(text) = read {
        write_c_string(value, STATE_STRING_SIZE, &text);
    }
    status
}

fn subscribe(kind: StreamKind, device: *mut RawDevice, callback: NativeCallback, user_data: *mut c_void) -> Status {
    if let Some(status) = enter(Call::Subscribe(kind)) {
        return status;
    }
    with_device(device, |s, key| {
        let Some(dev) = s.devices.get_mut(&key) else {
            return ERROR_INVALID_PARAMETER;
        };
        let slot = &mut dev.subscriptions[kind.index()];
        if slot.is_some() {
            return ERROR_ALREADY_SUBSCRIBED;
        }
        *slot = Some((callback, user_data));
        ERROR_NO_ERROR
    })
}

unsafe extern "C" fn subscribe_data<const K: usize>(
    device: *mut RawDevice,
    callback: DataCallbackFn,
    user_data: *mut c_void,
) -> Status {
    subscribe(StreamKind::ALL[K], device, NativeCallback::Data(callback), user_data)
}

unsafe extern "C" fn subscribe_presence(
    device: *mut RawDevice,
    callback: PresenceCallbackFn,
    user_data: *mut c_void,
) -> Status {
    subscribe(
        StreamKind::UserPresence,
        device,
        NativeCallback::Presence(callback),
        user_data,
    )
}

unsafe extern "C" fn unsubscribe<const K: usize>(device: *mut RawDevice) -> Status {
    let kind = StreamKind::ALL[K];
    if let Some(status) = enter(Call::Unsubscribe(kind)) {
        return status;
    }

    // Samples still in flight are delivered before the call returns.
    let mut in_flight = Vec::new();
    let status = with_device(device, |s, key| {
        let deliver_now = s.deliver_on_unsubscribe;
        let Some(dev) = s.devices.get_mut(&key) else {
            return ERROR_INVALID_PARAMETER;
        };
        let Some((callback, user_data)) = dev.subscriptions[K] else {
            return ERROR_NOT_SUBSCRIBED;
        };
        if deliver_now {
            let (matching, rest): (VecDeque<Sample>, VecDeque<Sample>) =
                dev.queue.drain(..).partition(|sample| sample.kind() == kind);
            dev.queue = rest;
            in_flight.extend(matching.into_iter().map(|sample| (callback, user_data, sample)));
        }
        ERROR_NO_ERROR
    });
    if status != ERROR_NO_ERROR {
        return status;
    }
    for (callback, user_data, sample) in &in_flight {
        deliver(*callback, *user_data, sample);
    }
    with_device(device, |s, key| {
        if let Some(dev) = s.devices.get_mut(&key) {
            dev.subscriptions[K] = None;
        }
        ERROR_NO_ERROR
    })
}

// -- Symbol tables --

/// Symbol table of the fake library for one major version.
pub(crate) struct FakeSymbols {
    table: HashMap<&'static str, *const c_void>,
}

impl FakeSymbols {
    pub(crate) fn remove(&mut self, name: &str) {
        self.table.remove(name);
    }
}

impl SymbolSource for FakeSymbols {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.table.get(name).copied()
    }
}

fn version_fn(major: u32) -> GetApiVersionFn {
    match major {
        2 => get_api_version::<2>,
        3 => get_api_version::<3>,
        4 => get_api_version::<4>,
        _ => get_api_version::<5>,
    }
}

fn stream_fns(kind: StreamKind) -> (*const c_void, *const c_void) {
    match kind {
        StreamKind::GazePoint => (
            subscribe_data::<0> as DataSubscribeFn as *const c_void,
            unsubscribe::<0> as DeviceFn as *const c_void,
        ),
        StreamKind::GazeOrigin => (
            subscribe_data::<1> as DataSubscribeFn as *const c_void,
            unsubscribe::<1> as DeviceFn as *const c_void,
        ),
        StreamKind::UserPresence => (
            subscribe_presence as PresenceSubscribeFn as *const c_void,
            unsubscribe::<2> as DeviceFn as *const c_void,
        ),
        StreamKind::HeadPose => (
            subscribe_data::<3> as DataSubscribeFn as *const c_void,
            unsubscribe::<3> as DeviceFn as *const c_void,
        ),
        StreamKind::Notification => (
            subscribe_data::<4> as DataSubscribeFn as *const c_void,
            unsubscribe::<4> as DeviceFn as *const c_void,
        ),
        StreamKind::UserPositionGuide => (
            subscribe_data::<5> as DataSubscribeFn as *const c_void,
            unsubscribe::<5> as DeviceFn as *const c_void,
        ),
    }
}

/// Every symbol a library of `major` exports, under that version's names
/// and call shapes. The device-name and output-frequency queries only exist
/// from v3.
pub(crate) fn symbols(major: u32) -> FakeSymbols {
    let version = Version::new(major, 0, 0, 0);
    let mut table: HashMap<&'static str, *const c_void> = HashMap::new();
    let mut put = |name: &'static str, address: *const c_void| {
        table.insert(name, address);
    };

    put("tobii_get_api_version", version_fn(major) as *const c_void);
    put("tobii_error_message", error_message as ErrorMessageFn as *const c_void);
    put("tobii_api_create", api_create as ApiCreateFn as *const c_void);
    put("tobii_api_destroy", api_destroy as ApiDestroyFn as *const c_void);
    put("tobii_system_clock", system_clock as SystemClockFn as *const c_void);
    put(
        "tobii_enumerate_local_device_urls_ex",
        enumerate_urls as EnumerateUrlsFn as *const c_void,
    );
    if version.device_create_takes_field_of_use() {
        put(
            "tobii_device_create",
            device_create_field_of_use as DeviceCreateFieldOfUseFn as *const c_void,
        );
    } else {
        put("tobii_device_create", device_create as DeviceCreateFn as *const c_void);
    }
    put("tobii_device_destroy", device_destroy as DeviceFn as *const c_void);
    put("tobii_device_reconnect", device_reconnect as DeviceFn as *const c_void);
    put("tobii_device_process_callbacks", process_callbacks as DeviceFn as *const c_void);
    put(
        "tobii_device_clear_callback_buffers",
        clear_callback_buffers as DeviceFn as *const c_void,
    );
    put("tobii_update_timesync", update_timesync as DeviceFn as *const c_void);
    if version.wait_takes_api() {
        put("tobii_wait_for_callbacks", wait_with_api as WaitWithApiFn as *const c_void);
    } else {
        put("tobii_wait_for_callbacks", wait_contextless as WaitFn as *const c_void);
    }
    if version.info_layout() == InfoLayout::V3 {
        put("tobii_get_device_info", get_device_info::<true> as ReadBlockFn as *const c_void);
    } else {
        put("tobii_get_device_info", get_device_info::<false> as ReadBlockFn as *const c_void);
    }
    put("tobii_get_track_box", get_track_box as ReadBlockFn as *const c_void);
    put("tobii_get_display_area", get_display_area as ReadBlockFn as *const c_void);
    put("tobii_get_enabled_eye", get_enabled_eye as ReadBlockFn as *const c_void);
    put("tobii_capability_supported", capability_supported as SupportQueryFn as *const c_void);
    put("tobii_stream_supported", stream_supported as SupportQueryFn as *const c_void);
    put("tobii_get_state_bool", get_state_bool as StateBoolFn as *const c_void);
    put("tobii_get_state_uint32", get_state_uint32 as StateUintFn as *const c_void);
    put("tobii_get_state_string", get_state_string as StateStringFn as *const c_void);
    if major >= 3 {
        put("tobii_get_device_name", get_device_name as ReadBlockFn as *const c_void);
        put("tobii_get_output_frequency", get_output_frequency as ReadBlockFn as *const c_void);
    }
    for kind in StreamKind::ALL {
        let (subscribe_name, unsubscribe_name) = kind.symbols(&version);
        let (subscribe_fn, unsubscribe_fn) = stream_fns(kind);
        put(subscribe_name, subscribe_fn);
        put(unsubscribe_name, unsubscribe_fn);
    }

    FakeSymbols { table }
}

/// Bound fake library for `major`.
pub(crate) fn library(major: u32) -> Arc<NativeLibrary> {
    unsafe { NativeLibrary::from_symbols(&symbols(major)) }.expect("fake library binds")
}
