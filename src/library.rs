//! Binding to the native library.
//!
//! [`NativeLibrary`] resolves the library version first, then binds every
//! entry point once. Entry points whose signature changed between major
//! versions are stored as a tagged call strategy chosen from that version,
//! so no call site re-dispatches on the version.

use crate::config::EngineConfig;
use crate::error::{translate, EngineError, FailureKind};
use crate::ffi::{
    self, ApiCreateFn, ApiDestroyFn, DataSubscribeFn, DeviceCreateFieldOfUseFn, DeviceCreateFn,
    DeviceFn, EnumerateUrlsFn, ErrorMessageFn, GetApiVersionFn, PresenceSubscribeFn, RawApi,
    RawDevice, ReadBlockFn, StateBoolFn, StateStringFn, StateUintFn, Status, SupportQueryFn,
    SystemClockFn, WaitFn, WaitWithApiFn,
};
use crate::stream::{CallbackShape, NativeCallback, StreamKind};
use crate::version::{self, Version};
use crate::Result;
use std::ffi::{c_int, c_void, CStr, OsStr};
use std::sync::{Arc, OnceLock};

/// Source of raw symbol addresses.
pub trait SymbolSource {
    /// Address of the exported symbol `name`, or `None` if it is absent.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

impl SymbolSource for libloading::Library {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
        unsafe {
            self.get::<*const c_void>(&bytes)
                .ok()
                .map(|symbol| *symbol)
                .filter(|ptr| !ptr.is_null())
        }
    }
}

fn require(source: &dyn SymbolSource, name: &'static str) -> Result<*const c_void> {
    source
        .symbol(name)
        .filter(|ptr| !ptr.is_null())
        .ok_or_else(|| EngineError::MissingSymbol(name.to_string()))
}

/// Bind a required symbol to the function-pointer type expected at the use site.
macro_rules! bind {
    ($source:expr, $name:expr) => {
        std::mem::transmute::<*const c_void, _>(require($source, $name)?)
    };
}

/// `tobii_wait_for_callbacks` call shape.
#[derive(Clone, Copy)]
pub(crate) enum WaitForCallbacks {
    /// Before v3: takes the root handle.
    WithApi(WaitWithApiFn),
    Contextless(WaitFn),
}

/// `tobii_device_create` call shape.
#[derive(Clone, Copy)]
pub(crate) enum DeviceCreate {
    Plain(DeviceCreateFn),
    /// From v4: takes a field-of-use selector.
    WithFieldOfUse(DeviceCreateFieldOfUseFn),
}

#[derive(Clone, Copy)]
pub(crate) enum Subscribe {
    Data(DataSubscribeFn),
    Presence(PresenceSubscribeFn),
}

#[derive(Clone, Copy)]
pub(crate) struct StreamEntry {
    pub subscribe: Subscribe,
    pub unsubscribe: DeviceFn,
    pub symbols: (&'static str, &'static str),
}

/// Every bound entry point.
pub(crate) struct Entrypoints {
    pub error_message: Option<ErrorMessageFn>,
    pub api_create: ApiCreateFn,
    pub api_destroy: ApiDestroyFn,
    pub system_clock: SystemClockFn,
    pub enumerate_urls: EnumerateUrlsFn,
    pub device_create: DeviceCreate,
    pub device_destroy: DeviceFn,
    pub device_reconnect: DeviceFn,
    pub process_callbacks: DeviceFn,
    pub clear_callback_buffers: DeviceFn,
    pub update_timesync: DeviceFn,
    pub wait_for_callbacks: WaitForCallbacks,
    pub get_device_info: ReadBlockFn,
    pub get_track_box: ReadBlockFn,
    pub get_display_area: ReadBlockFn,
    pub get_enabled_eye: ReadBlockFn,
    pub capability_supported: SupportQueryFn,
    pub stream_supported: SupportQueryFn,
    pub get_state_bool: StateBoolFn,
    pub get_state_uint32: StateUintFn,
    pub get_state_string: StateStringFn,
    pub get_device_name: Option<ReadBlockFn>,
    pub get_output_frequency: Option<ReadBlockFn>,
    pub streams: Vec<StreamEntry>,
}

impl Entrypoints {
    unsafe fn bind(source: &dyn SymbolSource, version: &Version) -> Result<Self> {
        let wait_for_callbacks = if version.wait_takes_api() {
            WaitForCallbacks::WithApi(bind!(source, "tobii_wait_for_callbacks"))
        } else {
            WaitForCallbacks::Contextless(bind!(source, "tobii_wait_for_callbacks"))
        };

        let device_create = if version.device_create_takes_field_of_use() {
            DeviceCreate::WithFieldOfUse(bind!(source, "tobii_device_create"))
        } else {
            DeviceCreate::Plain(bind!(source, "tobii_device_create"))
        };

        let mut streams = Vec::with_capacity(StreamKind::ALL.len());
        for kind in StreamKind::ALL {
            let symbols = kind.symbols(version);
            let subscribe = match kind.callback_shape() {
                CallbackShape::Data => Subscribe::Data(bind!(source, symbols.0)),
                CallbackShape::Presence => Subscribe::Presence(bind!(source, symbols.0)),
            };
            streams.push(StreamEntry {
                subscribe,
                unsubscribe: bind!(source, symbols.1),
                symbols,
            });
        }

        let optional = |name: &str| {
            source
                .symbol(name)
                .map(|ptr| std::mem::transmute::<*const c_void, ReadBlockFn>(ptr))
        };

        Ok(Self {
            error_message: source
                .symbol("tobii_error_message")
                .map(|ptr| std::mem::transmute::<*const c_void, ErrorMessageFn>(ptr)),
            api_create: bind!(source, "tobii_api_create"),
            api_destroy: bind!(source, "tobii_api_destroy"),
            system_clock: bind!(source, "tobii_system_clock"),
            enumerate_urls: bind!(source, "tobii_enumerate_local_device_urls_ex"),
            device_create,
            device_destroy: bind!(source, "tobii_device_destroy"),
            device_reconnect: bind!(source, "tobii_device_reconnect"),
            process_callbacks: bind!(source, "tobii_device_process_callbacks"),
            clear_callback_buffers: bind!(source, "tobii_device_clear_callback_buffers"),
            update_timesync: bind!(source, "tobii_update_timesync"),
            wait_for_callbacks,
            get_device_info: bind!(source, "tobii_get_device_info"),
            get_track_box: bind!(source, "tobii_get_track_box"),
            get_display_area: bind!(source, "tobii_get_display_area"),
            get_enabled_eye: bind!(source, "tobii_get_enabled_eye"),
            capability_supported: bind!(source, "tobii_capability_supported"),
            stream_supported: bind!(source, "tobii_stream_supported"),
            get_state_bool: bind!(source, "tobii_get_state_bool"),
            get_state_uint32: bind!(source, "tobii_get_state_uint32"),
            get_state_string: bind!(source, "tobii_get_state_string"),
            get_device_name: optional("tobii_get_device_name"),
            get_output_frequency: optional("tobii_get_output_frequency"),
            streams,
        })
    }
}

/// A loaded native library with its frozen version and bound entry points.
pub struct NativeLibrary {
    version: Version,
    pub(crate) api: Entrypoints,
    _library: Option<libloading::Library>,
}

static GLOBAL: OnceLock<Arc<NativeLibrary>> = OnceLock::new();

impl NativeLibrary {
    /// Load the library named by `config`.
    pub fn load(config: &EngineConfig) -> Result<Arc<NativeLibrary>> {
        Self::load_path(config.library_path.as_os_str())
    }

    /// Load the library at `path` (or a bare name resolved by the OS loader).
    pub fn load_path(path: impl AsRef<OsStr>) -> Result<Arc<NativeLibrary>> {
        let path = path.as_ref();
        let library = unsafe { libloading::Library::new(path)? };
        let mut lib = unsafe { Self::bind(&library)? };
        log::info!(
            "Loaded native library {} (version {})",
            path.to_string_lossy(),
            lib.version
        );
        lib._library = Some(library);
        Ok(Arc::new(lib))
    }

    /// Process-wide library, loaded from [`EngineConfig::from_env`] on first
    /// use. Its version stays frozen for the rest of the process.
    pub fn global() -> Result<Arc<NativeLibrary>> {
        if let Some(lib) = GLOBAL.get() {
            return Ok(lib.clone());
        }
        let lib = Self::load(&EngineConfig::from_env())?;
        Ok(GLOBAL.get_or_init(|| lib).clone())
    }

    /// Bind an already-loaded library, e.g. one linked statically into the
    /// host.
    ///
    /// # Safety
    /// Every address returned by `source` must be the matching native entry
    /// point with the ABI of the version that `tobii_get_api_version`
    /// reports, and must stay valid for the lifetime of the returned value.
    pub unsafe fn from_symbols(source: &dyn SymbolSource) -> Result<Arc<NativeLibrary>> {
        Ok(Arc::new(Self::bind(source)?))
    }

    unsafe fn bind(source: &dyn SymbolSource) -> Result<NativeLibrary> {
        let get_api_version: GetApiVersionFn = bind!(source, "tobii_get_api_version");
        let version = version::resolve(get_api_version)?;
        let api = Entrypoints::bind(source, &version)?;
        Ok(NativeLibrary {
            version,
            api,
            _library: None,
        })
    }

    /// Frozen library version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Native diagnostic text for `code`.
    pub fn error_message(&self, code: Status) -> String {
        match self.api.error_message {
            Some(message) => {
                let text = unsafe { ffi::c_str_to_string(message(code)) };
                if text.is_empty() {
                    format!("status {}", code)
                } else {
                    text
                }
            }
            None => format!("status {}", code),
        }
    }

    /// Translate a native status into a crate error, `Ok` on success.
    pub(crate) fn check(&self, operation: &'static str, code: Status) -> Result<()> {
        match translate(code) {
            None => Ok(()),
            Some(kind) => Err(self.native_error(operation, kind, code)),
        }
    }

    pub(crate) fn native_error(
        &self,
        operation: &'static str,
        kind: FailureKind,
        code: Status,
    ) -> EngineError {
        EngineError::Native {
            operation,
            kind,
            code,
            message: self.error_message(code),
        }
    }

    pub(crate) fn stream_symbols(&self, kind: StreamKind) -> (&'static str, &'static str) {
        self.api.streams[kind.index()].symbols
    }

    /// Create a device through whichever create shape this version uses.
    pub(crate) unsafe fn device_create(
        &self,
        api: *mut RawApi,
        url: &CStr,
        device: *mut *mut RawDevice,
    ) -> Status {
        match self.api.device_create {
            DeviceCreate::Plain(create) => create(api, url.as_ptr(), device),
            DeviceCreate::WithFieldOfUse(create) => {
                create(api, url.as_ptr(), ffi::FIELD_OF_USE_INTERACTIVE, device)
            }
        }
    }

    pub(crate) unsafe fn wait_for_callbacks(&self, api: *mut RawApi, devices: &[*mut RawDevice]) -> Status {
        let count = devices.len() as c_int;
        match self.api.wait_for_callbacks {
            WaitForCallbacks::WithApi(wait) => wait(api, count, devices.as_ptr()),
            WaitForCallbacks::Contextless(wait) => wait(count, devices.as_ptr()),
        }
    }

    pub(crate) unsafe fn subscribe(
        &self,
        kind: StreamKind,
        device: *mut RawDevice,
        callback: NativeCallback,
        user_data: *mut c_void,
    ) -> Status {
        match (self.api.streams[kind.index()].subscribe, callback) {
            (Subscribe::Data(subscribe), NativeCallback::Data(cb)) => subscribe(device, cb, user_data),
            (Subscribe::Presence(subscribe), NativeCallback::Presence(cb)) => {
                subscribe(device, cb, user_data)
            }
            _ => {
                log::error!("Callback shape does not match {:?} subscribe", kind);
                ffi::ERROR_INVALID_PARAMETER
            }
        }
    }

    pub(crate) unsafe fn unsubscribe(&self, kind: StreamKind, device: *mut RawDevice) -> Status {
        (self.api.streams[kind.index()].unsubscribe)(device)
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("version", &self.version)
            .field("dynamic", &self._library.is_some())
            .finish()
    }
}
